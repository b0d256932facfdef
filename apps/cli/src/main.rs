use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ptix_core::{FirmwareImage, HidPort, Printer, PrinterConfig, ReturnCode};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "PTIX Thermal Printer Tool", long_about = None)]
struct Args {
    /// Path to a TOML printer configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List attached printers
    List,
    /// Show the header of a firmware file
    Inspect { file: PathBuf },
    /// Check that the printer answers
    Ping,
    /// Restart the printer
    Reboot,
    /// Print the firmware revision
    Revlev,
    /// Print telemetry counters
    Telemetry {
        /// Lifetime counters instead of since power-up
        #[arg(long)]
        lifetime: bool,
    },
    /// Print the serial port settings
    Serial,
    /// Flash a firmware file
    Flash { file: PathBuf },
    /// Flash an encoded logo
    Logo {
        file: PathBuf,
        /// Logo slot tag
        #[arg(long)]
        tag: u8,
        /// Start address (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_address)]
        address: u32,
    },
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(args) {
        Ok(ReturnCode::Okay) => {}
        Ok(code) => {
            error!(result = %code, "Operation failed");
            std::process::exit(2);
        }
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<ReturnCode> {
    let config = match &args.config {
        Some(path) => PrinterConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PrinterConfig::default(),
    };

    match args.command {
        Cmd::List => {
            let devices = HidPort::enumerate(config.vendor_id, config.product_id)?;
            if devices.is_empty() {
                info!("No printers found");
            }
            for dev in devices {
                println!(
                    "{:04X}:{:04X}  {}  {} {}  serial={}",
                    dev.vendor_id,
                    dev.product_id,
                    dev.path,
                    dev.manufacturer_string.as_deref().unwrap_or("-"),
                    dev.product_string.as_deref().unwrap_or("-"),
                    dev.serial.as_deref().unwrap_or("-"),
                );
            }
            Ok(ReturnCode::Okay)
        }
        Cmd::Inspect { file } => {
            let image = FirmwareImage::load(&file)?;
            println!("{}", image.header());
            match image.verified_payload() {
                Ok(payload) => {
                    println!("  Checksum:   OK ({} payload bytes)", payload.len());
                    Ok(ReturnCode::Okay)
                }
                Err(e) => {
                    println!("  Checksum:   {}", e);
                    Ok(ReturnCode::FlashFileInvalid)
                }
            }
        }
        command => {
            let mut printer = Printer::hid(config);
            if !printer.connect() {
                anyhow::bail!("no printer found");
            }
            let code = run_on_device(&mut printer, command)?;
            printer.disconnect();
            Ok(code)
        }
    }
}

fn run_on_device(printer: &mut Printer<HidPort>, command: Cmd) -> Result<ReturnCode> {
    let code = match command {
        Cmd::Ping => printer.ping(),
        Cmd::Reboot => printer.reboot(),
        Cmd::Revlev => {
            let rev = printer.get_revlev();
            println!("{}", rev);
            if rev.is_zero() {
                ReturnCode::TargetStoppedResponding
            } else {
                ReturnCode::Okay
            }
        }
        Cmd::Telemetry { lifetime: false } => match printer.get_telemetry_powerup() {
            Some(t) => {
                println!("{:#?}", t);
                ReturnCode::Okay
            }
            None => ReturnCode::TargetStoppedResponding,
        },
        Cmd::Telemetry { lifetime: true } => match printer.get_telemetry_lifetime() {
            Some(t) => {
                println!("{:#?}", t);
                ReturnCode::Okay
            }
            None => ReturnCode::TargetStoppedResponding,
        },
        Cmd::Serial => match printer.get_serial_config() {
            Some(serial) => {
                println!("{}", serial);
                ReturnCode::Okay
            }
            None => ReturnCode::TargetStoppedResponding,
        },
        Cmd::Flash { file } => {
            info!(file = %file.display(), "Flashing firmware");
            let code = printer.flash_update(&file)?;
            if let Some(stats) = printer.last_flash() {
                info!(summary = %stats, "Flash statistics");
            }
            code
        }
        Cmd::Logo { file, tag, address } => {
            let data =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            info!(file = %file.display(), tag, address = %format!("0x{:08X}", address), "Flashing logo");
            printer.flash_logo(&data, tag, address)
        }
        Cmd::List | Cmd::Inspect { .. } => ReturnCode::Okay,
    };
    Ok(code)
}
