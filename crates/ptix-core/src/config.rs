//! Printer connection and protocol configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;
use crate::transport::ReportLayout;

/// Configuration for a printer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
    /// Report id of device -> host reports.
    pub in_report_id: u8,
    /// Report id of host -> device reports.
    pub out_report_id: u8,
    /// Input report length, report id included.
    pub in_report_length: usize,
    /// Output report length, report id included.
    pub out_report_length: usize,
    /// Timeout for single command round-trips.
    pub read_timeout_ms: u64,
    /// Timeout for each flash packet round-trip.
    pub flash_timeout_ms: u64,
    /// Timeout for each structured-read page.
    pub structured_timeout_ms: u64,
    /// Retries allowed per flash operation.
    pub retry_limit: u32,
    /// Expected firmware model code. Unchecked when absent.
    pub model: Option<u32>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            vendor_id: PTIX_VENDOR_ID,
            product_id: PTIX_PRODUCT_ID,
            in_report_id: IN_REPORT_ID,
            out_report_id: OUT_REPORT_ID,
            in_report_length: REPORT_LENGTH,
            out_report_length: REPORT_LENGTH,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            flash_timeout_ms: FLASH_TIMEOUT_MS,
            structured_timeout_ms: STRUCTURED_READ_TIMEOUT_MS,
            retry_limit: DEFAULT_RETRY_LIMIT,
            model: None,
        }
    }
}

impl PrinterConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PrinterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn report_layout(&self) -> ReportLayout {
        ReportLayout {
            in_report_id: self.in_report_id,
            out_report_id: self.out_report_id,
            in_report_length: self.in_report_length,
            out_report_length: self.out_report_length,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn flash_timeout(&self) -> Duration {
        Duration::from_millis(self.flash_timeout_ms)
    }

    pub fn structured_timeout(&self) -> Duration {
        Duration::from_millis(self.structured_timeout_ms)
    }
}
