//! Event system for UI decoupling.
//!
//! Allows CLI/GUI front ends to follow printer operations without tight
//! coupling to the core logic. Events carry human-readable text and
//! fractional progress only, never raw protocol bytes.

use std::fmt;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Printer operation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No operation in progress.
    Idle,
    /// Opening the device.
    Connecting,
    /// Streaming flash packets.
    Flashing,
    /// Comparing device checksums after a flash.
    Verifying,
    /// Operation finished successfully.
    Complete,
    /// Operation failed.
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Connecting => write!(f, "Connecting"),
            Phase::Flashing => write!(f, "Flashing"),
            Phase::Verifying => write!(f, "Verifying"),
            Phase::Complete => write!(f, "Complete"),
            Phase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by the printer facade and the flash streamer.
#[derive(Debug, Clone, PartialEq)]
pub enum PtixEvent {
    /// Device opened.
    DeviceConnected { vid: u16, pid: u16 },
    /// Device closed or lost.
    DeviceDisconnected,
    /// Phase changed.
    PhaseChanged { from: Phase, to: Phase },
    /// Progress of the current operation, in `[0.0, 1.0]`.
    Progress { operation: String, fraction: f64 },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Operation completed successfully.
    Complete,
}

/// Observer trait for receiving printer events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait PtixObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &PtixEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl PtixObserver for NullObserver {
    fn on_event(&self, _event: &PtixEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl PtixObserver for TracingObserver {
    fn on_event(&self, event: &PtixEvent) {
        match event {
            PtixEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            PtixEvent::DeviceDisconnected => {
                tracing::warn!("Device disconnected");
            }
            PtixEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            PtixEvent::Progress {
                operation,
                fraction,
            } => {
                tracing::debug!(operation = %operation, progress = %format!("{:.0}%", fraction * 100.0), "Progress");
            }
            PtixEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            PtixEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}

impl<O: PtixObserver + ?Sized> PtixObserver for std::sync::Arc<O> {
    fn on_event(&self, event: &PtixEvent) {
        (**self).on_event(event);
    }
}

/// Observer that keeps every event, for assertions in tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: std::sync::Mutex<Vec<PtixEvent>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn events(&self) -> Vec<PtixEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Progress fractions reported for `operation`, in order.
    pub fn progress(&self, operation: &str) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PtixEvent::Progress {
                    operation: op,
                    fraction,
                } if op == operation => Some(fraction),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl PtixObserver for RecordingObserver {
    fn on_event(&self, event: &PtixEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
