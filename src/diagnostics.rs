//! Injected diagnostic reporting.
//!
//! Transports, discovery and devices report through a [`DiagnosticSink`]
//! handed to them at construction instead of writing to ambient global state.

use log::Level;
use std::sync::Arc;

/// Receives diagnostic messages produced while talking to devices.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.record(Level::Debug, message);
    }

    fn warn(&self, message: &str) {
        self.record(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.record(Level::Error, message);
    }
}

/// Forwards every message to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, level: Level, message: &str) {
        log::log!(target: "tplink_smarthome", level, "{}", message);
    }
}

/// Default sink used when none is configured.
pub fn default_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(LogSink)
}
