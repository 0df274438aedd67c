//! Logging setup.
//!
//! Diagnostics and progress go to stderr through `tracing`; reports go to
//! stdout. `RUST_LOG` overrides the verbosity chosen on the command line.

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::diagnostic::Severity;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    Debug,
    Info,
    Warn,
    Error,
    None,
}

impl Verbosity {
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warn => "warn",
            Verbosity::Error => "error",
            Verbosity::None => "off",
        }
    }

    /// Lowest severity this level lets through, `None` when nothing passes.
    pub fn threshold(&self) -> Option<Severity> {
        match self {
            Verbosity::Debug => Some(Severity::Debug),
            Verbosity::Info => Some(Severity::Info),
            Verbosity::Warn => Some(Severity::Warn),
            Verbosity::Error => Some(Severity::Error),
            Verbosity::None => None,
        }
    }

    pub fn admits(&self, severity: Severity) -> bool {
        self.threshold().is_some_and(|t| severity >= t)
    }
}

pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_at_or_above_threshold() {
        assert!(Verbosity::Warn.admits(Severity::Error));
        assert!(Verbosity::Warn.admits(Severity::Warn));
        assert!(!Verbosity::Warn.admits(Severity::Info));
        assert!(!Verbosity::None.admits(Severity::Error));
        assert!(Verbosity::Debug.admits(Severity::Debug));
    }
}
