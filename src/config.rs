use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::audit::AuditPolicy;
use crate::cli::Cli;
use crate::progress::DEFAULT_INTERVAL;

/// Upper bound on worker threads.
pub const MAX_THREADS: usize = 32767;

/// Default thread count when `--threads` is absent. Same syntax as the flag.
pub const THREADS_ENV: &str = "BVA_THREADS";

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub verify: bool,
    pub parallel: bool,
    pub threads: usize,
    pub fair: bool,
    pub buffered: bool,
    pub track: bool,
    pub track_interval: Duration,
    pub timing: bool,
    pub multi_release: bool,
    pub release: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            verify: true,
            parallel: true,
            threads: available_threads(),
            fair: false,
            buffered: true,
            track: false,
            track_interval: DEFAULT_INTERVAL,
            timing: false,
            multi_release: true,
            release: None,
        }
    }
}

impl ScanConfig {
    /// More than one worker will actually run, so shared state must be concurrent.
    pub fn is_effectively_parallel(&self) -> bool {
        self.parallel && self.threads > 1
    }

    pub fn serial() -> Self {
        Self {
            parallel: false,
            threads: 1,
            ..Self::default()
        }
    }
}

pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// `"4"` is four threads, `"2C"` is two per core and `"0.5C"` half a thread per core.
pub fn parse_thread_count(input: &str, cores: usize) -> Result<usize> {
    let input = input.trim();
    let requested = if let Some(factor) = input.strip_suffix(['C', 'c']) {
        let factor: f64 = factor
            .trim()
            .parse()
            .with_context(|| format!("invalid per-core thread factor: {input}"))?;
        if !factor.is_finite() {
            anyhow::bail!("invalid per-core thread factor: {input}");
        }
        (factor * cores as f64) as i64
    } else {
        input
            .parse::<i64>()
            .with_context(|| format!("invalid thread count: {input}"))?
    };
    Ok(limit_threads(requested))
}

pub fn limit_threads(requested: i64) -> usize {
    let max = MAX_THREADS as i64;
    if requested < 1 {
        tracing::error!(
            "thread count not in required range, expected [1..{max}], got {requested}, using 1"
        );
        return 1;
    }
    if requested > max {
        tracing::error!(
            "thread count not in required range, expected [1..{max}], got {requested}, using {max}"
        );
        return MAX_THREADS;
    }
    requested as usize
}

pub fn resolve_threads(cli: &Cli) -> Result<usize> {
    let cores = available_threads();
    if let Some(t) = cli.threads.as_deref() {
        return parse_thread_count(t, cores);
    }

    if let Ok(t) = env::var(THREADS_ENV) {
        return parse_thread_count(&t, cores)
            .with_context(|| format!("invalid {THREADS_ENV} value"));
    }

    Ok(cores)
}

pub fn resolve_scan_config(cli: &Cli) -> Result<ScanConfig> {
    Ok(ScanConfig {
        verify: cli.verify,
        parallel: cli.parallel,
        threads: resolve_threads(cli)?,
        fair: cli.fair,
        buffered: cli.buffered,
        track: cli.track,
        track_interval: DEFAULT_INTERVAL,
        timing: cli.timing,
        multi_release: cli.multi_release,
        release: cli.release,
    })
}

pub fn resolve_audit_policy(cli: &Cli) -> AuditPolicy {
    AuditPolicy {
        below: cli.print_if_below,
        above: cli.print_if_above,
        filter: cli.filter.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_counts_and_core_factors() -> Result<()> {
        assert_eq!(parse_thread_count("4", 8)?, 4);
        assert_eq!(parse_thread_count("2C", 8)?, 16);
        assert_eq!(parse_thread_count("0.5c", 8)?, 4);
        assert!(parse_thread_count("many", 8).is_err());
        assert!(parse_thread_count("xC", 8).is_err());
        Ok(())
    }

    #[test]
    fn clamps_out_of_range_counts() -> Result<()> {
        assert_eq!(parse_thread_count("0", 8)?, 1);
        assert_eq!(parse_thread_count("-3", 8)?, 1);
        assert_eq!(parse_thread_count("0.01C", 8)?, 1);
        assert_eq!(parse_thread_count("100000", 8)?, MAX_THREADS);
        Ok(())
    }

    #[test]
    fn effective_parallelism_needs_two_threads() {
        let mut config = ScanConfig {
            threads: 1,
            ..ScanConfig::default()
        };
        assert!(!config.is_effectively_parallel());
        config.threads = 2;
        assert!(config.is_effectively_parallel());
        config.parallel = false;
        assert!(!config.is_effectively_parallel());
        assert!(!ScanConfig::serial().is_effectively_parallel());
    }

    #[test]
    fn resolves_config_from_flags() -> Result<()> {
        let cli = Cli::try_parse_from([
            "bytecode-version-analyzer",
            "--verify",
            "false",
            "--parallel",
            "false",
            "--threads",
            "3",
            "--release",
            "11",
            "--print-if-above",
            "17",
            "app.jar",
        ])?;
        let config = resolve_scan_config(&cli)?;
        assert!(!config.verify);
        assert!(!config.parallel);
        assert_eq!(config.threads, 3);
        assert_eq!(config.release, Some(11));
        assert!(config.buffered);

        assert_eq!(cli.fail_verbosity, crate::logging::Verbosity::Error);

        let policy = resolve_audit_policy(&cli);
        assert_eq!(policy.above.map(|v| v.major()), Some(61));
        assert!(policy.below.is_none());
        Ok(())
    }
}
