//! Logging setup
//!
//! One rolling log file (hourly, daily or never rotated) in JSON or text,
//! plus a coloured stdout copy in text mode. `RUST_LOG` replaces the
//! configured directives entirely.
//!
//! The readiness poller logs every poll at debug, so it is held at info
//! unless the configured level is `trace`. HTTP internals stay at warn.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Targets that only add noise below warn
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2"];

/// `EnvFilter` directives for a configured base level
pub fn filter_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let mut directives = vec![level.clone()];

    if level != "trace" {
        directives.push("sweep_recon::readiness=info".to_string());
    }
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{}=warn", t)));
    directives.join(",")
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        // Targets tell ledger, readiness and retry lines apart
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_quiets_readiness_and_http() {
        let d = filter_directives("debug");
        assert!(d.starts_with("debug,"));
        assert!(d.contains("sweep_recon::readiness=info"));
        assert!(d.contains("reqwest=warn"));
        assert!(d.contains("h2=warn"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }

    #[test]
    fn test_trace_keeps_readiness_polls() {
        let d = filter_directives(" TRACE ");
        assert!(d.starts_with("trace,"));
        assert!(!d.contains("sweep_recon::readiness"));
    }
}
