//! Structured logging setup for the stage entry points.

use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

/// Filter used when neither `RUST_LOG` nor the configuration names one.
pub const DEFAULT_LOG_FILTER: &str = "prometheus_batch_scheduler=info";

/// Pick the log filter: `RUST_LOG` first, then `config.log_filter`, then
/// [`DEFAULT_LOG_FILTER`]. An unparsable configured filter falls back to the
/// default.
#[must_use]
pub fn log_filter(config: &EngineConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        config
            .log_filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    })
}

/// Install a fmt subscriber for a stage run, unless the application already
/// installed one.
pub fn init_tracing(config: &EngineConfig) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(config))
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = EngineConfig::default();
        init_tracing(&config);
        init_tracing(&config);
        tracing::info!("subscriber installed");
    }

    #[test]
    fn test_configured_filter_is_used() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = EngineConfig {
            log_filter: Some("prometheus_batch_scheduler=debug".into()),
            ..EngineConfig::default()
        };
        assert_eq!(
            log_filter(&config).to_string(),
            EnvFilter::new("prometheus_batch_scheduler=debug").to_string()
        );

        let broken = EngineConfig {
            log_filter: Some("prometheus_batch_scheduler=loud".into()),
            ..EngineConfig::default()
        };
        assert_eq!(
            log_filter(&broken).to_string(),
            EnvFilter::new(DEFAULT_LOG_FILTER).to_string()
        );
    }
}
