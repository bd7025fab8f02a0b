use metrics_exporter_statsd::StatsdBuilder;
use notifier::config::{LoggingConfig, MetricsConfig};
use tracing_subscriber::EnvFilter;

const METRICS_PREFIX: &str = "themis";

/// `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_deref().unwrap_or("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn init_metrics(config: &MetricsConfig) -> Result<(), String> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| e.to_string())?;

    metrics::set_global_recorder(recorder)
        .map_err(|_| "a metrics recorder is already installed".to_string())
}
