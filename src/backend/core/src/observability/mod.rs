//! Observability: Distributed Tracing, Metrics, and Logging.

use opentelemetry_otlp::WithExportConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize the observability stack.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    // Set up OpenTelemetry tracing if endpoint is provided
    let telemetry_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    opentelemetry_sdk::trace::config()
                        .with_resource(opentelemetry_sdk::Resource::new(vec![
                            opentelemetry::KeyValue::new("service.name", service_name.to_string()),
                        ])),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let (json_layer, pretty_layer) = if config.json_logging {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().pretty()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(telemetry_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;

    Ok(())
}

/// Shutdown OpenTelemetry.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Metrics registry and helpers.
pub mod metrics {
    use metrics::{counter, describe_counter, describe_histogram, histogram};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

    /// Register all metric descriptions.
    pub fn register_metrics() {
        // Counters
        describe_counter!(
            "civica_policy_decisions_total",
            "Policy evaluations by operation and outcome"
        );
        describe_counter!(
            "civica_scope_resolutions_total",
            "Scope resolutions by effective access level"
        );
        describe_counter!(
            "civica_errors_total",
            "Errors returned to callers by code"
        );

        // Histograms
        describe_histogram!(
            "civica_page_query_seconds",
            "Paginated fetch duration in seconds, count and prefetch included"
        );
    }

    /// Install the Prometheus recorder and describe every metric.
    pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        register_metrics();
        Ok(handle)
    }

    /// Record a policy decision for an operation.
    pub fn record_policy_decision(operation: &str, allowed: bool) {
        let outcome = if allowed { "allow" } else { "deny" };
        counter!(
            "civica_policy_decisions_total",
            "operation" => operation.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Record a scope resolution.
    pub fn record_scope_resolution(level: &str) {
        counter!("civica_scope_resolutions_total", "level" => level.to_string()).increment(1);
    }

    /// Record how long a paginated fetch took.
    pub fn record_page_query(entity: &str, duration_secs: f64) {
        histogram!("civica_page_query_seconds", "entity" => entity.to_string()).record(duration_secs);
    }
}
