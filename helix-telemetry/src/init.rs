//! Telemetry initialization and configuration.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Configuration for the telemetry system, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub default_level: Option<String>,
    pub json_logs: bool,
    pub log_directives: Vec<String>,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), ..Default::default() }
    }

    pub fn with_otlp(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = Some(level.into());
        self
    }

    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    pub fn with_log_directive(mut self, directive: impl Into<String>) -> Self {
        self.log_directives.push(directive.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `SERVICE_NAME` (default `"helixagent"`)
    /// - `OTLP_ENDPOINT` — OTLP collector endpoint, e.g. `http://localhost:4317`
    /// - `LOG_LEVEL` (default `"info"`)
    /// - `LOG_FORMAT` — `"json"` enables structured JSON logs, anything else
    ///   (or unset) keeps the human-readable formatter
    pub fn from_env() -> Self {
        let service_name = std::env::var("SERVICE_NAME").unwrap_or_else(|_| "helixagent".to_string());
        let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
        let default_level = std::env::var("LOG_LEVEL").ok();
        let json_logs = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

        Self { service_name, otlp_endpoint, default_level, json_logs, log_directives: Vec::new() }
    }
}

/// Initialize telemetry with console logging (and OTLP export if
/// configured). Idempotent — later calls in the same process are no-ops
/// courtesy of the `Once` guard, which matters for tests that construct
/// the server more than once.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    INIT.call_once(|| {
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = config.default_level.as_deref().unwrap_or("info");
            EnvFilter::try_new(level).expect("invalid LOG_LEVEL directive")
        });
        for directive in &config.log_directives {
            filter = filter.add_directive(directive.parse().expect("invalid log directive"));
        }

        let registry = tracing_subscriber::registry().with(filter);

        #[cfg(not(target_arch = "wasm32"))]
        let otlp_layer = config.otlp_endpoint.as_ref().map(|endpoint| {
            use opentelemetry_otlp::WithExportConfig;
            use tracing_opentelemetry::OpenTelemetryLayer;

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
                .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                    opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                        "service.name",
                        config.service_name.clone(),
                    )]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .expect("failed to install OTLP trace pipeline");

            OpenTelemetryLayer::new(tracer)
        });

        if config.json_logs {
            let fmt_layer =
                tracing_subscriber::fmt::layer().json().with_target(true).with_current_span(true);
            registry.with(fmt_layer).with(otlp_layer).init();
        } else {
            let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(true);
            registry.with(fmt_layer).with(otlp_layer).init();
        }
    });
    Ok(())
}

/// Flush any pending OTLP spans on shutdown.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
