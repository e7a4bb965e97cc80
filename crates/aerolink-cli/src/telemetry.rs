//! Tracing/OpenTelemetry pipeline initialisation.
//!
//! Call [`init_tracing`] once at process startup, before the Tokio runtime
//! exists, and hold the returned guard for the lifetime of the process.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL; enables the OTLP HTTP span exporter. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `AEROLINK_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global `tracing` subscriber with an optional OTLP span
/// exporter. Falls back to a plain console formatter when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is absent.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let use_json = std::env::var("AEROLINK_LOG_FORMAT").as_deref() == Ok("json");

    let provider = build_provider(service_name);

    match (&provider, use_json) {
        (Some(p), true) => {
            let otel_layer = tracing_opentelemetry::layer().with_tracer(p.tracer("aerolink"));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        (Some(p), false) => {
            let otel_layer = tracing_opentelemetry::layer().with_tracer(p.tracer("aerolink"));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
        (None, true) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        (None, false) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
    }

    TracerProviderGuard(provider)
}

/// RAII guard that shuts down the OTel provider on drop, flushing pending
/// span batches before the process exits.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[aerolink] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set;
/// `None` otherwise (the caller falls back to console-only output).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[aerolink] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Simple (synchronous) exporter: no Tokio runtime exists yet at
            // init time, so a batch exporter cannot spawn its tasks.
            .with_simple_exporter(exporter)
            .build(),
    )
}
