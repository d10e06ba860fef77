//! OpenTelemetry export for the tracing pipeline
//!
//! Enabled by `main` only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set; the OTLP
//! exporter reads the endpoint from the environment itself.

use opentelemetry::KeyValue;
use opentelemetry_sdk::{runtime, trace, Resource};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;

const SERVICE_NAME: &str = "dapr-automation";

/// Build the OTLP tracing layer; `S` is the subscriber it is stacked on.
///
/// Returns `None` when the exporter pipeline cannot be installed, so a broken
/// collector never prevents startup.
pub fn init_telemetry<S>() -> Option<OpenTelemetryLayer<S, trace::Tracer>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let pipeline = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .with_trace_config(
            trace::config().with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                SERVICE_NAME,
            )])),
        )
        .install_batch(runtime::Tokio);

    match pipeline {
        Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
        Err(e) => {
            eprintln!("Failed to install OTLP pipeline: {e}");
            None
        }
    }
}

/// Flush pending spans before exit.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
