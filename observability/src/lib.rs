//! # Tracing helpers
//!
//! Every binary in the workspace calls [init_tracing] once at startup. Logs go to stdout,
//! formatted for humans or as JSON lines when `RUST_LOG_FORMAT=json`. Traces are exported
//! over OTLP only when `OTEL_SDK_DISABLED=false`.

use std::borrow::Cow;

use error_stack::{Result, ResultExt};
use opentelemetry::sdk::{trace, Resource};
use opentelemetry::KeyValue;
use tracing::Subscriber;
use tracing_subscriber::{prelude::*, registry::LookupSpan, EnvFilter, Layer};

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug)]
pub struct TracingInitError;
impl error_stack::Context for TracingInitError {}

impl std::fmt::Display for TracingInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to initialize tracing")
    }
}

/// Initialize the global tracing subscriber.
///
/// ```rs
/// use price_sink_observability::init_tracing;
///
/// init_tracing(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).unwrap();
/// ```
pub fn init_tracing(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), TracingInitError> {
    // Unlike the otel sdk, we default to disabled.
    let sdk_disabled = std::env::var(OTEL_SDK_DISABLED)
        .map(|v| v != "false")
        .unwrap_or(true);

    let mut layers = vec![stdout()];

    if !sdk_disabled {
        layers.push(otel(package_name, package_version)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .change_context(TracingInitError)
        .attach_printable("global subscriber already set")?;

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn otel<S>(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<BoxedLayer<S>, TracingInitError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let package_name: Cow<'static, str> = package_name.into();
    let package_version: Cow<'static, str> = package_version.into();
    let resource = Resource::new(vec![
        KeyValue::new("service.name", package_name.into_owned()),
        KeyValue::new("service.version", package_version.into_owned()),
    ]);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .with_trace_config(trace::config().with_resource(resource))
        .install_batch(opentelemetry::runtime::Tokio)
        .change_context(TracingInitError)
        .attach_printable("failed to install otlp trace pipeline")?;

    let layer = tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(env_filter())
        .boxed();

    Ok(layer)
}

fn stdout<S>() -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let json_fmt = std::env::var(RUST_LOG_FORMAT)
        .map(|val| val == "json")
        .unwrap_or(false);

    if json_fmt {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(env_filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_filter(env_filter())
            .boxed()
    }
}
