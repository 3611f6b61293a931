use std::time::Duration;

use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::{
    metrics::{
        reader::{DefaultAggregationSelector, DefaultTemporalitySelector},
        MeterProviderBuilder, PeriodicReader, SdkMeterProvider,
    },
    runtime,
    trace::{BatchConfigBuilder, RandomIdGenerator, Sampler, SpanLimits, Tracer},
    Resource,
};
use opentelemetry_semantic_conventions::{
    resource::{SERVICE_NAME, SERVICE_VERSION},
    SCHEMA_URL,
};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::{AppError, AppResult, LogConfig};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn resource() -> Resource {
    Resource::from_schema_url(
        [
            KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ],
        SCHEMA_URL,
    )
}

/// `RUST_LOG` wins; otherwise 0 is info, 1 is debug and anything above is trace.
fn env_filter(verbosity: u8) -> EnvFilter {
    let default_level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

fn telemetry_error(what: &str, err: impl std::fmt::Display) -> AppError {
    AppError::IllegalStateError(format!("{} setup failed: {}", what, err))
}

// Construct MeterProvider for MetricsLayer
fn init_meter_provider() -> AppResult<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .build_metrics_exporter(
            Box::new(DefaultAggregationSelector::new()),
            Box::new(DefaultTemporalitySelector::new()),
        )
        .map_err(|e| telemetry_error("otlp metrics exporter", e))?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_secs(30))
        .build();

    let meter_provider = MeterProviderBuilder::default()
        .with_resource(resource())
        .with_reader(reader)
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(meter_provider)
}

// Construct Tracer for OpenTelemetryLayer
fn init_tracer() -> AppResult<Tracer> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_batch_config(
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_secs(5))
                .build(),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    1.0,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_span_limits(SpanLimits::default())
                .with_resource(resource()),
        )
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .install_batch(runtime::Tokio)
        .map_err(|e| telemetry_error("otlp tracer", e))
}

/// Keeps the OTLP providers and the log file writer alive. Dropping it flushes them.
pub struct OtelGuard {
    meter_provider: SdkMeterProvider,
    _worker_guard: WorkerGuard,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.meter_provider.shutdown() {
            eprintln!("{err:?}");
        }

        global::shutdown_tracer_provider();
        tracing::info!("shutdown otel tracer provider");
    }
}

/// Console-only logging. A second call in the same process is ignored, so tests can
/// call it from every fixture.
pub fn setup_local_tracing(verbosity: u8) -> AppResult<()> {
    let timer = ChronoLocal::new(TIME_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_line_number(true);
    if tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(verbosity))
        .try_init()
        .is_err()
    {
        tracing::debug!("global tracing subscriber already installed");
    }
    Ok(())
}

/// Logs to stdout and an hourly rolling file under `log_config.dir`, and exports traces
/// and metrics over OTLP. Must be called from within a tokio runtime.
pub async fn setup_tracing(log_config: &LogConfig, verbosity: u8) -> AppResult<OtelGuard> {
    let file_appender = tracing_appender::rolling::hourly(&log_config.dir, &log_config.file_prefix);
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
    let writer = non_blocking.and(std::io::stdout);

    let timer = ChronoLocal::new(TIME_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .with_writer(writer);

    let meter_provider = init_meter_provider()?;
    let tracer = init_tracer()?;

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(MetricsLayer::new(meter_provider.clone()))
        .with(OpenTelemetryLayer::new(tracer))
        .with(env_filter(verbosity))
        .try_init()
        .map_err(|e| telemetry_error("tracing subscriber", e))?;

    Ok(OtelGuard {
        meter_provider,
        _worker_guard: worker_guard,
    })
}
