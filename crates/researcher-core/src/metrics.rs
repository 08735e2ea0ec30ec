use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct RunMetrics {
    runs: Counter<u64>,
    duration_ms: Histogram<f64>,
    progress_events: Counter<u64>,
}

static METRICS: OnceCell<RunMetrics> = OnceCell::new();

fn handles() -> &'static RunMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("researcher.runs");
        RunMetrics {
            runs: meter
                .u64_counter("research_runs_total")
                .with_description("Total research runs by host and status")
                .init(),
            duration_ms: meter
                .f64_histogram("research_run_duration_ms")
                .with_description("Research run wall time in milliseconds")
                .init(),
            progress_events: meter
                .u64_counter("progress_events_total")
                .with_description("Progress events by kind; dropped events count as `filtered`")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("RESEARCHER_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "RESEARCHER_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export run metrics."
        );
    }
    Ok(())
}

/// Record a finished run (no-op if no meter provider is installed).
pub fn record_run_metrics(host: &str, status: &str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("host", host.to_string()),
        KeyValue::new("status", status.to_string()),
    ];

    metrics.runs.add(1, &attrs);
    metrics.duration_ms.record(duration_ms as f64, &attrs);
}

pub(crate) fn record_progress_event(kind: &'static str) {
    handles()
        .progress_events
        .add(1, &[KeyValue::new("kind", kind)]);
}
