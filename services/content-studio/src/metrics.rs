//! Prometheus metrics exposition
//!
//! - `studio_requests_total` (counter): labels `route`, `status`
//! - `studio_request_duration_seconds` (histogram): label `route`
//!
//! Per-attempt and per-invocation counters are recorded by the key pool
//! (`keypool_attempts_total`, `keypool_invocations_total`) and rendered by the
//! same recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "studio_request_duration_seconds";

/// 50ms to 120s; a `/v1/content` fan-out can outlast a single upstream timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Record a completed API request.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("studio_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_without_recorder_is_noop() {
        record_request("/v1/text", 200, 0.05);
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("/v1/text", 200, 0.4);
        record_request("/v1/geo", 429, 1.2);

        let output = handle.render();
        assert!(output.contains("studio_requests_total"));
        assert!(output.contains("route=\"/v1/text\""));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("route=\"/v1/geo\""));
        assert!(output.contains("status=\"429\""));
        assert!(
            output.contains("studio_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
    }

    #[test]
    fn histogram_buckets_rendered() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("/v1/images", 200, 0.01);

        let output = handle.render();
        assert!(output.contains("le=\"0.05\""));
        assert!(output.contains("le=\"120\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
