// src/metrics.rs
use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register the series the task
    /// pipeline emits, so they show up on /metrics from the first scrape.
    pub fn init() -> Self {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!("monitor_tasks_started_total", "Tasks accepted by Start.");
        describe_counter!("monitor_tasks_completed_total", "Tasks finished on their own.");
        describe_counter!("monitor_tasks_stopped_total", "Tasks ended by a stop request.");
        describe_counter!(
            "monitor_listings_found_total",
            "Candidate listings seen on fetched pages."
        );
        describe_counter!(
            "monitor_notified_total",
            "Listings accepted and handed to notification fan-out."
        );
        describe_counter!(
            "monitor_dedup_hits_total",
            "Listings suppressed by the dedup ledger."
        );
        describe_counter!("monitor_fetch_errors_total", "Pages given up after retries.");
        describe_counter!("monitor_delivery_errors_total", "Per-target delivery failures.");

        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
