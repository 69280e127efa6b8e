//! Lightweight metrics helpers for Courier.
//!
//! This module exposes a small set of convenience functions and RAII timers
//! wrapping the `metrics` crate macros. It does not install an exporter; the
//! embedding application can initialize any compatible recorder and these
//! calls become no-ops without one.
//!
//! Provided metrics (labels vary by family):
//! * `courier_client_builds_total` (counter, labels: client, outcome)
//! * `courier_cached_clients` (gauge)
//! * `courier_cache_invalidations_total` (counter, labels: client)
//! * `courier_remote_calls_total` (counter, labels: client, outcome)
//! * `courier_remote_call_duration_seconds` (histogram, labels: client)
//! * `courier_transport_retries_total` (counter, labels: route)
//! * `courier_route_gates` (gauge)
//!
//! [`RemoteCallTimer`] leverages `Drop` to record durations even when a call
//! returns early with an error.
use std::time::{Duration, Instant};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const COURIER_CLIENT_BUILDS_TOTAL: &str = "courier_client_builds_total";
pub const COURIER_CACHED_CLIENTS: &str = "courier_cached_clients";
pub const COURIER_CACHE_INVALIDATIONS_TOTAL: &str = "courier_cache_invalidations_total";
pub const COURIER_REMOTE_CALLS_TOTAL: &str = "courier_remote_calls_total";
pub const COURIER_REMOTE_CALL_DURATION_SECONDS: &str = "courier_remote_call_duration_seconds";
pub const COURIER_TRANSPORT_RETRIES_TOTAL: &str = "courier_transport_retries_total";
pub const COURIER_ROUTE_GATES: &str = "courier_route_gates";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        COURIER_CLIENT_BUILDS_TOTAL,
        Unit::Count,
        "Client construction attempts, by client id and outcome."
    );
    describe_gauge!(
        COURIER_CACHED_CLIENTS,
        "Number of clients currently held by the factory cache."
    );
    describe_counter!(
        COURIER_CACHE_INVALIDATIONS_TOTAL,
        Unit::Count,
        "Cached clients dropped by invalidation or refresh."
    );
    describe_counter!(
        COURIER_REMOTE_CALLS_TOTAL,
        Unit::Count,
        "Remote calls issued through a client, by outcome."
    );
    describe_histogram!(
        COURIER_REMOTE_CALL_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of remote calls including the interceptor chain."
    );
    describe_counter!(
        COURIER_TRANSPORT_RETRIES_TOTAL,
        Unit::Count,
        "Transport attempts repeated after a connection failure."
    );
    describe_gauge!(
        COURIER_ROUTE_GATES,
        "Number of routes with a live per-route connection gate."
    );
});

/// Build outcome label values.
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

pub fn increment_client_builds(client: &str, success: bool) {
    let outcome = if success { OUTCOME_SUCCESS } else { OUTCOME_FAILURE };
    counter!(
        COURIER_CLIENT_BUILDS_TOTAL,
        "client" => client.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Set current number of cached clients.
pub fn set_cached_clients(count: usize) {
    gauge!(COURIER_CACHED_CLIENTS).set(count as f64);
}

pub fn increment_cache_invalidations(client: &str) {
    counter!(COURIER_CACHE_INVALIDATIONS_TOTAL, "client" => client.to_string()).increment(1);
}

/// Count a finished remote call. `outcome` is `success`, `fault`, `status` or `error`.
pub fn increment_remote_calls(client: &str, outcome: &'static str) {
    counter!(
        COURIER_REMOTE_CALLS_TOTAL,
        "client" => client.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_remote_call_duration(client: &str, duration: Duration) {
    histogram!(COURIER_REMOTE_CALL_DURATION_SECONDS, "client" => client.to_string())
        .record(duration.as_secs_f64());
}

pub fn increment_transport_retries(route: &str) {
    counter!(COURIER_TRANSPORT_RETRIES_TOTAL, "route" => route.to_string()).increment(1);
}

pub fn set_route_gates(count: usize) {
    gauge!(COURIER_ROUTE_GATES).set(count as f64);
}

/// RAII helper measuring remote call duration.
pub struct RemoteCallTimer {
    start: Instant,
    client: String,
}

impl RemoteCallTimer {
    pub fn new(client: &str) -> Self {
        Self {
            start: Instant::now(),
            client: client.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for RemoteCallTimer {
    fn drop(&mut self) {
        record_remote_call_duration(&self.client, self.start.elapsed());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing Courier metrics descriptions");
    Lazy::force(&DESCRIPTIONS);
    Ok(())
}
