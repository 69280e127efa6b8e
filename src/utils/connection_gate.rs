//! Connection admission limits for one transport.
//!
//! Every outbound request holds one permit from a transport-wide semaphore and
//! one from the semaphore of its route (`scheme://authority`) for as long as it
//! is in flight. Waiting for both permits is bounded by the connect-request
//! timeout. Route records that stay unused for longer than the pool idle
//! timeout are swept away by a background task.
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use scc::HashMap;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
    time::{interval, timeout},
};

use crate::{
    metrics,
    ports::transport::{TransportError, TransportResult},
};

/// Admission state of one route.
#[derive(Debug)]
pub struct RouteGate {
    permits: Arc<Semaphore>,
    limit: usize,
    epoch: Instant,
    last_used_ms: AtomicU64,
}

impl RouteGate {
    fn new(limit: usize, epoch: Instant) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            epoch,
            last_used_ms: AtomicU64::new(epoch.elapsed().as_millis() as u64),
        }
    }

    fn touch(&self) {
        self.last_used_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    pub fn idle_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_used_ms.load(Ordering::Relaxed)))
    }
}

/// Held for the lifetime of one request; releases both permits on drop.
#[derive(Debug)]
pub struct GatePermit {
    _total: OwnedSemaphorePermit,
    _route: OwnedSemaphorePermit,
    route: Arc<RouteGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.route.touch();
    }
}

/// Transport-wide and per-route connection limits
#[derive(Debug)]
pub struct ConnectionGate {
    total: Arc<Semaphore>,
    max_total: usize,
    max_per_route: usize,
    acquire_timeout: Duration,
    routes: HashMap<String, Arc<RouteGate>>,
    epoch: Instant,
}

impl ConnectionGate {
    pub fn new(max_total: u32, max_per_route: u32, acquire_timeout: Duration) -> Self {
        Self {
            total: Arc::new(Semaphore::new(max_total as usize)),
            max_total: max_total as usize,
            max_per_route: max_per_route as usize,
            acquire_timeout,
            routes: HashMap::new(),
            epoch: Instant::now(),
        }
    }

    /// Wait for a total and a route permit.
    ///
    /// Fails with [`TransportError::PoolTimeout`] when both cannot be obtained
    /// within the connect-request timeout.
    pub async fn acquire(&self, route: &str) -> TransportResult<GatePermit> {
        let gate = self
            .routes
            .entry_async(route.to_string())
            .await
            .or_insert_with(|| Arc::new(RouteGate::new(self.max_per_route, self.epoch)))
            .get()
            .clone();
        metrics::set_route_gates(self.routes.len());

        let total = self.total.clone();
        let permits = gate.permits.clone();
        let acquired = timeout(self.acquire_timeout, async move {
            let route_permit = permits.acquire_owned().await;
            let total_permit = total.acquire_owned().await;
            (total_permit, route_permit)
        })
        .await;

        match acquired {
            Ok((Ok(total), Ok(route_permit))) => {
                gate.touch();
                Ok(GatePermit {
                    _total: total,
                    _route: route_permit,
                    route: gate,
                })
            }
            Ok(_) => Err(TransportError::InvalidRequest(
                "connection gate was closed".to_string(),
            )),
            Err(_) => {
                tracing::warn!(
                    route,
                    in_flight = gate.in_flight(),
                    "Timed out waiting for a pooled connection"
                );
                Err(TransportError::PoolTimeout(
                    self.acquire_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Drop route records that are idle and unused for longer than `idle`.
    ///
    /// A record still referenced outside the map is kept, since a caller in
    /// [`acquire`](Self::acquire) may be about to take a permit from it.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let mut evicted = 0;
        let evicted_ref = &mut evicted;
        self.routes
            .retain_async(|route, gate| {
                let keep = Arc::strong_count(gate) > 1
                    || !gate.is_idle()
                    || gate.idle_for() < idle;
                if !keep {
                    tracing::debug!("Evicting idle route gate: {}", route);
                    *evicted_ref += 1;
                }
                keep
            })
            .await;
        metrics::set_route_gates(self.routes.len());
        evicted
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn available_total(&self) -> usize {
        self.total.available_permits()
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            routes: self.routes.len(),
            max_total: self.max_total,
            max_per_route: self.max_per_route,
            in_flight: self.max_total - self.total.available_permits(),
        }
    }
}

/// Snapshot of gate usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStats {
    pub routes: usize,
    pub max_total: usize,
    pub max_per_route: usize,
    pub in_flight: usize,
}

/// Periodically evict idle routes until the gate is dropped.
pub fn spawn_idle_sweep(gate: Weak<ConnectionGate>, idle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(idle.max(Duration::from_millis(100)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(gate) = gate.upgrade() else {
                tracing::debug!("Connection gate dropped, stopping idle sweep");
                break;
            };
            let evicted = gate.evict_idle(idle).await;
            if evicted > 0 {
                tracing::debug!("Evicted {} idle route gates", evicted);
            }
        }
    })
}
