use crate::model::{PowerEvent, ReachabilityState};
use crate::probe::Prober;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 32;

/// The single current reachability value for one device plus the
/// notification channel fed on every visible change.
#[derive(Debug, Clone)]
pub struct ReachabilityCell {
    device: Arc<str>,
    state: watch::Sender<ReachabilityState>,
    events: broadcast::Sender<PowerEvent>,
}

impl ReachabilityCell {
    pub fn new(device: &str) -> Self {
        let (state, _) = watch::channel(ReachabilityState::Unknown);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            device: Arc::from(device),
            state,
            events,
        }
    }

    pub fn current(&self) -> ReachabilityState {
        *self.state.borrow()
    }

    /// Last writer wins. Returns true when the visible state changed, in
    /// which case one event has been broadcast.
    pub fn observe(&self, next: ReachabilityState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed && next != ReachabilityState::Unknown {
            tracing::info!(device = %self.device, state = ?next, "reachability changed");
            // no subscribers is fine
            let _ = self.events.send(PowerEvent {
                device: self.device.to_string(),
                active: next.is_on(),
            });
        }
        changed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PowerEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<ReachabilityState> {
        self.state.subscribe()
    }
}

pub struct LivenessTracker {
    host: String,
    prober: Arc<dyn Prober>,
    cell: ReachabilityCell,
    interval: Duration,
    timeout: Duration,
}

impl LivenessTracker {
    pub fn new(
        host: impl Into<String>,
        prober: Arc<dyn Prober>,
        cell: ReachabilityCell,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            prober,
            cell,
            interval,
            timeout,
        }
    }

    /// Probe, publish, wait `interval`, repeat until `shutdown_rx` flips to
    /// true or its sender is dropped.
    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                // a shutdown mid-probe drops the probe future
                let alive = tokio::select! {
                    alive = self.prober.probe(&self.host, self.timeout) => alive,
                    _ = shutdown_rx.changed() => break,
                };
                tracing::debug!(host = %self.host, alive, "liveness probe");
                self.cell.observe(ReachabilityState::from_outcome(alive));

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    res = shutdown_rx.changed() => {
                        if res.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(host = %self.host, "liveness tracker stopped");
        })
    }
}
