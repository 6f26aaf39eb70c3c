use crate::model::ReachabilityState;
use std::time::Duration;

/// Grace delay before commands sent to a device believed off, giving a
/// just-issued power-on time to bring up the listener. Best effort: the
/// command goes out afterwards whatever the device did.
#[derive(Debug, Clone, Copy)]
pub struct WakeWait {
    grace: Duration,
}

impl WakeWait {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Returns whether it waited.
    pub async fn settle(&self, last_known: ReachabilityState) -> bool {
        if last_known.is_on() {
            return false;
        }
        tracing::info!(
            grace_ms = self.grace.as_millis() as u64,
            "waiting for device to wake before sending"
        );
        tokio::time::sleep(self.grace).await;
        true
    }
}
