use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use crate::api::remote::RemoteService;
use crate::relay::ProgressRelay;

/// Tracks whether the extraction server is reachable.
///
/// The flag starts offline and only changes after a poll. Listeners hear
/// about transitions, never about repeated identical results.
pub struct HealthMonitor {
    remote: Arc<dyn RemoteService>,
    online: watch::Sender<bool>,
    relay: ProgressRelay,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(remote: Arc<dyn RemoteService>, relay: ProgressRelay, timeout: Duration) -> Self {
        let (online, _) = watch::channel(false);
        Self {
            remote,
            online,
            relay,
            timeout,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Polls `GET /status` once and updates the flag.
    pub async fn check_now(&self) -> bool {
        let healthy = match tokio::time::timeout(self.timeout, self.remote.status()).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                log::debug!("[HEALTH] Status check failed: {}", e);
                false
            }
            Err(_) => {
                log::debug!("[HEALTH] Status check timed out after {:?}", self.timeout);
                false
            }
        };

        self.record(healthy)
    }

    fn record(&self, healthy: bool) -> bool {
        let changed = self.online.send_if_modified(|current| {
            if *current == healthy {
                false
            } else {
                *current = healthy;
                true
            }
        });

        if changed {
            if healthy {
                log::info!("[HEALTH] ✅ Download server is online");
            } else {
                log::warn!("[HEALTH] ⚠️ Download server is offline");
            }
            self.relay.server_status(healthy);
        } else {
            log::debug!("[HEALTH] Server status unchanged (online: {})", healthy);
        }

        healthy
    }

    /// Polls immediately, then every `period`.
    pub fn spawn_polling(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                monitor.check_now().await;
            }
        })
    }
}
