use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::http::ApiClient;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls the unread notification count and publishes it when it changes.
pub struct NotificationPoller {
    client: Arc<ApiClient>,
    interval: Duration,
}

impl NotificationPoller {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts polling. The receiver sees the latest count; the task ends
    /// when the session is gone or every receiver is dropped.
    pub fn spawn(self) -> (JoinHandle<()>, watch::Receiver<i64>) {
        let (tx, rx) = watch::channel(0);
        let handle = tokio::spawn(self.run(tx));
        (handle, rx)
    }

    async fn run(self, tx: watch::Sender<i64>) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            if tx.is_closed() {
                debug!("No listeners left, notification polling stopped");
                return;
            }

            match self.client.unread_count().await {
                Ok(unread) => {
                    tx.send_if_modified(|current| {
                        if *current == unread {
                            false
                        } else {
                            *current = unread;
                            true
                        }
                    });
                }
                Err(e) if e.is_logged_out() => {
                    info!("Session ended, notification polling stopped");
                    return;
                }
                // next tick is the retry
                Err(e) => warn!(error = %e, "Unread count poll failed"),
            }
        }
    }
}
