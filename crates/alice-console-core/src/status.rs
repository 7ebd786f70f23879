//! Periodic sidebar refresh.
//!
//! The poller fetches tasks, skills and outputs on a fixed interval and again
//! whenever an exchange finishes. The latest good snapshot is published on a
//! `watch` channel; a failed refresh keeps the previous one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::{StatusSnapshot, StatusSource};
use crate::diagnostics::{DiagnosticKind, Diagnostics};

/// Refreshes the sidebar status in the background.
pub struct StatusPoller<S> {
    source: Arc<S>,
    interval: Duration,
    refresh: Arc<Notify>,
    publisher: watch::Sender<Option<StatusSnapshot>>,
    diagnostics: Diagnostics,
}

impl<S: StatusSource> StatusPoller<S> {
    /// Create a poller.
    ///
    /// `refresh` triggers an extra fetch when notified, typically the
    /// controller's finished signal.
    #[must_use]
    pub fn new(
        source: Arc<S>,
        interval: Duration,
        refresh: Arc<Notify>,
        diagnostics: Diagnostics,
    ) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            source,
            interval,
            refresh,
            publisher,
            diagnostics,
        }
    }

    /// Subscribe to status snapshots. `None` until the first fetch succeeds.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.publisher.subscribe()
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.publisher.borrow().clone()
    }

    /// Fetch once and publish on success. Returns whether it succeeded.
    pub async fn refresh_once(&self) -> bool {
        match self.source.fetch_status().await {
            Ok(snapshot) => {
                tracing::debug!(
                    skills = snapshot.skills.len(),
                    outputs = snapshot.outputs.len(),
                    "Status refreshed"
                );
                self.publisher.send_if_modified(|current| {
                    if current.as_ref() == Some(&snapshot) {
                        false
                    } else {
                        *current = Some(snapshot);
                        true
                    }
                });
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Status refresh failed");
                self.diagnostics.record(DiagnosticKind::StatusRefresh {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(interval = ?self.interval, "Status poller started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                () = self.refresh.notified() => {
                    ticker.reset();
                }
            }
            self.refresh_once().await;
        }
        tracing::debug!("Status poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::client::ClientError;

    struct CountingSource {
        calls: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl StatusSource for CountingSource {
        async fn fetch_status(&self) -> Result<StatusSnapshot, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.fail_after {
                return Err(ClientError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(StatusSnapshot {
                tasks: format!("- [ ] task {n}"),
                ..StatusSnapshot::default()
            })
        }
    }

    fn poller(fail_after: usize, interval: Duration) -> (StatusPoller<CountingSource>, Arc<Notify>) {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_after,
        });
        let refresh = Arc::new(Notify::new());
        let poller = StatusPoller::new(source, interval, Arc::clone(&refresh), Diagnostics::default());
        (poller, refresh)
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let (poller, _) = poller(1, Duration::from_secs(5));

        assert!(poller.refresh_once().await);
        assert_eq!(poller.latest().unwrap().tasks, "- [ ] task 1");

        assert!(!poller.refresh_once().await);
        assert_eq!(poller.latest().unwrap().tasks, "- [ ] task 1");
        assert!(matches!(
            poller.diagnostics.snapshot()[0].kind,
            DiagnosticKind::StatusRefresh { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval_and_on_refresh_signal() {
        let (poller, refresh) = poller(usize::MAX, Duration::from_secs(5));
        let source = Arc::clone(&poller.source);
        let mut rx = poller.subscribe();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(poller.run(shutdown.clone()));

        // First tick fires immediately.
        rx.changed().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        rx.changed().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        refresh.notify_one();
        rx.changed().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
