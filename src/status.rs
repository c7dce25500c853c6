//! Keep-alive status widget.
//!
//! Two independent loops feed one snapshot: a slow one that re-fetches the
//! backend status and a one-second tick that recomputes the countdown.
//! Dropping the [`StatusHandle`] stops both.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::client::{BackendClient, ClientError};
use crate::model::KeepAliveStatus;

/// Anything that can report the keep-alive status.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch_status(&self) -> BoxFuture<'static, Result<KeepAliveStatus, ClientError>>;
}

impl StatusSource for BackendClient {
    fn fetch_status(&self) -> BoxFuture<'static, Result<KeepAliveStatus, ClientError>> {
        let client = self.clone();
        Box::pin(async move { client.keep_alive_status().await })
    }
}

/// What the widget renders.
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds until `expires_at`; `None` when disabled or unknown.
    pub remaining_secs: Option<i64>,
    /// Message of the last failed fetch, cleared by the next success.
    pub error: Option<String>,
}

/// Seconds left until `expires_at`, never negative.
pub fn remaining_seconds(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().max(0)
}

/// `mm:ss` rendering of the countdown, `hh:mm:ss` above one hour.
pub fn format_countdown(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

fn countdown(snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Option<i64> {
    if !snapshot.enabled {
        return None;
    }
    snapshot.expires_at.map(|at| remaining_seconds(at, now))
}

/// Owns the polling tasks; dropping it cancels them.
pub struct StatusHandle {
    snapshot: watch::Receiver<StatusSnapshot>,
    poll_task: JoinHandle<()>,
    tick_task: JoinHandle<()>,
}

impl StatusHandle {
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.clone()
    }

    pub fn current(&self) -> StatusSnapshot {
        self.snapshot.borrow().clone()
    }
}

impl Drop for StatusHandle {
    fn drop(&mut self) {
        self.poll_task.abort();
        self.tick_task.abort();
    }
}

/// Starts polling `source` every `poll_interval` and ticking every second.
pub fn spawn_status_poller(source: Arc<dyn StatusSource>, poll_interval: Duration) -> StatusHandle {
    let (tx, rx) = watch::channel(StatusSnapshot::default());
    let tx = Arc::new(tx);

    let poll_tx = Arc::clone(&tx);
    let poll_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match source.fetch_status().await {
                Ok(status) => {
                    debug!(enabled = status.enabled, "Keep-alive status refreshed");
                    poll_tx.send_modify(|snapshot| {
                        snapshot.enabled = status.enabled;
                        snapshot.expires_at = status.expires_at;
                        snapshot.error = None;
                        snapshot.remaining_secs = countdown(snapshot, Utc::now());
                    });
                }
                Err(err) => {
                    warn!("Fetching keep-alive status failed: {err}");
                    poll_tx.send_modify(|snapshot| snapshot.error = Some(err.to_string()));
                }
            }
        }
    });

    let tick_tx = Arc::clone(&tx);
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            tick_tx.send_if_modified(|snapshot| {
                let remaining = countdown(snapshot, Utc::now());
                if remaining == snapshot.remaining_secs {
                    return false;
                }
                snapshot.remaining_secs = remaining;
                true
            });
        }
    });

    StatusHandle {
        snapshot: rx,
        poll_task,
        tick_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        calls: Arc<AtomicUsize>,
        status: Option<KeepAliveStatus>,
    }

    impl StatusSource for FixedSource {
        fn fetch_status(&self) -> BoxFuture<'static, Result<KeepAliveStatus, ClientError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.status.clone();
            Box::pin(async move {
                status.ok_or(ClientError::Status {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "down".into(),
                })
            })
        }
    }

    #[test]
    fn remaining_seconds_never_negative() {
        let now = Utc::now();
        assert_eq!(remaining_seconds(now + chrono::Duration::seconds(90), now), 90);
        assert_eq!(remaining_seconds(now - chrono::Duration::seconds(5), now), 0);
    }

    #[test]
    fn countdown_formatting() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(65), "01:05");
        assert_eq!(format_countdown(3725), "01:02:05");
        assert_eq!(format_countdown(-3), "00:00");
    }

    #[test]
    fn disabled_status_has_no_countdown() {
        let snapshot = StatusSnapshot {
            enabled: false,
            expires_at: Some(Utc::now() + chrono::Duration::minutes(5)),
            ..Default::default()
        };
        assert_eq!(countdown(&snapshot, Utc::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval_and_stops_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FixedSource {
            calls: Arc::clone(&calls),
            status: Some(KeepAliveStatus {
                enabled: true,
                expires_at: Some(Utc::now() + chrono::Duration::minutes(10)),
            }),
        };

        let handle = spawn_status_poller(Arc::new(source), Duration::from_secs(30));
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.enabled).await.unwrap();
        assert!(handle.current().remaining_secs.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_surfaced() {
        let source = FixedSource {
            calls: Arc::new(AtomicUsize::new(0)),
            status: None,
        };
        let handle = spawn_status_poller(Arc::new(source), Duration::from_secs(30));
        let mut rx = handle.subscribe();
        let snapshot = rx.wait_for(|s| s.error.is_some()).await.unwrap().clone();
        assert!(!snapshot.enabled);
        assert!(snapshot.error.unwrap().contains("503"));
    }
}
