//! Debounced autosave of the standard order.
//!
//! Edits are applied to the local copy immediately. Persisting them follows
//! a small state machine:
//!
//! ```text
//! Idle ──edit──▶ Pending ──debounce──▶ Saving ──▶ Synced
//!                  ▲  │                   │   └──▶ Failed
//!                  └──┴──── newer edit ◀──┘
//! ```
//!
//! A newer edit cancels the pending timer, or the save already in flight,
//! and starts a fresh debounce. After a successful save the refrigerators
//! are synced against the new catalog.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::client::{BackendClient, ClientError, SyncReport};
use crate::model::ValidationError;
use crate::types::StandardOrder;

/// Where the standard order is persisted.
pub trait OrderSink: Send + Sync + 'static {
    fn save_order(&self, products: Vec<String>) -> BoxFuture<'static, Result<(), ClientError>>;
    fn sync_fridges(&self) -> BoxFuture<'static, Result<SyncReport, ClientError>>;
}

impl OrderSink for BackendClient {
    fn save_order(&self, products: Vec<String>) -> BoxFuture<'static, Result<(), ClientError>> {
        let client = self.clone();
        Box::pin(async move { client.save_standard_products(&products).await })
    }

    fn sync_fridges(&self) -> BoxFuture<'static, Result<SyncReport, ClientError>> {
        let client = self.clone();
        Box::pin(async move { client.sync_fridges().await })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveState {
    Idle,
    Pending,
    Saving,
    Synced { report: SyncReport },
    Failed { error: String },
}

/// Save state tagged with the edit revision it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct AutosaveStatus {
    pub revision: u64,
    #[serde(flatten)]
    pub state: SaveState,
}

pub struct AutosaveController {
    sink: Arc<dyn OrderSink>,
    debounce: Duration,
    order: Mutex<StandardOrder>,
    task: Mutex<Option<JoinHandle<()>>>,
    status: watch::Sender<AutosaveStatus>,
}

impl AutosaveController {
    pub fn new(sink: Arc<dyn OrderSink>, debounce: Duration, initial: StandardOrder) -> Self {
        let (status, _) = watch::channel(AutosaveStatus {
            revision: 0,
            state: SaveState::Idle,
        });
        Self {
            sink,
            debounce,
            order: Mutex::new(initial),
            task: Mutex::new(None),
            status,
        }
    }

    /// The local (possibly not yet saved) ordering.
    pub fn order(&self) -> StandardOrder {
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> AutosaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveStatus> {
        self.status.subscribe()
    }

    /// Applies `edit` to the local ordering and schedules a save.
    ///
    /// A rejected edit leaves both the ordering and the save state alone.
    /// Must be called from within a Tokio runtime.
    pub fn edit<F>(&self, edit: F) -> Result<u64, ValidationError>
    where
        F: FnOnce(&mut StandardOrder) -> Result<(), ValidationError>,
    {
        // The order lock is held until the save is scheduled, so revisions
        // are assigned in the same order the edits were applied.
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        let mut draft = order.clone();
        edit(&mut draft)?;
        *order = draft;
        Ok(self.schedule(order.names().to_vec()))
    }

    /// Replaces the whole ordering (e.g. after a drag-and-drop session).
    pub fn replace(&self, names: Vec<String>) -> Result<u64, ValidationError> {
        self.edit(|order| order.replace(names))
    }

    fn schedule(&self, products: Vec<String>) -> u64 {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let revision = self.status.borrow().revision + 1;
        self.status.send_replace(AutosaveStatus {
            revision,
            state: SaveState::Pending,
        });
        debug!(revision, count = products.len(), "Standard order edited, save pending");

        let sink = Arc::clone(&self.sink);
        let status = self.status.clone();
        let debounce = self.debounce;
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            publish(&status, revision, SaveState::Saving);

            let outcome = match sink.save_order(products).await {
                Ok(()) => sink.sync_fridges().await,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(report) => {
                    info!(
                        revision,
                        updated_fridges = report.updated_fridges,
                        "Standard order saved and fridges synced"
                    );
                    publish(&status, revision, SaveState::Synced { report });
                }
                Err(err) => {
                    warn!(revision, "Saving the standard order failed: {err}");
                    publish(
                        &status,
                        revision,
                        SaveState::Failed {
                            error: err.to_string(),
                        },
                    );
                }
            }
        }));

        revision
    }
}

impl Drop for AutosaveController {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

/// Updates the state unless a newer edit already took over.
fn publish(status: &watch::Sender<AutosaveStatus>, revision: u64, state: SaveState) {
    status.send_if_modified(|current| {
        if current.revision != revision {
            return false;
        }
        current.state = state;
        true
    });
}
