//! "Latest request wins" loading.
//!
//! Re-querying with new filters aborts the fetch that is still running
//! instead of letting the two race.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::task::{AbortHandle, JoinError};
use tracing::debug;

/// Result of a load started through [`SupersedingLoader::load`].
#[derive(Debug)]
pub enum LoadOutcome<T> {
    Completed(T),
    /// A newer load was started before this one finished.
    Superseded,
}

impl<T> LoadOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            LoadOutcome::Completed(value) => Some(value),
            LoadOutcome::Superseded => None,
        }
    }
}

#[derive(Default)]
pub struct SupersedingLoader {
    current: Mutex<Option<AbortHandle>>,
}

impl SupersedingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `future`, cancelling whatever load was started before it.
    ///
    /// Panics inside `future` are propagated.
    pub async fn load<F, T>(&self, future: F) -> LoadOutcome<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(future);
        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = current.replace(handle.abort_handle()) {
                debug!("Cancelling superseded load");
                previous.abort();
            }
        }

        match handle.await {
            Ok(value) => LoadOutcome::Completed(value),
            Err(err) => Self::outcome_of(err),
        }
    }

    /// Cancels the running load, e.g. when the view is torn down.
    pub fn cancel(&self) {
        if let Some(previous) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            previous.abort();
        }
    }

    fn outcome_of<T>(err: JoinError) -> LoadOutcome<T> {
        match err.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            Err(_) => LoadOutcome::Superseded,
        }
    }
}

impl Drop for SupersedingLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}
