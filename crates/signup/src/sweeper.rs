//! Periodic removal of stale pending signups.
//!
//! The signup path already sweeps opportunistically. A deployment with long
//! quiet periods can additionally run a [`PendingSignupSweeper`], which calls
//! [`SignupService::sweep_expired`] on a fixed interval until it is shut down
//! or dropped.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::service::SignupService;

/// Handle to a background sweep task.
///
/// Dropping the handle cancels the task; [`shutdown`](Self::shutdown) also
/// waits for it to finish.
#[derive(Debug)]
pub struct PendingSignupSweeper {
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PendingSignupSweeper {
    /// Spawns a task that sweeps every `interval`.
    ///
    /// The first sweep runs one full `interval` after spawning. Sweep
    /// failures are logged and the task keeps running.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context. Panics if `interval`
    /// is zero.
    #[must_use]
    pub fn spawn(service: Arc<SignupService>, interval: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("pending signup sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match service.sweep_expired().await {
                            Ok(removed) => tracing::debug!(removed, "sweep cycle complete"),
                            Err(err) => tracing::warn!(error = %err, "sweep cycle failed"),
                        }
                    }
                }
            }
        });

        Self { cancel_token, handle: Mutex::new(Some(handle)) }
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "pending signup sweeper panicked");
            }
        }
    }

    /// Whether the task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Token that stops the task when cancelled, for wiring into an external
    /// shutdown signal.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for PendingSignupSweeper {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
