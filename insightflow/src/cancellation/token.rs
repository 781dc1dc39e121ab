//! Cancellation token for cooperative cancellation between steps.

use crate::errors::InsightflowError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// A token for cooperative cancellation.
///
/// The pipeline never interrupts an agent call in flight; it checks the token
/// before issuing the next one. Only the first cancellation reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason. Idempotent.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            info!(
                event_name = "pipeline.cancel.requested",
                reason = %reason,
                "cancellation requested"
            );
            *self.reason.write() = Some(reason);
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Returns `Err(Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> Result<(), InsightflowError> {
        if self.is_cancelled() {
            Err(InsightflowError::Cancelled(
                self.reason().unwrap_or_else(|| "cancelled".to_string()),
            ))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Cancels a shared token when dropped unless disarmed.
///
/// Hold one in a request handler: if the handler future is dropped because
/// the client went away, the pipeline stops after its current call.
#[derive(Debug)]
pub struct CancelOnDrop {
    token: Arc<CancellationToken>,
    reason: String,
    armed: bool,
}

impl CancelOnDrop {
    /// Creates an armed guard.
    #[must_use]
    pub fn new(token: Arc<CancellationToken>, reason: impl Into<String>) -> Self {
        Self {
            token,
            reason: reason.into(),
            armed: true,
        }
    }

    /// Disarms the guard; dropping it no longer cancels.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel(std::mem::take(&mut self.reason));
        }
    }
}
