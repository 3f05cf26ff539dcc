//! # Reconcile Result
//!
//! Outcome of one pipeline step. A step either lets the pipeline continue,
//! or stops it: successfully, with a requeue, or with an error.
//!
//! Store outcomes map onto results through two helpers shared by the steps:
//!
//! - [`creation_result`] - a fresh create stops the pipeline (the watch event
//!   for the new object continues the work); a duplicate is benign
//! - [`update_result`] - an optimistic-concurrency conflict requeues without
//!   an error

use std::time::Duration;

use kube_runtime::controller::Action;
use thiserror::Error;
use tracing::debug;

use crate::store::StoreError;

/// Errors that stop a reconciliation
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to establish watch: {0}")]
    Watch(#[from] WatchError),

    #[error("failed to encode {kind}: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to register a watch for a gated kind
#[derive(Debug, Error)]
#[error("watch for {kind} could not be registered: {message}")]
pub struct WatchError {
    pub kind: String,
    pub message: String,
}

/// When to run the pipeline again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Requeue {
    /// Wait for the next external trigger
    #[default]
    None,
    /// Run again as soon as possible
    Immediate,
    After(Duration),
}

/// Result of a single step or of a whole pipeline run
///
/// An error always implies `stop`.
#[derive(Debug, Default)]
#[must_use]
pub struct ReconcileResult {
    stop: bool,
    requeue: Requeue,
    error: Option<ReconcilerError>,
}

impl ReconcileResult {
    /// Continue with the next step
    pub fn next() -> Self {
        Self::default()
    }

    /// Stop successfully, waiting for the next trigger
    pub fn end() -> Self {
        Self {
            stop: true,
            ..Self::default()
        }
    }

    /// Stop and run again after `delay`; a zero delay requeues immediately
    pub fn requeue(delay: Duration) -> Self {
        let requeue = if delay.is_zero() {
            Requeue::Immediate
        } else {
            Requeue::After(delay)
        };
        Self {
            stop: true,
            requeue,
            error: None,
        }
    }

    /// Stop with an error; the scheduler backs off
    pub fn error(err: impl Into<ReconcilerError>) -> Self {
        Self {
            stop: true,
            requeue: Requeue::None,
            error: Some(err.into()),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.stop
    }

    pub fn requeue_after(&self) -> Requeue {
        self.requeue
    }

    pub fn error_ref(&self) -> Option<&ReconcilerError> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Short label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match (self.stop, self.requeue, self.error.is_some()) {
            (_, _, true) => "error",
            (false, _, false) => "continue",
            (true, Requeue::None, false) => "stop",
            (true, _, false) => "requeue",
        }
    }

    /// Collapse into what a scheduler needs: an optional delay, or the error
    ///
    /// `Ok(Some(Duration::ZERO))` means run again immediately.
    pub fn into_outcome(self) -> Result<Option<Duration>, ReconcilerError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(match self.requeue {
            Requeue::None => None,
            Requeue::Immediate => Some(Duration::ZERO),
            Requeue::After(delay) => Some(delay),
        })
    }

    /// Convert into a `kube-runtime` controller action
    pub fn into_action(self) -> Result<Action, ReconcilerError> {
        Ok(match self.into_outcome()? {
            None => Action::await_change(),
            Some(delay) => Action::requeue(delay),
        })
    }
}

/// Map the outcome of a create onto a step result
///
/// Success stops the pipeline without requeue; the watch event for the new
/// object triggers the next pass. `AlreadyExists` continues.
pub fn creation_result<T>(result: Result<T, StoreError>) -> ReconcileResult {
    match result {
        Ok(_) => ReconcileResult::end(),
        Err(e) if e.is_already_exists() => ReconcileResult::next(),
        Err(e) => ReconcileResult::error(e),
    }
}

/// Map the outcome of an update onto a step result
///
/// Success continues. A conflict requeues after `conflict_delay` without an error.
pub fn update_result<T>(result: Result<T, StoreError>, conflict_delay: Duration) -> ReconcileResult {
    match result {
        Ok(_) => ReconcileResult::next(),
        Err(e) if e.is_conflict() => {
            debug!(error = %e, delay_secs = conflict_delay.as_secs(), "update conflicted, requeueing");
            ReconcileResult::requeue(conflict_delay)
        }
        Err(e) => ReconcileResult::error(e),
    }
}
