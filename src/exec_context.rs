use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::Error;

/// Carries cancellation and an optional deadline through every blocking operation (execute, next,
/// draining into a row container, fetching through a reader).
///
/// Cloning an `ExecContext` yields a context observing the same cancellation flag, so a
/// [`CancelHandle`] obtained from any clone cancels all of them.
///
/// ```
/// use stmt_cursor::{Error, ExecContext};
///
/// let ctx = ExecContext::background();
/// let handle = ctx.cancel_handle();
/// assert!(ctx.check().is_ok());
/// handle.cancel();
/// assert!(matches!(ctx.check(), Err(Error::Canceled)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    canceled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// A context which is never canceled and has no deadline, unless canceled via its handle.
    pub fn background() -> Self {
        Self::default()
    }

    /// Same cancellation flag, but the operation must complete before `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            canceled: self.canceled.clone(),
            deadline: Some(deadline),
        }
    }

    /// Same cancellation flag, deadline `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Handle which can be moved to another thread in order to cancel operations observing this
    /// context.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            canceled: self.canceled.clone(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// `Err(Canceled)` after cancellation, `Err(DeadlineExceeded)` once the deadline passed,
    /// `Ok(())` otherwise. Cancellation takes precedence.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Cancels every [`ExecContext`] sharing its flag.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }
}
