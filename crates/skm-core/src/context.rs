//! Run context: one deadline and one cancellation flag threaded through
//! every suspend point of a migration.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a suspend point was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The caller cancelled the run
    #[error("operation cancelled")]
    Cancelled,

    /// The run's deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancels every [`RunContext`] cloned from the one it was created with
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left
        self.0.send_replace(true);
    }
}

/// Deadline and cancellation carried through a run
#[derive(Debug, Clone)]
pub struct RunContext {
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
}

impl RunContext {
    /// New context without a deadline, plus its cancel handle
    #[must_use]
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: rx,
            },
            CancelHandle(tx),
        )
    }

    /// Context that can never be cancelled and has no deadline
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new().0
    }

    /// With a deadline `timeout` from now
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// With an absolute deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline, if any
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the run was cancelled or is past its deadline
    pub fn check(&self) -> Result<(), ContextError> {
        if *self.cancel.borrow() {
            return Err(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Suspend for `duration` unless cancelled or the deadline falls first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        self.check()?;

        let wake = Instant::now() + duration;
        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            loop {
                if cancel.changed().await.is_err() {
                    // Handle dropped: nobody can cancel any more.
                    std::future::pending::<()>().await;
                }
                if *cancel.borrow_and_update() {
                    return;
                }
            }
        };

        match self.deadline {
            Some(deadline) if deadline < wake => tokio::select! {
                () = tokio::time::sleep_until(deadline) => Err(ContextError::DeadlineExceeded),
                () = cancelled => Err(ContextError::Cancelled),
            },
            _ => tokio::select! {
                () = tokio::time::sleep_until(wake) => Ok(()),
                () = cancelled => Err(ContextError::Cancelled),
            },
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_deadline() {
        let ctx = RunContext::unbounded();
        let start = Instant::now();
        ctx.sleep(Duration::from_secs(3)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_sleep_short() {
        let ctx = RunContext::unbounded().with_timeout(Duration::from_secs(2));
        let start = Instant::now();
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let (ctx, handle) = RunContext::new();
        let sleeper = ctx.clone();
        let task = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(ContextError::Cancelled));
        assert_eq!(ctx.check(), Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_never_cancels() {
        let (ctx, handle) = RunContext::new();
        drop(handle);
        assert!(ctx.sleep(Duration::from_millis(500)).await.is_ok());
    }
}
