//! Cancellation and deadline propagation.
//!
//! Every call that suspends on I/O takes a [`CallContext`]. The context never
//! starts work on its own; it only decides when in-flight work must stop.
//! [`CallContext::run`] races a future against the cancel signal and the
//! deadline and drops the future as soon as either fires.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a call was cut short by its [`CallContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Interrupted {
    /// The owning [`CancelHandle`] fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The context deadline passed before the call finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal plus optional deadline for a single call chain.
///
/// Cloning is cheap; all clones observe the same cancel signal.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Owner side of a cancellable [`CallContext`].
///
/// Dropping the handle without calling [`CancelHandle::cancel`] leaves the
/// context live forever (subject to its deadline).
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels every context created from this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once [`CancelHandle::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CallContext {
    /// A context that never cancels and never expires.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().timeout(timeout)
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().deadline_at(deadline)
    }

    /// A context that can be cancelled through the returned handle.
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Tightens the deadline to at most `timeout` from now.
    ///
    /// An existing earlier deadline is kept.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.deadline_at(deadline),
            None => self,
        }
    }

    /// Tightens the deadline to at most `deadline`.
    #[must_use]
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        });
        self
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Reports whether the context is already cancelled or expired.
    ///
    /// # Errors
    ///
    /// Returns the reason the context is no longer usable.
    pub fn check(&self) -> Result<(), Interrupted> {
        if let Some(rx) = &self.cancel {
            if *rx.borrow() {
                return Err(Interrupted::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if deadline <= Instant::now() {
                return Err(Interrupted::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Drives `fut` until it completes, the context is cancelled, or the
    /// deadline passes. The future is dropped on interruption.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when the context fires first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        self.check()?;

        let cancelled = wait_cancelled(self.cancel.clone());
        let expired = wait_deadline(self.deadline);

        tokio::select! {
            biased;
            () = cancelled => Err(Interrupted::Cancelled),
            () = expired => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

async fn wait_cancelled(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return std::future::pending().await;
    };
    // A dropped sender can never cancel.
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
