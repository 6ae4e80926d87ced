//! Deadline and cancellation for multi-step dataset operations.
//!
//! Kernel calls cannot be interrupted once issued. A recursive operation
//! checks its context before each call and stops issuing new ones once the
//! deadline has passed or the caller has cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ZfsError, ZfsResult};

/// Absolute point in time after which no new command is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    expiry: Instant,
}

impl Deadline {
    /// Creates a new deadline from now + timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            expiry: Instant::now() + timeout,
        }
    }

    /// Creates a deadline at a fixed instant.
    pub fn at(expiry: Instant) -> Self {
        Self { expiry }
    }

    /// Returns the remaining time, or `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.expiry
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }
}

/// A lightweight, cloneable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone of the token observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether any clone has called [`CancelToken::cancel`].
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation state carried by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Deadline>,
    cancel: CancelToken,
}

impl OpContext {
    /// Creates a context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context with a deadline set to now + timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Deadline::new(timeout)),
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the deadline.
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Replaces the cancel token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    /// The token callers cancel through.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fails if the caller cancelled or the deadline passed.
    pub fn check(&self, command: &str) -> ZfsResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ZfsError::Cancelled {
                command: command.to_string(),
            });
        }
        if self.deadline.map(|d| d.is_expired()).unwrap_or(false) {
            return Err(ZfsError::DeadlineExceeded {
                command: command.to_string(),
            });
        }
        Ok(())
    }
}
