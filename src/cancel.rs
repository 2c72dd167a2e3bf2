//! Cooperative cancellation shared by indexing runs and queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, SourcedexError};

/// Cancellation flag with an optional wall-clock deadline.
///
/// Clones share the flag, so cancelling any clone cancels them all. The
/// deadline is per-clone and can be tightened with [`CancelToken::with_timeout`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that trips on its own once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child_with_timeout(timeout)
    }

    /// Share this token's flag with an additional, possibly earlier, deadline
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    /// `Err(Cancelled)` once the token has tripped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SourcedexError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(SourcedexError::Cancelled)));
    }

    #[test]
    fn test_deadline_trips() {
        let token = CancelToken::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_keeps_earlier_deadline() {
        let parent = CancelToken::with_timeout(Duration::from_millis(5));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
