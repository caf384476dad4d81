//! Cooperative cancellation for long-running backup work

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{VaultError, VaultResult};

/// Cancellation flag with an optional deadline
///
/// Clones share the flag, so a caller can keep one handle and pass another
/// into an operation. Checked between directory entries and pipeline stages;
/// an operation that sees it set removes its partial output and returns
/// [`VaultError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fail if cancelled; `stage` names where we stopped
    pub fn check(&self, stage: &str) -> VaultResult<()> {
        if self.is_cancelled() {
            return Err(VaultError::Cancelled(format!("cancelled during {}", stage)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(token.check("walk").is_ok());

        handle.cancel();
        assert!(matches!(token.check("walk"), Err(VaultError::Cancelled(_))));
    }

    #[test]
    fn test_deadline_expires() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());

        let token = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }
}
