//! Cooperative cancellation signal shared between a worker and its owner.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A one-way "please stop" flag.
///
/// Clones observe the same flag.  Once cancelled a token stays cancelled;
/// a restarted worker gets a fresh token instead of a reset one.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn fresh_tokens_are_independent() {
        let old = CancellationToken::new();
        old.cancel();
        assert!(!CancellationToken::new().is_cancelled());
    }
}
