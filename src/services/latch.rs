//! One-shot latch for client-side callback handling.

use dashmap::DashSet;
use std::sync::Arc;

/// Lets exactly one caller proceed per key, however many times the
/// callback for that key is delivered.
#[derive(Clone, Default)]
pub struct ExchangeLatch {
    claimed: Arc<DashSet<String>>,
}

impl ExchangeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first claim of `code`, false afterwards.
    pub fn try_claim(&self, code: &str) -> bool {
        self.claimed.insert(code.to_string())
    }

    pub fn is_claimed(&self, code: &str) -> bool {
        self.claimed.contains(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_once_per_code() {
        let latch = ExchangeLatch::new();
        assert!(latch.try_claim("a"));
        assert!(!latch.try_claim("a"));
        assert!(latch.try_claim("b"));
        assert!(latch.is_claimed("a"));
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let latch = ExchangeLatch::new();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| latch.try_claim("code") as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }
}
