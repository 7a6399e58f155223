//! Bounded FIFO of segment keys driving retention

use std::collections::VecDeque;

/// Keys of retained segments, oldest first. The active segment is the newest entry.
#[derive(Debug, Clone)]
pub struct RotationLedger {
    keys: VecDeque<String>,
    retention_limit: usize,
}

impl RotationLedger {
    pub fn new(retention_limit: usize) -> Self {
        debug_assert!(retention_limit >= 1, "Precondition: retention_limit >= 1");
        RotationLedger {
            keys: VecDeque::with_capacity(2 * retention_limit),
            retention_limit,
        }
    }

    /// Next key to evict so that one more key fits within retention
    pub fn pop_for_admission(&mut self) -> Option<String> {
        if self.keys.len() >= self.retention_limit {
            self.keys.pop_front()
        } else {
            None
        }
    }

    /// Enqueue a new key. Callers evict first; the ledger never exceeds
    /// twice the retention limit.
    pub fn push(&mut self, key: String) {
        debug_assert!(
            self.keys.len() < 2 * self.retention_limit,
            "Invariant violated: ledger over capacity"
        );
        debug_assert!(
            !self.keys.contains(&key),
            "Invariant violated: duplicate key in ledger"
        );
        self.keys.push_back(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn retention_limit(&self) -> usize {
        self.retention_limit
    }

    /// Retained keys, oldest first
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_evicts_oldest() {
        let mut ledger = RotationLedger::new(3);
        for i in 0..3 {
            assert!(ledger.pop_for_admission().is_none());
            ledger.push(format!("k{}", i));
        }

        assert_eq!(ledger.pop_for_admission().as_deref(), Some("k0"));
        assert!(ledger.pop_for_admission().is_none());
        ledger.push("k3".to_string());

        let keys: Vec<_> = ledger.keys().collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn test_retention_one_keeps_only_newest() {
        let mut ledger = RotationLedger::new(1);
        ledger.push("a".to_string());
        assert_eq!(ledger.pop_for_admission().as_deref(), Some("a"));
        ledger.push("b".to_string());
        assert_eq!(ledger.keys().collect::<Vec<_>>(), vec!["b"]);
    }
}
