// ── Bounded message log ──

use std::collections::VecDeque;

/// Append-only log that evicts its oldest entry once full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingLog<T> {
    /// A log holding at most `capacity` entries (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<T: Clone> RingLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut log = RingLog::with_capacity(3);
        for n in 1..=5 {
            log.push(n);
        }
        assert_eq!(log.to_vec(), vec![3, 4, 5]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let mut log = RingLog::with_capacity(0);
        log.push("a");
        log.push("b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.last(), Some(&"b"));
    }

    #[test]
    fn clear_empties() {
        let mut log = RingLog::with_capacity(4);
        log.push(1);
        log.clear();
        assert!(log.is_empty());
    }
}
