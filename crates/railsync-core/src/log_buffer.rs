// ── Bounded log buffer ──
//
// Fixed-capacity FIFO log. Appending past capacity evicts from the head,
// so the buffer always holds the newest `capacity` entries in insertion
// order.

use std::collections::VecDeque;

/// A fixed-capacity, insertion-ordered log.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    /// Create an empty log. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the tail, evicting the oldest entries beyond capacity.
    pub fn append(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
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
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The most recently appended entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<'a, T> IntoIterator for &'a BoundedLog<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overflow_keeps_the_newest_entries_in_order() {
        let mut log = BoundedLog::new(500);
        for i in 1..=600 {
            log.append(i);
        }
        assert_eq!(log.len(), 500);
        let kept: Vec<i32> = log.iter().copied().collect();
        let expected: Vec<i32> = (101..=600).collect();
        assert_eq!(kept, expected);
        assert_eq!(log.latest(), Some(&600));
    }

    #[test]
    fn under_capacity_keeps_everything() {
        let mut log = BoundedLog::new(3);
        log.append("a");
        log.append("b");
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn clear_then_reuse() {
        let mut log = BoundedLog::new(2);
        log.append(1);
        log.append(2);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.latest(), None);
        log.append(3);
        assert_eq!(log.len(), 1);
        assert_eq!(log.capacity(), 2);
    }

    #[test]
    fn zero_capacity_is_normalised() {
        let mut log = BoundedLog::new(0);
        log.append('x');
        log.append('y');
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.latest(), Some(&'y'));
        assert_eq!(log.len(), 1);
    }
}
