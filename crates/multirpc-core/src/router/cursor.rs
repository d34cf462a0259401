//! Failover cursor and per-request scan state.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::EndpointFailure;

/// Index of the endpoint a failover router currently sends to.
///
/// Only ever moved by compare-and-swap from a value the caller observed, so
/// a single failure can move it by at most one position no matter how many
/// concurrent requests saw that failure.
pub(crate) struct Cursor {
    index: AtomicUsize,
    len: usize,
}

impl Cursor {
    pub(crate) fn new(len: usize) -> Self {
        debug_assert!(len > 0);
        Self {
            index: AtomicUsize::new(0),
            len,
        }
    }

    pub(crate) fn get(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    /// Move from `from` to the next index. Returns the new index if this
    /// call moved it, `None` if the cursor had already left `from`.
    pub(crate) fn advance(&self, from: usize) -> Option<usize> {
        let to = (from + 1) % self.len;
        self.index
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| to)
    }

    /// Point the cursor at `to` if it still reads `observed`.
    pub(crate) fn settle(&self, observed: usize, to: usize) -> bool {
        observed != to
            && self
                .index
                .compare_exchange(observed, to, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

/// Which endpoints one logical request has already tried.
pub(crate) struct Scan {
    tried: Vec<bool>,
    attempts: usize,
    pub(crate) failures: Vec<EndpointFailure>,
}

impl Scan {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            tried: vec![false; len],
            attempts: 0,
            failures: Vec::new(),
        }
    }

    /// Pick the next endpoint: the cursor's, or the first untried one after
    /// it when another request left the cursor on an endpoint this request
    /// already tried. Returns `(observed_cursor, index)`, or `None` once
    /// every endpoint has been tried.
    pub(crate) fn next(&mut self, cursor: &Cursor) -> Option<(usize, usize)> {
        let len = self.tried.len();
        if self.attempts == len {
            return None;
        }
        let observed = cursor.get();
        let index = (0..len)
            .map(|k| (observed + k) % len)
            .find(|&i| !self.tried[i])?;
        self.tried[index] = true;
        self.attempts += 1;
        Some((observed, index))
    }

    /// Whether failing at `index` may advance the cursor: only when the
    /// successor has not been tried yet.
    pub(crate) fn may_advance_from(&self, index: usize) -> bool {
        !self.tried[(index + 1) % self.tried.len()]
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_wraps() {
        let c = Cursor::new(3);
        assert_eq!(c.advance(0), Some(1));
        assert_eq!(c.advance(1), Some(2));
        assert_eq!(c.advance(2), Some(0));
    }

    #[test]
    fn stale_advance_is_ignored() {
        let c = Cursor::new(3);
        assert_eq!(c.advance(0), Some(1));
        // a second observer of the same failure at 0
        assert_eq!(c.advance(0), None);
        assert_eq!(c.get(), 1);
    }

    #[test]
    fn settle_only_from_observed() {
        let c = Cursor::new(3);
        assert!(!c.settle(0, 0));
        assert!(c.settle(0, 2));
        assert_eq!(c.get(), 2);
        assert!(!c.settle(0, 1));
        assert_eq!(c.get(), 2);
    }

    #[test]
    fn scan_visits_each_index_once() {
        let c = Cursor::new(3);
        c.advance(0);
        let mut scan = Scan::new(3);
        let mut seen = Vec::new();
        while let Some((_, i)) = scan.next(&c) {
            seen.push(i);
        }
        // cursor never moved, so the scan walks forward from it
        assert_eq!(seen, vec![1, 2, 0]);
        assert_eq!(scan.attempts(), 3);
    }

    #[test]
    fn last_untried_blocks_advance() {
        let c = Cursor::new(2);
        let mut scan = Scan::new(2);
        let (_, first) = scan.next(&c).unwrap();
        assert!(scan.may_advance_from(first));
        c.advance(first);
        let (_, second) = scan.next(&c).unwrap();
        assert_eq!(second, 1);
        assert!(!scan.may_advance_from(second));
    }
}
