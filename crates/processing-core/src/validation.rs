//! Capped log of per-target validation problems.
//!
//! A bake pass over many targets keeps going when one of them is
//! misconfigured. Problems are collected here and reported together at the
//! end.

use std::ops::{Deref, DerefMut};

/// Entries kept before further messages are only counted.
pub const DEFAULT_CAPACITY: usize = 40;

#[derive(Debug, Clone)]
pub struct ValidationLog {
    entries: Vec<String>,
    capacity: usize,
    dedup: bool,
    dropped: usize,
}

impl Default for ValidationLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ValidationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            dedup: false,
            dropped: 0,
        }
    }

    /// Record a message. Returns whether it was stored.
    ///
    /// Repeats are skipped while deduplication is on; anything past the
    /// capacity is counted in [`ValidationLog::dropped`].
    pub fn push(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if self.dedup && self.entries.contains(&message) {
            return false;
        }
        if self.entries.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        tracing::warn!(problem = %message, "Validation problem");
        self.entries.push(message);
        true
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.dropped == 0
    }

    /// Messages past the capacity.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_deduplicating(&self) -> bool {
        self.dedup
    }

    /// Turn deduplication on until the returned guard is dropped.
    pub fn dedup_scope(&mut self) -> DedupScope<'_> {
        let previous = self.dedup;
        self.dedup = true;
        DedupScope {
            log: self,
            previous,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }

    /// Move all entries out, leaving the log empty.
    pub fn take(&mut self) -> Vec<String> {
        self.dropped = 0;
        std::mem::take(&mut self.entries)
    }
}

/// Restores the previous deduplication setting on drop.
pub struct DedupScope<'a> {
    log: &'a mut ValidationLog,
    previous: bool,
}

impl Deref for DedupScope<'_> {
    type Target = ValidationLog;

    fn deref(&self) -> &ValidationLog {
        self.log
    }
}

impl DerefMut for DedupScope<'_> {
    fn deref_mut(&mut self) -> &mut ValidationLog {
        self.log
    }
}

impl Drop for DedupScope<'_> {
    fn drop(&mut self) {
        self.log.dedup = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_caps_entries() {
        let mut log = ValidationLog::with_capacity(2);
        assert!(log.push("a"));
        assert!(log.push("b"));
        assert!(!log.push("c"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_default_capacity_is_forty() {
        let mut log = ValidationLog::new();
        for i in 0..50 {
            log.push(format!("problem {i}"));
        }
        assert_eq!(log.len(), 40);
        assert_eq!(log.dropped(), 10);
    }

    #[test]
    fn test_duplicates_are_kept_without_dedup() {
        let mut log = ValidationLog::new();
        log.push("same");
        log.push("same");
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_dedup_scope_restores_previous_setting() {
        let mut log = ValidationLog::new();
        {
            let mut scoped = log.dedup_scope();
            assert!(scoped.push("same"));
            assert!(!scoped.push("same"));
            assert!(scoped.is_deduplicating());
            {
                let inner = scoped.dedup_scope();
                assert!(inner.is_deduplicating());
            }
            // Nested scope restores `true`, not `false`.
            assert!(scoped.is_deduplicating());
        }
        assert!(!log.is_deduplicating());
        assert!(log.push("same"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_take_empties_log() {
        let mut log = ValidationLog::new();
        log.push("a");
        assert_eq!(log.take(), vec!["a".to_string()]);
        assert!(log.is_empty());
    }
}
