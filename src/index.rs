//! The in-memory index: `key -> (file_id, value_offset, value_size,
//! timestamp)`, with a timestamp-monotone update rule.

use std::collections::HashMap;
use std::sync::RwLock;

/// Where a key's current value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub file_id: u64,
    pub value_offset: u64,
    pub value_size: usize,
    pub timestamp: u64,
}

/// A candidate update to apply to the index: the result of ingesting a
/// record from a live write, a recovery scan, or a compaction rewrite.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub file_id: u64,
    pub value_offset: u64,
    pub value_size: usize,
    pub timestamp: u64,
}

/// Concurrent key -> location map, protected by a single exclusive lock
/// held only around each individual update. Readers take a shared lock
/// for lookups and snapshots.
#[derive(Default)]
pub struct Index {
    map: RwLock<HashMap<Vec<u8>, IndexEntry>>,
}

impl Index {
    pub fn new() -> Self {
        Index { map: RwLock::new(HashMap::new()) }
    }

    /// Looks up a key's current location, if live.
    pub fn get(&self, key: &[u8]) -> Option<IndexEntry> {
        self.map.read().unwrap().get(key).copied()
    }

    /// Applies the timestamp-monotone update rule:
    ///
    /// 1. absent + size>0  -> insert
    /// 2. absent + size==0 -> no-op
    /// 3. present + candidate older -> discard
    /// 4. present + candidate newer-or-equal + size>0 -> overwrite
    /// 5. present + candidate newer-or-equal + size==0 -> remove
    ///
    /// Returns `true` if the candidate was applied (inserted, overwrote, or
    /// removed an entry), `false` if it was discarded as stale or a no-op.
    pub fn update(&self, key: &[u8], candidate: Candidate) -> bool {
        let mut map = self.map.write().unwrap();
        match map.get(key) {
            None => {
                if candidate.value_size == 0 {
                    return false;
                }
                map.insert(key.to_vec(), IndexEntry {
                    file_id: candidate.file_id,
                    value_offset: candidate.value_offset,
                    value_size: candidate.value_size,
                    timestamp: candidate.timestamp,
                });
                true
            }
            Some(existing) => {
                if candidate.timestamp < existing.timestamp {
                    return false;
                }
                if candidate.value_size > 0 {
                    map.insert(key.to_vec(), IndexEntry {
                        file_id: candidate.file_id,
                        value_offset: candidate.value_offset,
                        value_size: candidate.value_size,
                        timestamp: candidate.timestamp,
                    });
                } else {
                    map.remove(key);
                }
                true
            }
        }
    }

    /// Redirects a live key to a new location produced by compaction, but
    /// only if the index still points at exactly `(from_file_id,
    /// from_timestamp)` for this key — i.e. nothing newer landed on the
    /// active segment in the meantime. Returns `true` if the redirect was
    /// applied.
    pub fn redirect_if_unchanged(
        &self,
        key: &[u8],
        from_file_id: u64,
        from_timestamp: u64,
        to: Candidate,
    ) -> bool {
        let mut map = self.map.write().unwrap();
        match map.get(key) {
            Some(existing) if existing.file_id == from_file_id && existing.timestamp == from_timestamp => {
                map.insert(key.to_vec(), IndexEntry {
                    file_id: to.file_id,
                    value_offset: to.value_offset,
                    value_size: to.value_size,
                    timestamp: to.timestamp,
                });
                true
            }
            _ => false,
        }
    }

    /// A snapshot of the current live key set. Order is unspecified (spec
    /// §4.1, `list_keys`).
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.map.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn cand(file_id: u64, timestamp: u64, size: usize) -> Candidate {
        Candidate { file_id, value_offset: 0, value_size: size, timestamp }
    }

    // existing_timestamp, candidate_timestamp, candidate_size -> (applied, still_present)
    #[test_case(10, 20, 5 => (true, true); "newer write overwrites")]
    #[test_case(10, 5, 5 => (false, true); "older write discarded")]
    #[test_case(10, 10, 5 => (true, true); "equal timestamp overwrites")]
    #[test_case(10, 20, 0 => (true, false); "newer tombstone removes")]
    #[test_case(10, 5, 0 => (false, true); "older tombstone discarded")]
    fn update_rule_table(existing_ts: u64, candidate_ts: u64, candidate_size: usize) -> (bool, bool) {
        let idx = Index::new();
        idx.update(b"k", cand(1, existing_ts, 5));
        let applied = idx.update(b"k", cand(2, candidate_ts, candidate_size));
        (applied, idx.get(b"k").is_some())
    }

    #[test]
    fn insert_then_overwrite() {
        let idx = Index::new();
        assert!(idx.update(b"k", cand(1, 10, 5)));
        assert_eq!(idx.get(b"k").unwrap().file_id, 1);
        assert!(idx.update(b"k", cand(2, 20, 5)));
        assert_eq!(idx.get(b"k").unwrap().file_id, 2);
    }

    #[test]
    fn stale_candidate_discarded() {
        let idx = Index::new();
        idx.update(b"k", cand(2, 20, 5));
        assert!(!idx.update(b"k", cand(1, 10, 5)));
        assert_eq!(idx.get(b"k").unwrap().file_id, 2);
    }

    #[test]
    fn tombstone_removes_entry() {
        let idx = Index::new();
        idx.update(b"k", cand(1, 10, 5));
        assert!(idx.update(b"k", cand(1, 20, 0)));
        assert!(idx.get(b"k").is_none());
    }

    #[test]
    fn tombstone_on_absent_key_is_noop() {
        let idx = Index::new();
        assert!(!idx.update(b"k", cand(1, 10, 0)));
        assert!(idx.get(b"k").is_none());
    }

    #[test]
    fn equal_timestamp_candidate_wins() {
        let idx = Index::new();
        idx.update(b"k", cand(1, 10, 5));
        assert!(idx.update(b"k", cand(2, 10, 5)));
        assert_eq!(idx.get(b"k").unwrap().file_id, 2);
    }

    #[test]
    fn redirect_requires_unchanged_origin() {
        let idx = Index::new();
        idx.update(b"k", cand(1, 10, 5));
        assert!(idx.redirect_if_unchanged(b"k", 1, 10, cand(9, 10, 5)));
        assert_eq!(idx.get(b"k").unwrap().file_id, 9);

        idx.update(b"k", cand(1, 10, 5));
        idx.update(b"k", cand(5, 99, 5)); // a newer write landed in the meantime
        assert!(!idx.redirect_if_unchanged(b"k", 1, 10, cand(9, 10, 5)));
        assert_eq!(idx.get(b"k").unwrap().file_id, 5);
    }
}
