//! The [`MetadataStore`] trait and its in-memory reference implementation.

use std::collections::BTreeMap;

use meridian_core::{CoreError, CoreResult};
use parking_lot::RwLock;

/// A single write in a [`MetadataStore::batch`] call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Write `value` at `key`, replacing any existing value.
    Put {
        /// The key to write.
        key: String,
        /// The new value.
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// The key to remove.
        key: String,
    },
}

/// The result of a [`MetadataStore::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Matching `(key, value)` pairs in lexicographic order.
    pub items: Vec<(String, Vec<u8>)>,
    /// Whether more matching keys exist past the returned page.
    pub has_more: bool,
}

/// A transactional key-value store with prefix scans and atomic batches.
///
/// Every method that mutates state is atomic with respect to every other
/// method on the same store: `batch` applies all its operations as one
/// unit, `compare_and_set` and `atomic_add` are themselves single atomic
/// primitives. Higher-level components compose these into the invariants
/// described in spec §3 and §5.
pub trait MetadataStore: Send + Sync {
    /// Read the value at `key`, if present.
    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;

    /// Write `value` at `key`, creating or replacing it.
    fn put(&self, key: &str, value: Vec<u8>) -> CoreResult<()>;

    /// Remove `key`, if present. Not an error if `key` is absent.
    fn delete(&self, key: &str) -> CoreResult<()>;

    /// Return up to `limit` keys with the given `prefix`, in lexicographic
    /// order, strictly after `start_after` (if given).
    fn scan(&self, prefix: &str, start_after: Option<&str>, limit: usize) -> CoreResult<ScanResult>;

    /// Apply every operation in `ops` atomically: either all take effect or
    /// none do.
    fn batch(&self, ops: Vec<BatchOp>) -> CoreResult<()>;

    /// Write `new` at `key` iff the current value equals `expected`
    /// (`None` meaning "key absent"). Returns whether the swap happened.
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> CoreResult<bool>;

    /// Atomically add `delta` to the `i64` counter stored at `key` (treated
    /// as absent == 0), returning the counter's new value.
    fn atomic_add(&self, counter_key: &str, delta: i64) -> CoreResult<i64>;
}

/// An in-memory [`MetadataStore`] backed by a single `RwLock<BTreeMap>`.
///
/// The whole-map lock makes every operation here trivially atomic and gives
/// scans a consistent, ordered snapshot; it serializes all writers globally,
/// which is the tradeoff spec §5 accepts ("writers serialize ... globally
/// via the store's transaction engine").
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryStore {
    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> CoreResult<()> {
        self.data.write().insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> CoreResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str, start_after: Option<&str>, limit: usize) -> CoreResult<ScanResult> {
        let data = self.data.read();
        let mut items = Vec::new();
        let mut has_more = false;

        for (k, v) in data.range(prefix.to_owned()..) {
            if !k.starts_with(prefix) {
                break;
            }
            if let Some(after) = start_after {
                if k.as_str() <= after {
                    continue;
                }
            }
            if items.len() == limit {
                has_more = true;
                break;
            }
            items.push((k.clone(), v.clone()));
        }

        Ok(ScanResult { items, has_more })
    }

    fn batch(&self, ops: Vec<BatchOp>) -> CoreResult<()> {
        let mut data = self.data.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Vec<u8>,
    ) -> CoreResult<bool> {
        let mut data = self.data.write();
        let current = data.get(key).map(Vec::as_slice);
        if current != expected {
            return Ok(false);
        }
        data.insert(key.to_owned(), new);
        Ok(true)
    }

    fn atomic_add(&self, counter_key: &str, delta: i64) -> CoreResult<i64> {
        let mut data = self.data.write();
        let current = data
            .get(counter_key)
            .map(|bytes| {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CoreError::invalid_input("corrupt counter value"))?;
                Ok::<i64, CoreError>(i64::from_be_bytes(arr))
            })
            .transpose()?
            .unwrap_or(0);
        let next = current + delta;
        data.insert(counter_key.to_owned(), next.to_be_bytes().to_vec());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_respects_prefix_and_order() {
        let store = InMemoryStore::new();
        store.put("B/b", b"2".to_vec()).unwrap();
        store.put("B/a", b"1".to_vec()).unwrap();
        store.put("A/x", b"0".to_vec()).unwrap();

        let result = store.scan("B/", None, 10).unwrap();
        assert_eq!(
            result.items,
            vec![
                ("B/a".to_owned(), b"1".to_vec()),
                ("B/b".to_owned(), b"2".to_vec()),
            ]
        );
        assert!(!result.has_more);
    }

    #[test]
    fn test_scan_pagination_via_start_after() {
        let store = InMemoryStore::new();
        for k in ["a", "b", "c", "d"] {
            store.put(&format!("O/{k}"), vec![]).unwrap();
        }
        let page1 = store.scan("O/", None, 2).unwrap();
        assert!(page1.has_more);
        let last_key = page1.items.last().unwrap().0.clone();
        let page2 = store.scan("O/", Some(&last_key), 2).unwrap();
        assert_eq!(page2.items.len(), 2);
        assert!(!page2.has_more);
    }

    #[test]
    fn test_compare_and_set_succeeds_only_on_match() {
        let store = InMemoryStore::new();
        store.put("k", b"v1".to_vec()).unwrap();

        assert!(!store.compare_and_set("k", Some(b"wrong"), b"v2".to_vec()).unwrap());
        assert!(store.compare_and_set("k", Some(b"v1"), b"v2".to_vec()).unwrap());
        assert_eq!(store.get("k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_compare_and_set_on_absent_key() {
        let store = InMemoryStore::new();
        assert!(store.compare_and_set("new", None, b"v".to_vec()).unwrap());
        assert!(!store.compare_and_set("new", None, b"v2".to_vec()).unwrap());
    }

    #[test]
    fn test_atomic_add_accumulates() {
        let store = InMemoryStore::new();
        assert_eq!(store.atomic_add("T/t1/counters.buckets", 1).unwrap(), 1);
        assert_eq!(store.atomic_add("T/t1/counters.buckets", 2).unwrap(), 3);
        assert_eq!(store.atomic_add("T/t1/counters.buckets", -1).unwrap(), 2);
    }

    #[test]
    fn test_batch_applies_all_or_nothing_in_one_lock_acquisition() {
        let store = InMemoryStore::new();
        store
            .batch(vec![
                BatchOp::Put {
                    key: "a".to_owned(),
                    value: b"1".to_vec(),
                },
                BatchOp::Put {
                    key: "b".to_owned(),
                    value: b"2".to_vec(),
                },
            ])
            .unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b").unwrap(), Some(b"2".to_vec()));

        store
            .batch(vec![
                BatchOp::Delete { key: "a".to_owned() },
                BatchOp::Put {
                    key: "c".to_owned(),
                    value: b"3".to_vec(),
                },
            ])
            .unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("c").unwrap(), Some(b"3".to_vec()));
    }
}
