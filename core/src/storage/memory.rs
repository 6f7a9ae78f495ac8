use super::{BatchOp, KvStore, Result, StorageError, WriteBatch};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Ordered in-memory store with the same batch semantics as the SQLite one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys starting with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut entries = self.entries.write();

        // Validate first so a rejected batch leaves nothing behind.
        for op in batch.ops() {
            if let BatchOp::Insert { key, .. } = op {
                if entries.contains_key(key) {
                    return Err(StorageError::KeyExists(key.clone()));
                }
            }
        }

        for op in batch.ops {
            match op {
                BatchOp::Insert { key, value } | BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
            }
        }
        Ok(())
    }
}
