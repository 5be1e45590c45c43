//! Volatile storage for replicas under test.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chained_bft::persistence::pluggables::{KVGet, KVStore, WriteBatch};

/// Key-value storage shared by every handle of one replica.
///
/// Write batches are applied under a single lock, so readers never see half a batch.
#[derive(Clone, Default)]
pub(crate) struct MemDB {
    stored: Arc<Mutex<Stored>>,
}

#[derive(Default)]
struct Stored {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    batches_written: usize,
}

impl MemDB {
    pub(crate) fn new() -> MemDB {
        MemDB::default()
    }

    /// Get the number of write batches applied so far.
    pub(crate) fn batches_written(&self) -> usize {
        self.lock().batches_written
    }

    fn lock(&self) -> MutexGuard<'_, Stored> {
        self.stored.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KVStore for MemDB {
    type WriteBatch = Batch;
    type Snapshot<'a> = Frozen;

    fn write(&mut self, wb: Batch) {
        let mut stored = self.lock();
        for op in wb.0 {
            match op {
                Op::Put(key, value) => {
                    stored.entries.insert(key, value);
                }
                Op::Remove(key) => {
                    stored.entries.remove(&key);
                }
            }
        }
        stored.batches_written += 1;
    }

    fn clear(&mut self) {
        self.lock().entries.clear();
    }

    fn snapshot<'b>(&'b self) -> Frozen {
        Frozen(self.lock().entries.clone())
    }
}

impl KVGet for MemDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.lock().entries.get(key).cloned()
    }
}

enum Op {
    Put(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
}

/// Operations applied in the order they were added, so the last operation on a key wins.
pub(crate) struct Batch(Vec<Op>);

impl WriteBatch for Batch {
    fn new() -> Self {
        Batch(Vec::new())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.0.push(Op::Put(key.to_vec(), value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.0.push(Op::Remove(key.to_vec()));
    }
}

/// A copy of the entries of a [`MemDB`], unaffected by later writes.
pub(crate) struct Frozen(BTreeMap<Vec<u8>, Vec<u8>>);

impl KVGet for Frozen {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.get(key).cloned()
    }
}
