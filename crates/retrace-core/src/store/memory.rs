//! In-memory store backend.
//!
//! Keeps the whole corpus in process memory behind a `RwLock`. Used by the
//! test suite and by one-shot correlation runs that load a corpus from a
//! file and never persist it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::error::Result;
use crate::ident::Identifier;

use super::{KnownIdentifier, KnownIdentifierStore};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<Identifier, KnownIdentifier>,
    tags: BTreeMap<Identifier, BTreeSet<String>>,
}

/// Volatile store; contents vanish with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl KnownIdentifierStore for MemoryStore {
    fn contains(&self, id: Identifier) -> Result<bool> {
        Ok(self.read().records.contains_key(&id))
    }

    fn all(&self) -> Result<BTreeSet<Identifier>> {
        Ok(self.read().records.keys().copied().collect())
    }

    fn insert_if_absent(&self, record: &KnownIdentifier) -> Result<bool> {
        let mut inner = self.write();
        inner
            .tags
            .entry(record.id)
            .or_default()
            .insert(record.provenance.clone());

        if inner.records.contains_key(&record.id) {
            return Ok(false);
        }
        inner.records.insert(record.id, record.clone());
        Ok(true)
    }

    fn sources(&self, id: Identifier) -> Result<Vec<String>> {
        Ok(self
            .read()
            .tags
            .get(&id)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.read().records.len() as u64)
    }
}
