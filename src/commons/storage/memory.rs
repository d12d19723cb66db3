//! In-memory storage backend.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use url::Url;

use crate::commons::storage::{DocPath, Error, Write};

//------------ MemoryStore ---------------------------------------------------

/// A versioned in-memory document table.
///
/// Every path keeps a version counter that is bumped on each write,
/// including deletion. Deleted documents leave a tombstone behind so a
/// transaction that read "absent" conflicts with a concurrent
/// create-then-delete of the same path.
///
/// Cloned handles share the same table, so concurrent handlers in one
/// process contend the way they would against a remote store.
#[derive(Clone, Debug)]
pub(super) struct MemoryStore {
    inner: Arc<Mutex<Documents>>,
    label: String,
}

impl MemoryStore {
    /// Creates a store if the URI carries the `memory` scheme.
    pub(super) fn from_uri(uri: &Url) -> Option<Self> {
        if uri.scheme() != "memory" {
            return None;
        }
        Some(MemoryStore {
            inner: Arc::default(),
            label: uri.to_string(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Documents> {
        self.inner.lock().expect("poisoned lock")
    }
}

/// # Reading
impl MemoryStore {
    pub(super) fn get(&self, path: &DocPath) -> Option<Value> {
        self.lock().docs.get(path).and_then(|doc| doc.value.clone())
    }

    /// Takes a consistent snapshot of the named paths.
    ///
    /// Returns the current values alongside the version each value was
    /// read at. Absent documents snapshot as `None` at version 0.
    pub(super) fn snapshot(&self, paths: &[DocPath]) -> Snapshot {
        let docs = self.lock();
        let mut values = HashMap::new();
        let mut versions = HashMap::new();
        for path in paths {
            match docs.docs.get(path) {
                Some(doc) => {
                    values.insert(path.clone(), doc.value.clone());
                    versions.insert(path.clone(), doc.version);
                }
                None => {
                    values.insert(path.clone(), None);
                    versions.insert(path.clone(), 0);
                }
            }
        }
        Snapshot { values, versions }
    }

    pub(super) fn list_subtree(&self, prefix: &DocPath) -> Vec<DocPath> {
        let docs = self.lock();
        let mut paths: Vec<DocPath> = docs
            .docs
            .iter()
            .filter(|(path, doc)| doc.value.is_some() && path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub(super) fn is_empty(&self) -> bool {
        self.lock().docs.values().all(|doc| doc.value.is_none())
    }
}

/// # Writing
impl MemoryStore {
    /// Commits staged writes if none of the snapshotted versions moved.
    ///
    /// Returns false on a conflict, leaving the table untouched.
    pub(super) fn commit(&self, snapshot: &Snapshot, writes: &[Write]) -> bool {
        let mut docs = self.lock();
        for (path, version) in &snapshot.versions {
            let current = docs.docs.get(path).map(|doc| doc.version).unwrap_or(0);
            if current != *version {
                return false;
            }
        }
        for write in writes {
            docs.apply(write);
        }
        true
    }

    /// Applies all writes, or none if a create hits an existing document.
    pub(super) fn batch(&self, writes: &[Write]) -> Result<(), Error> {
        let mut docs = self.lock();
        for write in writes {
            if let Write::Create(path, _) = write {
                let occupied = docs
                    .docs
                    .get(path)
                    .map(|doc| doc.value.is_some())
                    .unwrap_or(false);
                if occupied {
                    return Err(Error::AlreadyExists(path.clone()));
                }
            }
        }
        for write in writes {
            docs.apply(write);
        }
        Ok(())
    }
}

impl fmt::Display for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

//------------ Snapshot ------------------------------------------------------

#[derive(Debug)]
pub(super) struct Snapshot {
    pub(super) values: HashMap<DocPath, Option<Value>>,
    versions: HashMap<DocPath, u64>,
}

//------------ Documents -----------------------------------------------------

#[derive(Debug, Default)]
struct Documents {
    docs: HashMap<DocPath, Versioned>,
}

impl Documents {
    fn apply(&mut self, write: &Write) {
        match write {
            Write::Set(path, value) | Write::Create(path, value) => {
                let doc = self.docs.entry(path.clone()).or_default();
                doc.value = Some(value.clone());
                doc.version += 1;
            }
            Write::Delete(path) => {
                if let Some(doc) = self.docs.get_mut(path) {
                    doc.value = None;
                    doc.version += 1;
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Versioned {
    value: Option<Value>,
    version: u64,
}
