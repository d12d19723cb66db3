//! The multi-document store.
//!
//! The engine only ever talks to [`Store`]: point reads, optimistic
//! transactions over an explicitly named document set, all-or-nothing
//! batches, and subtree listing for recursive deletion. Which backend
//! sits underneath is selected by URI scheme and invisible above this
//! module.

use std::fmt;

use log::debug;
use serde::de::DeserializeOwned;
use serde::ser::Serialize;
use serde_json::Value;
use url::Url;

use crate::commons::storage::memory::{MemoryStore, Snapshot};
use crate::commons::storage::DocPath;
use crate::constants::{SUBTREE_DELETE_BATCH, TXN_MAX_ATTEMPTS};

//------------ Store ---------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Store(StoreInner);

#[derive(Clone, Debug)]
enum StoreInner {
    Memory(MemoryStore),
}

impl Store {
    /// Creates a new store for the given URI.
    ///
    /// Currently only the `memory:` scheme is supported. Cloned handles
    /// share the underlying documents.
    pub fn new(storage_uri: &Url) -> Result<Self, Error> {
        if let Some(inner) = MemoryStore::from_uri(storage_uri) {
            return Ok(Store(StoreInner::Memory(inner)));
        }
        Err(Error::UnknownScheme(storage_uri.scheme().to_string()))
    }

    fn memory(&self) -> &MemoryStore {
        match &self.0 {
            StoreInner::Memory(inner) => inner,
        }
    }

    /// Point read outside any transaction.
    ///
    /// Returns `None` if the document does not exist, an error if it
    /// cannot be deserialized.
    pub fn get<T: DeserializeOwned>(&self, path: &DocPath) -> Result<Option<T>, Error> {
        match self.memory().get(path) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| Error::deserialize(path, err)),
            None => Ok(None),
        }
    }

    /// Runs an optimistic transaction over the named document set.
    ///
    /// The closure may read and write the named paths only; touching
    /// anything else is an error, which keeps conflicts limited to
    /// writers of the same documents. If any named document changed
    /// between snapshot and commit the closure is run again from a
    /// fresh snapshot, up to a bounded number of attempts.
    ///
    /// The closure's error type only needs a conversion from the
    /// storage error, so callers can use `?` on both storage calls and
    /// their own fallible logic.
    pub fn run_transaction<F, T, E>(&self, paths: &[DocPath], op: F) -> Result<T, E>
    where
        F: Fn(&mut Transaction) -> Result<T, E>,
        E: From<Error>,
    {
        for attempt in 1..=TXN_MAX_ATTEMPTS {
            let snapshot = self.memory().snapshot(paths);
            let mut txn = Transaction::new(snapshot);
            let outcome = op(&mut txn)?;
            if self.memory().commit(&txn.snapshot, &txn.staged) {
                if attempt > 1 {
                    debug!("transaction committed after {} attempts", attempt);
                }
                return Ok(outcome);
            }
            debug!("transaction read set changed concurrently, retrying (attempt {})", attempt);
            std::thread::sleep(std::time::Duration::from_millis(attempt as u64));
        }
        Err(E::from(Error::Contention(TXN_MAX_ATTEMPTS)))
    }

    /// Applies the writes atomically, without a read set.
    pub fn batch(&self, writes: Vec<Write>) -> Result<(), Error> {
        self.memory().batch(&writes)
    }

    /// Returns every document path at or under the prefix.
    pub fn list_subtree(&self, prefix: &DocPath) -> Result<Vec<DocPath>, Error> {
        Ok(self.memory().list_subtree(prefix))
    }

    /// Returns true if the store has no documents at all.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.memory().is_empty())
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            StoreInner::Memory(inner) => inner.fmt(f),
        }
    }
}

//------------ Transaction ---------------------------------------------------

/// A consistent view over a named document set plus staged writes.
///
/// Reads see staged writes. Writes are applied only if the whole
/// transaction commits.
#[derive(Debug)]
pub struct Transaction {
    snapshot: Snapshot,
    staged: Vec<Write>,
}

impl Transaction {
    fn new(snapshot: Snapshot) -> Self {
        Transaction {
            snapshot,
            staged: Vec::new(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &DocPath) -> Result<Option<T>, Error> {
        for write in self.staged.iter().rev() {
            match write {
                Write::Set(p, value) | Write::Create(p, value) if p == path => {
                    return serde_json::from_value(value.clone())
                        .map(Some)
                        .map_err(|err| Error::deserialize(path, err));
                }
                Write::Delete(p) if p == path => return Ok(None),
                _ => {}
            }
        }
        match self.snapshot.values.get(path) {
            None => Err(Error::UndeclaredRead(path.clone())),
            Some(None) => Ok(None),
            Some(Some(value)) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|err| Error::deserialize(path, err)),
        }
    }

    pub fn set<T: Serialize>(&mut self, path: &DocPath, value: &T) -> Result<(), Error> {
        self.check_declared(path)?;
        let value = serde_json::to_value(value).map_err(|err| Error::serialize(path, err))?;
        self.staged.push(Write::Set(path.clone(), value));
        Ok(())
    }

    pub fn delete(&mut self, path: &DocPath) -> Result<(), Error> {
        self.check_declared(path)?;
        self.staged.push(Write::Delete(path.clone()));
        Ok(())
    }

    fn check_declared(&self, path: &DocPath) -> Result<(), Error> {
        if self.snapshot.values.contains_key(path) {
            Ok(())
        } else {
            Err(Error::UndeclaredWrite(path.clone()))
        }
    }
}

//------------ Write ---------------------------------------------------------

/// A single document write, for use with [`Store::batch`].
#[derive(Clone, Debug)]
pub enum Write {
    /// Store a value, overwriting an existing document.
    Set(DocPath, Value),
    /// Store a value, failing the whole batch if the document exists.
    Create(DocPath, Value),
    /// Remove the document. Removing an absent document is a no-op.
    Delete(DocPath),
}

impl Write {
    pub fn set<T: Serialize>(path: &DocPath, value: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(value).map_err(|err| Error::serialize(path, err))?;
        Ok(Write::Set(path.clone(), value))
    }

    pub fn create<T: Serialize>(path: &DocPath, value: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(value).map_err(|err| Error::serialize(path, err))?;
        Ok(Write::Create(path.clone(), value))
    }

    pub fn delete(path: &DocPath) -> Self {
        Write::Delete(path.clone())
    }

    pub fn path(&self) -> &DocPath {
        match self {
            Write::Set(path, _) | Write::Create(path, _) | Write::Delete(path) => path,
        }
    }
}

//------------ delete_subtree ------------------------------------------------

/// Deletes every document at or under the prefix, in bounded batches.
///
/// Returns the number of documents removed. Documents created under the
/// prefix while the walk is in progress may survive it.
pub fn delete_subtree(store: &Store, prefix: &DocPath) -> Result<usize, Error> {
    let paths = store.list_subtree(prefix)?;
    for chunk in paths.chunks(SUBTREE_DELETE_BATCH) {
        store.batch(chunk.iter().map(Write::delete).collect())?;
    }
    Ok(paths.len())
}

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    UnknownScheme(String),
    UndeclaredRead(DocPath),
    UndeclaredWrite(DocPath),
    AlreadyExists(DocPath),
    Contention(usize),
    Serialize(DocPath, String),
    Deserialize(DocPath, String),
}

impl Error {
    fn serialize(path: &DocPath, err: impl fmt::Display) -> Self {
        Error::Serialize(path.clone(), err.to_string())
    }

    fn deserialize(path: &DocPath, err: impl fmt::Display) -> Self {
        Error::Deserialize(path.clone(), err.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownScheme(scheme) => {
                write!(f, "unknown storage scheme: {}", scheme)
            }
            Error::UndeclaredRead(path) => {
                write!(f, "read of '{}' outside the transaction's document set", path)
            }
            Error::UndeclaredWrite(path) => {
                write!(f, "write of '{}' outside the transaction's document set", path)
            }
            Error::AlreadyExists(path) => {
                write!(f, "document '{}' already exists", path)
            }
            Error::Contention(attempts) => {
                write!(f, "transaction gave up after {} conflicting attempts", attempts)
            }
            Error::Serialize(path, err) => {
                write!(f, "failed to serialize value for '{}': {}", path, err)
            }
            Error::Deserialize(path, err) => {
                write!(f, "failed to deserialize value for '{}': {}", path, err)
            }
        }
    }
}

impl std::error::Error for Error {}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::distr::Alphanumeric;
    use rand::Rng;

    use super::*;

    fn test_store() -> Store {
        Store::new(&Url::parse("memory:").unwrap()).unwrap()
    }

    fn random_path(depth: usize) -> DocPath {
        (0..depth)
            .map(|_| {
                rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(8)
                    .map(char::from)
                    .collect::<String>()
                    .parse()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn get_absent_and_present() {
        let store = test_store();
        let path = random_path(2);

        assert_eq!(store.get::<String>(&path).unwrap(), None);

        store
            .batch(vec![Write::set(&path, &"content".to_string()).unwrap()])
            .unwrap();
        assert_eq!(store.get(&path).unwrap(), Some("content".to_string()));
    }

    #[test]
    fn batch_create_is_all_or_nothing() {
        let store = test_store();
        let existing = random_path(2);
        let fresh = random_path(2);

        store
            .batch(vec![Write::set(&existing, &1u32).unwrap()])
            .unwrap();

        let res = store.batch(vec![
            Write::create(&fresh, &2u32).unwrap(),
            Write::create(&existing, &3u32).unwrap(),
        ]);
        assert!(res.is_err());

        // nothing from the failed batch landed
        assert_eq!(store.get::<u32>(&fresh).unwrap(), None);
        assert_eq!(store.get::<u32>(&existing).unwrap(), Some(1));
    }

    #[test]
    fn transaction_reads_see_staged_writes() {
        let store = test_store();
        let path = random_path(2);

        store
            .run_transaction(&[path.clone()], |txn| {
                assert_eq!(txn.get::<u32>(&path)?, None);
                txn.set(&path, &7u32)?;
                assert_eq!(txn.get::<u32>(&path)?, Some(7));
                txn.delete(&path)?;
                assert_eq!(txn.get::<u32>(&path)?, None);
                txn.set(&path, &8u32)?;
                Ok::<_, Error>(())
            })
            .unwrap();

        assert_eq!(store.get::<u32>(&path).unwrap(), Some(8));
    }

    #[test]
    fn transaction_rejects_undeclared_documents() {
        let store = test_store();
        let declared = random_path(2);
        let undeclared = random_path(2);

        let res: Result<(), Error> = store.run_transaction(&[declared.clone()], |txn| {
            txn.get::<u32>(&undeclared)?;
            Ok(())
        });
        assert!(matches!(res, Err(Error::UndeclaredRead(_))));

        let res: Result<(), Error> = store.run_transaction(&[declared], |txn| {
            txn.set(&undeclared, &1u32)?;
            Ok(())
        });
        assert!(matches!(res, Err(Error::UndeclaredWrite(_))));
    }

    #[test]
    fn list_subtree_includes_prefix_document() {
        let store = test_store();
        let root: DocPath = "users/alice".parse().unwrap();
        let nested: DocPath = "users/alice/pantry/items".parse().unwrap();
        let other: DocPath = "users/bob".parse().unwrap();

        store
            .batch(vec![
                Write::set(&root, &"profile".to_string()).unwrap(),
                Write::set(&nested, &"pantry".to_string()).unwrap(),
                Write::set(&other, &"profile".to_string()).unwrap(),
            ])
            .unwrap();

        assert_eq!(
            store.list_subtree(&root).unwrap(),
            vec![root.clone(), nested.clone()]
        );

        assert_eq!(delete_subtree(&store, &root).unwrap(), 2);
        assert_eq!(store.get::<String>(&root).unwrap(), None);
        assert_eq!(store.get::<String>(&nested).unwrap(), None);
        assert_eq!(store.get::<String>(&other).unwrap(), Some("profile".to_string()));
    }

    #[test]
    fn deleted_document_conflicts_with_stale_readers() {
        let store = test_store();
        let path = random_path(2);

        store.batch(vec![Write::set(&path, &1u32).unwrap()]).unwrap();
        store.batch(vec![Write::delete(&path)]).unwrap();

        // a transaction over the tombstoned path commits fine
        store
            .run_transaction(&[path.clone()], |txn| {
                assert_eq!(txn.get::<u32>(&path)?, None);
                txn.set(&path, &2u32)?;
                Ok::<_, Error>(())
            })
            .unwrap();
        assert_eq!(store.get::<u32>(&path).unwrap(), Some(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_increments_all_land() {
        // Two tasks bump the same counter through transactions. The
        // retry loop must absorb every conflict, so no increment is
        // lost.
        let store = test_store();
        let path: DocPath = "counters/shared".parse().unwrap();

        async fn bump_n(store: Store, path: DocPath, n: u32) {
            for _ in 0..n {
                store
                    .run_transaction(&[path.clone()], |txn| {
                        let current = txn.get::<u32>(&path)?.unwrap_or(0);
                        txn.set(&path, &(current + 1))?;
                        Ok::<_, Error>(())
                    })
                    .unwrap();
            }
        }

        let a = tokio::spawn(bump_n(store.clone(), path.clone(), 50));
        let b = tokio::spawn(bump_n(store.clone(), path.clone(), 50));
        let (a, b) = futures_util::join!(a, b);
        a.unwrap();
        b.unwrap();

        assert_eq!(store.get::<u32>(&path).unwrap(), Some(100));
    }
}
