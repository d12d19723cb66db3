//! Persistent storage of documents.

pub use self::path::{DocPath, ParsePathError, Segment};
pub use self::store::{delete_subtree, Error, Store, Transaction, Write};

mod memory;
mod path;
mod store;
