//! Defines all engine-side errors.

use std::fmt;

use crate::api::UserId;
use crate::commons::storage;

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    /// The storage substrate refused or failed an operation.
    Storage(storage::Error),

    /// A relationship operation named the same user on both sides.
    SelfReference(UserId),
}

impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Storage(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Storage(e) => e.fmt(f),
            Error::SelfReference(id) => {
                write!(f, "user '{}' cannot be their own friend", id)
            }
        }
    }
}

impl std::error::Error for Error {}
