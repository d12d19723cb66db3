//! Common types used by the various pantrysync components.

pub mod error;
pub mod storage;

//------------ Response Aliases ----------------------------------------------

pub type EngineResult<T> = std::result::Result<T, self::error::Error>;
pub type EngineEmptyResult = std::result::Result<(), self::error::Error>;
