//! Shared types for the ZTP workspace
//!
//! The provisioning record is the one entity every crate agrees on: the
//! external record API stores it, the dispatcher launches runs from it and
//! the workflow engine marks it finished.

pub mod error;
pub mod record;

pub use error::Error;
pub use record::*;

pub type Result<T> = std::result::Result<T, Error>;
