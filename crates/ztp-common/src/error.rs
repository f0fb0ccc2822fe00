use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: i64, reason: String },

    #[error("unknown record status: {0}")]
    UnknownStatus(String),
}
