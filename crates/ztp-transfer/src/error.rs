//! Error types for transfer server access

use thiserror::Error;

/// Error type for transfer server operations
#[derive(Debug, Error)]
pub enum TransferError {
    /// Could not open the control or data connection
    #[error("connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server answered a command with an unexpected reply code
    #[error("{command} failed with {code}: {message}")]
    Command {
        command: String,
        code: u16,
        message: String,
    },

    /// Server sent something that is not a valid reply
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// File or directory does not exist
    #[error("file not found: {0}")]
    NotFound(String),

    /// Server did not answer in time
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl TransferError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::ConnectionFailed { .. }
            | TransferError::Io(_)
            | TransferError::Timeout(_) => true,
            // 4xx replies are transient negative completions
            TransferError::Command { code, .. } => (400..500).contains(code),
            _ => false,
        }
    }
}

/// Result type for transfer server operations
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransferError::Command {
            command: "RETR /tftp/test.log".to_string(),
            code: 550,
            message: "No such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "RETR /tftp/test.log failed with 550: No such file"
        );

        let err = TransferError::Timeout("PASV".to_string());
        assert_eq!(err.to_string(), "timed out waiting for PASV");
    }

    #[test]
    fn test_transient_classification() {
        let refused = TransferError::ConnectionFailed {
            addr: "ftp:21".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(refused.is_transient());

        let busy = TransferError::Command {
            command: "USER".into(),
            code: 421,
            message: "Too many users".into(),
        };
        assert!(busy.is_transient());

        let denied = TransferError::Command {
            command: "PASS".into(),
            code: 530,
            message: "Login incorrect".into(),
        };
        assert!(!denied.is_transient());
        assert!(!TransferError::NotFound("x".into()).is_transient());
    }
}
