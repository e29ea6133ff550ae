//! Error handling for ftpmirror
//!
//! Every failure the mirroring core can raise is one variant of
//! [`MirrorError`]. None of them are retried: the engine reports the first
//! error it meets and the session ends.

use std::io;
use thiserror::Error;

/// Error type for mirroring operations
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Bad or missing startup arguments, or an unreadable configuration file
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Control or data connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server answered a command with a failure reply
    #[error("Server rejected '{command}': {code} {message}")]
    Rejected {
        command: String,
        code: u16,
        message: String,
    },

    /// A directory listing line that does not follow the `ls -l` layout
    #[error("Malformed listing line '{line}': {reason}")]
    MalformedListing { line: String, reason: String },

    /// A file stream was interrupted or the server aborted it
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// A size that no display unit can represent
    #[error("Can not find match unit for {0} bytes")]
    NoMatchingUnit(u64),

    /// Local filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The session was cancelled before it completed
    #[error("Cancelled")]
    Cancelled,
}

/// Specialized Result type for mirroring operations
pub type Result<T> = std::result::Result<T, MirrorError>;

impl MirrorError {
    pub fn malformed(line: &str, reason: impl Into<String>) -> Self {
        MirrorError::MalformedListing {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Connection-class errors: transport failures and refused commands
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            MirrorError::Connection(_) | MirrorError::Rejected { .. }
        )
    }
}

/// Creates a MirrorError with a formatted message
#[macro_export]
macro_rules! error {
    ($error_type:ident, $($arg:tt)*) => {
        $crate::error::MirrorError::$error_type(format!($($arg)*))
    };
}

/// Returns an error result with a formatted message
#[macro_export]
macro_rules! bail {
    ($error_type:ident, $($arg:tt)*) => {
        return Err($crate::error!($error_type, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_is_connection_class() {
        let err = MirrorError::Rejected {
            command: "MKD logs".into(),
            code: 550,
            message: "exists".into(),
        };
        assert!(err.is_connection());
        assert!(!MirrorError::Transfer("reset".into()).is_connection());
        assert_eq!(err.to_string(), "Server rejected 'MKD logs': 550 exists");
    }

    #[test]
    fn macros_format_messages() {
        let err = crate::error!(Connection, "connect {}:{}", "host", 21);
        assert_eq!(err.to_string(), "Connection error: connect host:21");

        fn fails() -> Result<()> {
            crate::bail!(Transfer, "stream closed after {} bytes", 10);
        }
        assert!(matches!(fails(), Err(MirrorError::Transfer(_))));
    }

    #[test]
    fn io_errors_convert() {
        let err: MirrorError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, MirrorError::Io(_)));
    }
}
