//! Error types for Edgeshare

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u32 },

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Truncated transfer: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection closed by remote")]
    ConnectionClosed,
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, unexpected, or unrecognized message
    Protocol,
    /// Unknown peer address or unknown filename
    NotFound,
    /// Digest mismatch or truncated transfer
    Integrity,
    /// Remote unreachable, closed, or timed out
    Connectivity,
    /// Local filesystem failure
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_)
            | Error::VersionMismatch { .. }
            | Error::Decode(_)
            | Error::FrameTooLarge { .. }
            | Error::InvalidAddress(_) => ErrorKind::Protocol,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::HashMismatch { .. } | Error::Truncated { .. } => ErrorKind::Integrity,
            Error::ConnectionFailed(_) | Error::Timeout(_) | Error::ConnectionClosed => {
                ErrorKind::Connectivity
            }
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::Protocol("x".into()).kind(), ErrorKind::Protocol);
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::Truncated { expected: 10, received: 3 }.kind(),
            ErrorKind::Integrity
        );
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Connectivity);
        assert_eq!(
            Error::Io(std::io::Error::other("disk")).kind(),
            ErrorKind::Io
        );
    }
}
