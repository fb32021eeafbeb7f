//! Error types for the wire protocol engine.

use thiserror::Error;

/// Main error type for connection and codec operations.
///
/// Any `Protocol`, `Codec` or `Io` error raised by the reader or writer task
/// is terminal: it triggers the one-shot close path and is handed to the
/// model via `closed()`.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The connection is closed, or the operation raced with close
    #[error("connection closed")]
    Closed,

    /// The receive watchdog fired: no message within the receive timeout
    #[error("read timeout")]
    Timeout,

    /// The peer violated the protocol (message out of order, bad lengths,
    /// unknown compression, invalid FileInfo or filename)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A payload or header failed to encode or decode
    #[error("codec error: {0}")]
    Codec(String),

    /// The peer sent a Close message carrying a human-readable reason
    #[error("connection closed by peer: {0}")]
    Remote(String),

    /// The peer answered a block request with an error code
    #[error("request rejected by peer: {0}")]
    Request(#[from] RequestError),

    /// The underlying transport failed
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Error codes carried on the wire in Response messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// The request was served
    NoError = 0,
    /// The request failed for an unspecified reason
    Generic = 1,
    /// The requested file does not exist on the peer
    NoSuchFile = 2,
    /// The requested file exists but is not valid for serving
    InvalidFile = 3,
}

impl ErrorCode {
    /// Decode a wire value. Unknown codes collapse to `Generic` so that a
    /// newer peer with additional codes still produces a usable error.
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => ErrorCode::NoError,
            2 => ErrorCode::NoSuchFile,
            3 => ErrorCode::InvalidFile,
            _ => ErrorCode::Generic,
        }
    }

    /// The error a requesting caller observes for this code, if any.
    pub fn to_error(self) -> Option<RequestError> {
        match self {
            ErrorCode::NoError => None,
            ErrorCode::Generic => Some(RequestError::Generic),
            ErrorCode::NoSuchFile => Some(RequestError::NoSuchFile),
            ErrorCode::InvalidFile => Some(RequestError::Invalid),
        }
    }
}

/// Failure modes a model may report when serving a block request.
///
/// These are the only errors that cross the wire; anything else a model
/// returns is mapped to `Generic` by `code()`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// Unspecified failure
    #[error("generic error")]
    Generic,
    /// The file is not present
    #[error("no such file")]
    NoSuchFile,
    /// The file is present but invalid
    #[error("file is invalid")]
    Invalid,
}

impl RequestError {
    /// The wire code for this error.
    pub fn code(self) -> ErrorCode {
        match self {
            RequestError::Generic => ErrorCode::Generic,
            RequestError::NoSuchFile => ErrorCode::NoSuchFile,
            RequestError::Invalid => ErrorCode::InvalidFile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip() {
        for err in [
            RequestError::Generic,
            RequestError::NoSuchFile,
            RequestError::Invalid,
        ] {
            let code = err.code();
            assert_eq!(ErrorCode::from_u32(code as u32), code);
            assert_eq!(code.to_error(), Some(err));
        }
        assert_eq!(ErrorCode::NoError.to_error(), None);
    }

    #[test]
    fn test_unknown_code_maps_to_generic() {
        assert_eq!(ErrorCode::from_u32(42), ErrorCode::Generic);
        assert_eq!(
            ErrorCode::from_u32(42).to_error(),
            Some(RequestError::Generic)
        );
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::Remote("going offline".to_string());
        assert_eq!(format!("{}", err), "connection closed by peer: going offline");
        assert_eq!(format!("{}", ProtocolError::Closed), "connection closed");
    }
}
