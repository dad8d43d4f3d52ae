//! Error types for the ADS client.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for the ADS client.
#[derive(Debug, Error)]
pub enum Error {
    /// Dialing the server or preparing the channel failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The configured server address is not a usable URI.
    #[error("invalid server uri: {0}")]
    InvalidUri(String),

    /// TLS material could not be parsed or the TLS handshake configuration is invalid.
    #[error("tls error: {0}")]
    Tls(String),

    /// Reading a file from disk failed.
    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The gRPC stream failed with a status.
    #[cfg(feature = "transport-tonic")]
    #[error("stream error: {0}")]
    Stream(#[from] tonic::Status),

    /// The stream was cancelled locally or by the peer.
    #[error("stream cancelled")]
    Cancelled,

    /// The stream deadline expired.
    #[error("stream deadline exceeded")]
    DeadlineExceeded,

    /// The stream has ended and can no longer carry messages.
    #[error("stream closed")]
    StreamClosed,

    /// An operation needed a live stream but the client is not connected.
    #[error("client is not connected")]
    NotConnected,

    /// A receive loop is already running for this client.
    #[error("a receive loop is already running for this client")]
    AlreadyReceiving,

    /// A protobuf message could not be decoded.
    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The receive loop ended because of a non-graceful stream failure.
    #[error("connection closed: {0}")]
    ConnectionClosed(#[source] Box<Error>),
}

impl Error {
    /// Returns true when the error signals an orderly shutdown rather than a failure.
    ///
    /// Cancellation and deadline expiry, whether raised locally or carried in a
    /// gRPC status, end the receive loop without reporting an error.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Cancelled | Error::DeadlineExceeded => true,
            #[cfg(feature = "transport-tonic")]
            Error::Stream(status) => matches!(
                status.code(),
                tonic::Code::Cancelled | tonic::Code::DeadlineExceeded
            ),
            Error::ConnectionClosed(inner) => inner.is_cancellation(),
            _ => false,
        }
    }
}

/// Result type alias for ADS client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_graceful() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::DeadlineExceeded.is_cancellation());
        assert!(!Error::StreamClosed.is_cancellation());
        assert!(!Error::Connection("refused".into()).is_cancellation());
    }

    #[cfg(feature = "transport-tonic")]
    #[test]
    fn status_codes_classify() {
        assert!(Error::Stream(tonic::Status::cancelled("bye")).is_cancellation());
        assert!(Error::Stream(tonic::Status::deadline_exceeded("late")).is_cancellation());
        assert!(!Error::Stream(tonic::Status::unavailable("down")).is_cancellation());
    }

    #[test]
    fn connection_closed_wraps_cause() {
        let err = Error::ConnectionClosed(Box::new(Error::StreamClosed));
        assert_eq!(err.to_string(), "connection closed: stream closed");
    }
}
