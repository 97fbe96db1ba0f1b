use crate::gds;
use crate::protocol::StatusVector;
use thiserror::Error;

/// A list specifying the error categories of the remote protocol engine.
///
/// Only [`FbError::Db`] (and warnings, which ride on successful responses)
/// leave the port usable; every other category marks the port broken and
/// dependent objects refuse further synchronous operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FbError {
    /// A transport failure: connection refused or reset, a read/write
    /// syscall error, or a poll failure. Terminal for the port.
    #[error("network error with {peer}")]
    Net {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the connection in an orderly way. Terminal for the
    /// port.
    #[error("connection lost to {peer}")]
    PeerClosed { peer: String },

    /// Unexpected operation code, malformed packet, or an otherwise
    /// undecodable byte stream. Terminal for the port.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// All authentication rounds were exhausted without success. Callers
    /// see this single error regardless of which plugin rejected what.
    #[error("{status}")]
    Login { status: StatusVector },

    /// The engine on the other side reported an error; the status vector
    /// is propagated verbatim. The port remains usable.
    #[error("{status}")]
    Db { status: StatusVector },

    /// The operation was cancelled on user request.
    #[error("{status}")]
    Cancelled { status: StatusVector },

    /// A buffer length exceeded the negotiated maximum, or a size cap was
    /// reached.
    #[error("resource limit exceeded: {0}")]
    Limit(&'static str),

    /// A requested feature needs a protocol version the peer did not
    /// negotiate; reported without touching the wire.
    #[error("not supported by the negotiated protocol version: {0}")]
    VersionUnsupported(&'static str),

    /// Erroneous connection parameters, e.g. a malformed connection URL.
    #[error("erroneous connection parameters: {0}")]
    ConnParams(String),

    /// The streaming compressor or decompressor failed. Terminal for the
    /// port.
    #[error("wire compression failed: {0}")]
    Compression(String),

    /// An I/O error outside any port context.
    #[error(transparent)]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Error occured in thread synchronization.
    #[error("error occured in thread synchronization")]
    Poison,

    /// Another asynchronous operation is already in flight on this
    /// attachment.
    #[error("async operation is in progress")]
    AsyncActive,

    /// Error caused by wrong usage.
    #[error("wrong usage: {0}")]
    Usage(&'static str),

    /// Implementation error.
    #[error("implementation error: {0}")]
    Impl(&'static str),

    /// Implementation error.
    #[error("implementation error: {0}")]
    ImplDetailed(String),
}

/// Abbreviation of `Result<T, FbError>`.
pub type FbResult<T> = std::result::Result<T, FbError>;

impl FbError {
    /// An application error carrying a single status code.
    pub fn gds(code: i32) -> Self {
        Self::from_status(StatusVector::from_gds(code))
    }

    pub(crate) fn net<S: Into<String>>(peer: S, source: std::io::Error) -> Self {
        Self::Net {
            peer: peer.into(),
            source,
        }
    }

    /// Classifies a non-success status vector received from the peer.
    pub(crate) fn from_status(status: StatusVector) -> Self {
        match status.primary_gds() {
            Some(gds::CANCELLED) => Self::Cancelled { status },
            Some(gds::LOGIN) => Self::Login { status },
            _ => Self::Db { status },
        }
    }

    /// Returns the contained status vector, if any.
    pub fn status(&self) -> Option<&StatusVector> {
        match self {
            Self::Db { status } | Self::Cancelled { status } | Self::Login { status } => {
                Some(status)
            }
            _ => None,
        }
    }

    /// True for the categories that leave the port broken: everything
    /// except an engine-reported application error.
    pub fn is_fatal_for_port(&self) -> bool {
        !matches!(
            self,
            Self::Db { .. }
                | Self::Login { .. }
                | Self::Usage(_)
                | Self::VersionUnsupported(_)
                | Self::Limit(_)
                | Self::AsyncActive
        )
    }

    /// The status vector equivalent of this error, for transport back to a
    /// peer (server side) or for attaching to a statement.
    pub(crate) fn to_status(&self) -> StatusVector {
        match self {
            Self::Db { status } | Self::Cancelled { status } | Self::Login { status } => {
                status.clone()
            }
            Self::Net { .. } | Self::PeerClosed { .. } => {
                let mut sv = StatusVector::from_gds(gds::NETWORK_ERROR);
                sv.push_str(self.to_string());
                sv
            }
            Self::AsyncActive => StatusVector::from_gds(gds::ASYNC_ACTIVE),
            Self::VersionUnsupported(_) => StatusVector::from_gds(gds::WISH_LIST),
            other => {
                let mut sv = StatusVector::from_gds(gds::RANDOM);
                sv.push_str(other.to_string());
                sv
            }
        }
    }
}

impl From<StatusVector> for FbError {
    fn from(status: StatusVector) -> Self {
        Self::from_status(status)
    }
}

impl<G> From<std::sync::PoisonError<G>> for FbError {
    fn from(_error: std::sync::PoisonError<G>) -> Self {
        Self::Poison
    }
}

impl From<flate2::CompressError> for FbError {
    fn from(error: flate2::CompressError) -> Self {
        Self::Compression(error.to_string())
    }
}

impl From<flate2::DecompressError> for FbError {
    fn from(error: flate2::DecompressError) -> Self {
        Self::Compression(error.to_string())
    }
}
