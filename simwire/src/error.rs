//! Error types for simwire operations.

use simwire_proto::{ErrorCode, ErrorInfo};

/// Alias for `Result<T, simwire::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by sessions, analyses and result decoding.
///
/// Every failure path maps to its own variant so callers can branch on the
/// kind instead of parsing messages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The engine endpoint could not be reached or refused the handshake.
    #[error("cannot connect to {addr}")]
    Connection {
        /// Address that was dialled.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The session has not been opened yet.
    #[error("session is not connected")]
    NotConnected,

    /// The session was closed.
    #[error("session is closed")]
    SessionClosed,

    /// The source file set was rejected.
    #[error("cannot load source files: {message}")]
    Load {
        /// Why the set was rejected.
        message: String,
    },

    /// An analysis was requested before any source file was loaded.
    #[error("no source files loaded")]
    NotLoaded,

    /// An analysis parameter violates its precondition.
    #[error("invalid analysis parameter `{param}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        param: &'static str,
        /// Violated precondition.
        reason: String,
    },

    /// Another analysis is still outstanding on this session.
    #[error("an analysis is already running on this session")]
    ConcurrentAnalysis,

    /// The engine reported a fault while simulating.
    #[error("simulation failed: {message}")]
    Simulation {
        /// Diagnostic from the engine, verbatim.
        message: String,
    },

    /// The analysis was cancelled or its timeout elapsed.
    #[error("analysis cancelled")]
    Cancelled,

    /// The channel failed mid-conversation.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// The engine sent something the protocol does not allow here.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A raw vector could not be turned into a typed vector.
    #[error("cannot decode vector `{vector}`: {reason}")]
    Decode {
        /// Offending vector name.
        vector: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The bundle has no vector with the requested name.
    #[error("no vector named `{0}`")]
    VectorNotFound(String),

    /// The bundle has no `time` or `freq` vector.
    #[error("result has no independent variable")]
    NoIndependentVariable,
}

impl Error {
    /// Shorthand for a [`Error::Decode`] error.
    pub(crate) fn decode(vector: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            vector: vector.to_owned(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`Error::InvalidParameter`] error.
    pub(crate) fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }
}

impl From<ErrorInfo> for Error {
    fn from(info: ErrorInfo) -> Self {
        match info.code {
            ErrorCode::InvalidFiles => Self::Load {
                message: info.message,
            },
            ErrorCode::InvalidAnalysis => Self::InvalidParameter {
                param: "analysis",
                reason: info.message,
            },
            ErrorCode::NotLoaded => Self::NotLoaded,
            ErrorCode::Busy => Self::ConcurrentAnalysis,
            ErrorCode::Simulation => Self::Simulation {
                message: info.message,
            },
            _ => Self::Protocol(info.to_string()),
        }
    }
}
