//! Protocol message types for client↔engine communication.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Protocol version exchanged in [`Request::Hello`].
pub const PROTOCOL_VERSION: u32 = 1;

/// Default TCP port of a simulation engine.
pub const DEFAULT_PORT: u16 = 5923;

/// Request sent from client to engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Request {
    /// Opening handshake. Must be the first request on a connection.
    Hello {
        /// Client protocol version.
        version: u32,
    },
    /// Replace the working source set. The first file is the top-level netlist.
    LoadFiles(Vec<SourceFile>),
    /// Start an analysis on the loaded sources.
    Run(RunReq),
    /// Pull the samples produced since the previous read.
    Read {
        /// Run identifier from [`Response::Started`].
        run: u64,
    },
    /// Halt a running analysis.
    Cancel {
        /// Run identifier from [`Response::Started`].
        run: u64,
    },
    /// Health-check ping.
    Ping,
}

/// One netlist or include file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// File name as seen by the engine (e.g. `bar.sp`).
    pub name: String,
    /// Full file contents.
    pub contents: String,
}

impl SourceFile {
    /// Creates a source file from a name and its contents.
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Analysis start request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReq {
    /// Which analysis to run and its parameters.
    pub analysis: Analysis,
    /// Vectors the engine should save. Empty means all.
    pub vectors: Vec<String>,
}

/// Analysis parameters as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Analysis {
    /// Time-domain analysis.
    Transient {
        /// Printing increment in seconds.
        step: f64,
        /// Final time in seconds.
        stop: f64,
        /// Time at which output starts, in seconds.
        start: f64,
    },
    /// Small-signal frequency sweep.
    Ac {
        /// Sweep spacing.
        sweep: Sweep,
        /// Points per decade/octave, or total points for a linear sweep.
        points: u32,
        /// Start frequency in Hz.
        fstart: f64,
        /// Stop frequency in Hz.
        fstop: f64,
    },
    /// DC operating point.
    Op,
}

/// Frequency spacing of an AC sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Sweep {
    /// Linear spacing; `points` is the total number of points.
    Lin,
    /// Octave spacing; `points` per octave.
    Oct,
    /// Decade spacing; `points` per decade.
    #[default]
    Dec,
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lin => "lin",
            Self::Oct => "oct",
            Self::Dec => "dec",
        })
    }
}

impl FromStr for Sweep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lin" => Ok(Self::Lin),
            "oct" => Ok(Self::Oct),
            "dec" => Ok(Self::Dec),
            _ => Err(format!("unknown sweep type: {s}")),
        }
    }
}

/// Response sent from engine to client.
///
/// Every request is answered by exactly one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Response {
    /// Reply to [`Request::Hello`].
    HelloAck {
        /// Engine protocol version.
        version: u32,
    },
    /// Reply to [`Request::LoadFiles`].
    Loaded {
        /// Number of files accepted.
        files: u32,
    },
    /// Reply to [`Request::Run`].
    Started {
        /// Identifier to pass to [`Request::Read`] and [`Request::Cancel`].
        run: u64,
    },
    /// Reply to [`Request::Read`].
    Data(RawChunk),
    /// Reply to [`Request::Cancel`].
    Cancelled,
    /// Reply to [`Request::Ping`].
    Pong,
    /// The request could not be served.
    Error(ErrorInfo),
}

/// Samples produced since the previous [`Request::Read`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChunk {
    /// Name of the vector the engine treats as the sweep scale, if known.
    pub scale: Option<String>,
    /// `true` while the engine is still running.
    pub more: bool,
    /// Per-vector sample slices.
    pub vectors: Vec<RawVector>,
}

/// Declared element type of a [`RawVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RawKind {
    /// Samples travel in [`RawVector::real`].
    Real,
    /// Samples travel in [`RawVector::complex`].
    Complex,
}

/// A named vector slice. Exactly one of `real` / `complex` may carry data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVector {
    /// Vector name (e.g. `time`, `V(2)`).
    pub name: String,
    /// Declared element type.
    pub kind: RawKind,
    /// Real samples.
    pub real: Vec<f64>,
    /// Complex samples.
    pub complex: Vec<RawComplex>,
}

impl RawVector {
    /// Creates a real-valued vector slice.
    pub fn from_real(name: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind: RawKind::Real,
            real: samples,
            complex: Vec::new(),
        }
    }

    /// Creates a complex-valued vector slice.
    pub fn from_complex(name: impl Into<String>, samples: Vec<RawComplex>) -> Self {
        Self {
            name: name.into(),
            kind: RawKind::Complex,
            real: Vec::new(),
            complex: samples,
        }
    }
}

/// One complex sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawComplex {
    /// Real part.
    pub real: f64,
    /// Imaginary part.
    pub imag: f64,
}

/// Error detail carried by [`Response::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable category.
    pub code: ErrorCode,
    /// Human-readable diagnostic, verbatim from the engine.
    pub message: String,
}

impl ErrorInfo {
    /// Creates an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for an engine-side simulation fault.
    pub fn simulation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Simulation, message)
    }

    /// Shorthand for a protocol version mismatch.
    pub fn version_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::VersionMismatch, message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Category of an [`ErrorInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The uploaded file set was rejected.
    InvalidFiles,
    /// The analysis parameters were rejected.
    InvalidAnalysis,
    /// `Run` arrived before any successful `LoadFiles`.
    NotLoaded,
    /// An analysis is already running on this connection.
    Busy,
    /// `Read` named a run that is not active.
    UnknownRun,
    /// The engine failed while simulating (e.g. non-convergence).
    Simulation,
    /// Client and engine speak different protocol versions.
    VersionMismatch,
    /// The request was not valid at this point of the conversation.
    Protocol,
    /// Any other engine-side failure.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidFiles => "invalid files",
            Self::InvalidAnalysis => "invalid analysis",
            Self::NotLoaded => "not loaded",
            Self::Busy => "busy",
            Self::UnknownRun => "unknown run",
            Self::Simulation => "simulation",
            Self::VersionMismatch => "version mismatch",
            Self::Protocol => "protocol",
            Self::Internal => "internal",
        })
    }
}
