//! Client sessions for remote circuit-simulation engines.
//!
//! `simwire` drives a simulation engine over a request/response channel:
//! upload a netlist, start a transient, AC or operating-point analysis, and
//! get back a [`ResultBundle`] of named, typed signal vectors.
//!
//! # Quick start
//!
//! ```no_run
//! use simwire::{AnalysisSpec, SimulationSession, SourceFile, Sweep};
//!
//! let netlist = "* test\nV1 1 0 AC 1 sin(0 5 1k)\nR1 1 2 1k\nC2 2 0 1u\n.end\n";
//! let session = SimulationSession::open("localhost:5923")?;
//! session.load_files([SourceFile::new("bar.sp", netlist)])?;
//!
//! let ac = session
//!     .run(&AnalysisSpec::ac(Sweep::Dec, 10, 1.0, 1e6)?)?
//!     .result()?;
//! let freq = ac.independent_variable()?.real_parts();
//! let gain = ac.get("V(2)")?.magnitude();
//! assert_eq!(freq.len(), gain.len());
//! # Ok::<(), simwire::Error>(())
//! ```

mod analysis;
mod bundle;
mod client;
mod codec;
mod config;
mod error;
mod session;
mod vector;

pub use analysis::{AnalysisKind, AnalysisSpec, FREQ, ResultShape, TIME};
pub use bundle::ResultBundle;
pub use client::Client;
pub use codec::{RawBundle, decode, decode_vector, encode_vector};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use num_complex::Complex64;
pub use session::{AnalysisHandle, CancelToken, RunOptions, SessionState, SimulationSession};
pub use simwire_proto::{RawChunk, RawComplex, RawKind, RawVector, SourceFile, Sweep};
pub use vector::{Samples, SignalVector, VectorKind};
