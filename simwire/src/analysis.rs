//! Analysis requests: parameter validation and expected result shape.
//!
//! An [`AnalysisSpec`] can only be obtained through its validating
//! constructors, so every value in circulation already satisfies its
//! numeric preconditions. No I/O happens here.

use std::fmt;

use simwire_proto::{Analysis, Sweep};

use crate::error::{Error, Result};
use crate::vector::VectorKind;

/// Name of the independent variable of a transient result.
pub const TIME: &str = "time";

/// Name of the independent variable of an AC result.
pub const FREQ: &str = "freq";

/// A validated analysis invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSpec(Analysis);

impl AnalysisSpec {
    /// Builds a transient analysis.
    ///
    /// Requires finite values with `step > 0` and `stop > start >= 0`.
    pub fn transient(step: f64, stop: f64, start: f64) -> Result<Self> {
        finite("step", step)?;
        finite("stop", stop)?;
        finite("start", start)?;
        if step <= 0.0 {
            return Err(Error::invalid("step", format!("must be > 0, got {step}")));
        }
        if start < 0.0 {
            return Err(Error::invalid("start", format!("must be >= 0, got {start}")));
        }
        if stop <= start {
            return Err(Error::invalid(
                "stop",
                format!("must be > start ({start}), got {stop}"),
            ));
        }
        Ok(Self(Analysis::Transient { step, stop, start }))
    }

    /// Builds a small-signal AC sweep.
    ///
    /// Requires `points >= 1`, finite frequencies with `fstop >= fstart`,
    /// and `fstart > 0` for logarithmic (`dec`/`oct`) sweeps or
    /// `fstart >= 0` for a linear one.
    pub fn ac(sweep: Sweep, points: u32, fstart: f64, fstop: f64) -> Result<Self> {
        finite("fstart", fstart)?;
        finite("fstop", fstop)?;
        if points == 0 {
            return Err(Error::invalid("points", "must be >= 1"));
        }
        match sweep {
            Sweep::Lin if fstart < 0.0 => {
                return Err(Error::invalid(
                    "fstart",
                    format!("must be >= 0, got {fstart}"),
                ));
            }
            Sweep::Lin => {}
            _ if fstart <= 0.0 => {
                return Err(Error::invalid(
                    "fstart",
                    format!("must be > 0 for a {sweep} sweep, got {fstart}"),
                ));
            }
            _ => {}
        }
        if fstop < fstart {
            return Err(Error::invalid(
                "fstop",
                format!("must be >= fstart ({fstart}), got {fstop}"),
            ));
        }
        Ok(Self(Analysis::Ac {
            sweep,
            points,
            fstart,
            fstop,
        }))
    }

    /// Builds a DC operating-point analysis.
    pub const fn op() -> Self {
        Self(Analysis::Op)
    }

    /// Returns the analysis category.
    pub const fn kind(&self) -> AnalysisKind {
        match self.0 {
            Analysis::Transient { .. } => AnalysisKind::Transient,
            Analysis::Ac { .. } => AnalysisKind::Ac,
            _ => AnalysisKind::Op,
        }
    }

    /// Returns the wire representation.
    pub const fn as_wire(&self) -> &Analysis {
        &self.0
    }
}

impl fmt::Display for AnalysisSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Analysis::Transient { step, stop, start } => write!(f, "tran {step} {stop} {start}"),
            Analysis::Ac {
                sweep,
                points,
                fstart,
                fstop,
            } => write!(f, "ac {sweep} {points} {fstart} {fstop}"),
            _ => f.write_str("op"),
        }
    }
}

/// Analysis category, carried from the request onto its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum AnalysisKind {
    /// Time-domain analysis.
    Transient,
    /// Small-signal frequency sweep.
    Ac,
    /// DC operating point.
    Op,
}

impl AnalysisKind {
    /// Describes the result this kind of analysis produces.
    pub const fn shape(self) -> ResultShape {
        match self {
            Self::Transient => ResultShape {
                independent: Some(TIME),
                values: VectorKind::Real,
            },
            Self::Ac => ResultShape {
                independent: Some(FREQ),
                values: VectorKind::Complex,
            },
            Self::Op => ResultShape {
                independent: None,
                values: VectorKind::Real,
            },
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transient => "transient",
            Self::Ac => "ac",
            Self::Op => "op",
        })
    }
}

/// Expected layout of a result bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResultShape {
    /// Reserved name of the independent variable, if the analysis sweeps one.
    pub independent: Option<&'static str>,
    /// Element type of the dependent vectors.
    pub values: VectorKind,
}

/// Rejects NaN and infinities.
fn finite(param: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid(param, format!("must be finite, got {value}")))
    }
}
