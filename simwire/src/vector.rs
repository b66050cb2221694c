//! Typed signal vectors.

use num_complex::Complex64;
use serde::Serialize;

/// Element type of a [`SignalVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum VectorKind {
    /// `f64` samples.
    Real,
    /// `Complex64` samples.
    Complex,
}

/// Sample storage, fixed at decode time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Samples {
    /// Real-valued samples.
    Real(Vec<f64>),
    /// Complex-valued samples.
    Complex(Vec<Complex64>),
}

/// A named, ordered sequence of samples from one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalVector {
    /// Vector name, unique within its bundle.
    name: String,
    /// The samples.
    samples: Samples,
}

impl SignalVector {
    /// Creates a real-valued vector.
    pub fn real(name: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            samples: Samples::Real(samples),
        }
    }

    /// Creates a complex-valued vector.
    pub fn complex(name: impl Into<String>, samples: Vec<Complex64>) -> Self {
        Self {
            name: name.into(),
            samples: Samples::Complex(samples),
        }
    }

    /// Vector name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element type.
    pub const fn kind(&self) -> VectorKind {
        match self.samples {
            Samples::Real(_) => VectorKind::Real,
            Samples::Complex(_) => VectorKind::Complex,
        }
    }

    /// Returns `true` for complex-valued vectors.
    pub const fn is_complex(&self) -> bool {
        matches!(self.samples, Samples::Complex(_))
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match &self.samples {
            Samples::Real(v) => v.len(),
            Samples::Complex(v) => v.len(),
        }
    }

    /// Returns `true` if the vector holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw sample storage.
    pub const fn samples(&self) -> &Samples {
        &self.samples
    }

    /// Real samples, or `None` for a complex vector.
    pub fn as_real(&self) -> Option<&[f64]> {
        match &self.samples {
            Samples::Real(v) => Some(v),
            Samples::Complex(_) => None,
        }
    }

    /// Complex samples, or `None` for a real vector.
    pub fn as_complex(&self) -> Option<&[Complex64]> {
        match &self.samples {
            Samples::Complex(v) => Some(v),
            Samples::Real(_) => None,
        }
    }

    /// Real part of every sample.
    ///
    /// Engines report the AC frequency scale as a complex vector with zero
    /// imaginary part; this is the way to get it as plain frequencies.
    pub fn real_parts(&self) -> Vec<f64> {
        match &self.samples {
            Samples::Real(v) => v.clone(),
            Samples::Complex(v) => v.iter().map(|c| c.re).collect(),
        }
    }

    /// Magnitude of every sample.
    pub fn magnitude(&self) -> Vec<f64> {
        match &self.samples {
            Samples::Real(v) => v.iter().map(|x| x.abs()).collect(),
            Samples::Complex(v) => v.iter().map(|c| c.norm()).collect(),
        }
    }

    /// Phase of every sample in radians, in `(-π, π]`.
    pub fn phase(&self) -> Vec<f64> {
        match &self.samples {
            Samples::Real(v) => v
                .iter()
                .map(|&x| Complex64::new(x, 0.0).arg())
                .collect(),
            Samples::Complex(v) => v.iter().map(|c| c.arg()).collect(),
        }
    }

    /// Phase of every sample in degrees.
    pub fn phase_deg(&self) -> Vec<f64> {
        self.phase().into_iter().map(f64::to_degrees).collect()
    }
}
