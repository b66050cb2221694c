//! Immutable, queryable result of one analysis run.

use std::collections::HashMap;

use serde::Serialize;

use crate::analysis::AnalysisKind;
use crate::error::{Error, Result};
use crate::vector::SignalVector;

/// The complete set of vectors produced by one analysis invocation.
///
/// Bundles are built by [`decode`](crate::decode) and never change
/// afterwards. All vectors hold the same number of samples and are aligned
/// by position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultBundle {
    /// Analysis that produced this bundle.
    analysis: AnalysisKind,
    /// Scale vector name reported by the engine.
    scale: Option<String>,
    /// Samples per vector.
    samples: usize,
    /// Vectors keyed by name.
    vectors: HashMap<String, SignalVector>,
}

impl ResultBundle {
    /// Assembles a bundle from already-validated parts.
    pub(crate) fn new(
        analysis: AnalysisKind,
        scale: Option<String>,
        vectors: HashMap<String, SignalVector>,
        samples: usize,
    ) -> Self {
        Self {
            analysis,
            scale,
            samples,
            vectors,
        }
    }

    /// Looks up a vector by name.
    pub fn get(&self, name: &str) -> Result<&SignalVector> {
        self.vectors
            .get(name)
            .ok_or_else(|| Error::VectorNotFound(name.to_owned()))
    }

    /// Returns the vector that indexes all others: `time` for a transient
    /// run, `freq` for an AC sweep.
    ///
    /// The reserved name is chosen from the analysis tag, not guessed from
    /// which vectors happen to be present. If the reserved vector is absent,
    /// the engine-reported scale vector is used instead. Fails with
    /// [`Error::NoIndependentVariable`] when neither exists, which is always
    /// the case for an operating-point bundle.
    pub fn independent_variable(&self) -> Result<&SignalVector> {
        let reserved = self.analysis.shape().independent;
        reserved
            .and_then(|name| self.vectors.get(name))
            .or_else(|| {
                reserved?;
                self.vectors.get(self.scale.as_deref()?)
            })
            .ok_or(Error::NoIndependentVariable)
    }

    /// Returns `true` if `name` exists and is complex-valued.
    pub fn is_complex(&self, name: &str) -> bool {
        self.vectors.get(name).is_some_and(SignalVector::is_complex)
    }

    /// Returns `true` if the bundle has a vector called `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.vectors.contains_key(name)
    }

    /// Analysis that produced this bundle.
    pub const fn analysis(&self) -> AnalysisKind {
        self.analysis
    }

    /// Scale vector name reported by the engine, if any.
    pub fn scale(&self) -> Option<&str> {
        self.scale.as_deref()
    }

    /// Number of samples in every vector.
    pub const fn sample_count(&self) -> usize {
        self.samples
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns `true` if the bundle holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Iterates over all vectors in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &SignalVector> {
        self.vectors.values()
    }
}
