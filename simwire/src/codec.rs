//! Conversion of wire-level vector records into typed vectors.
//!
//! [`RawBundle`] accumulates the [`RawChunk`]s an engine streams back for
//! one run; [`decode`] turns the finished bundle into a [`ResultBundle`].
//! Both are pure: no I/O, no shared state.

use std::collections::HashMap;

use num_complex::Complex64;
use simwire_proto::{RawChunk, RawComplex, RawKind, RawVector};

use crate::analysis::AnalysisKind;
use crate::bundle::ResultBundle;
use crate::error::{Error, Result};
use crate::vector::{Samples, SignalVector};

/// Raw vectors of one run, tagged with the analysis that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBundle {
    /// Analysis that produced the vectors.
    pub analysis: AnalysisKind,
    /// Scale vector name reported by the engine, if any.
    pub scale: Option<String>,
    /// Vectors in the order the engine first reported them.
    pub vectors: Vec<RawVector>,
}

impl RawBundle {
    /// Creates an empty bundle for the given analysis.
    pub const fn new(analysis: AnalysisKind) -> Self {
        Self {
            analysis,
            scale: None,
            vectors: Vec::new(),
        }
    }

    /// Appends one streamed chunk.
    ///
    /// Samples are appended per vector name; a name seen for the first time
    /// becomes a new vector. Fails if a chunk redeclares a vector with a
    /// different kind.
    pub fn absorb(&mut self, chunk: RawChunk) -> Result<()> {
        if chunk.scale.is_some() {
            self.scale = chunk.scale;
        }
        for part in chunk.vectors {
            match self.vectors.iter_mut().find(|v| v.name == part.name) {
                Some(acc) if acc.kind != part.kind => {
                    return Err(Error::decode(
                        &part.name,
                        format!(
                            "declared {} after {}",
                            kind_name(part.kind),
                            kind_name(acc.kind)
                        ),
                    ));
                }
                Some(acc) => {
                    acc.real.extend(part.real);
                    acc.complex.extend(part.complex);
                }
                None => self.vectors.push(part),
            }
        }
        Ok(())
    }
}

/// Decodes a raw bundle into typed vectors.
///
/// Each entry's kind comes from its payload: a real payload yields a real
/// vector, a complex payload a complex one. Values pass through bit for
/// bit, NaN and infinities included. Fails with [`Error::Decode`] when an
/// entry's declared kind disagrees with its payload, when it carries both
/// payloads, when a name repeats, or when sample counts differ.
pub fn decode(raw: &RawBundle) -> Result<ResultBundle> {
    let mut vectors = HashMap::with_capacity(raw.vectors.len());
    let mut expected: Option<(&str, usize)> = None;

    for entry in &raw.vectors {
        let vector = decode_vector(entry)?;
        match expected {
            Some((first, len)) if vector.len() != len => {
                return Err(Error::decode(
                    &entry.name,
                    format!(
                        "has {} samples, `{first}` has {len}",
                        vector.len()
                    ),
                ));
            }
            Some(_) => {}
            None => expected = Some((&entry.name, vector.len())),
        }
        if vectors.insert(entry.name.clone(), vector).is_some() {
            return Err(Error::decode(&entry.name, "duplicate vector name"));
        }
    }

    Ok(ResultBundle::new(
        raw.analysis,
        raw.scale.clone(),
        vectors,
        expected.map_or(0, |(_, len)| len),
    ))
}

/// Decodes one raw entry.
pub fn decode_vector(entry: &RawVector) -> Result<SignalVector> {
    if entry.name.is_empty() {
        return Err(Error::decode("", "empty vector name"));
    }
    match (entry.kind, entry.real.is_empty(), entry.complex.is_empty()) {
        (_, false, false) => Err(Error::decode(
            &entry.name,
            "carries both real and complex payloads",
        )),
        (RawKind::Real, _, false) => Err(Error::decode(
            &entry.name,
            "declared real but carries a complex payload",
        )),
        (RawKind::Complex, false, _) => Err(Error::decode(
            &entry.name,
            "declared complex but carries a real payload",
        )),
        (RawKind::Real, _, true) => Ok(SignalVector::real(&*entry.name, entry.real.clone())),
        (RawKind::Complex, true, _) => Ok(SignalVector::complex(
            &*entry.name,
            entry
                .complex
                .iter()
                .map(|c| Complex64::new(c.real, c.imag))
                .collect(),
        )),
        (kind, ..) => Err(Error::decode(
            &entry.name,
            format!("unsupported kind {kind:?}"),
        )),
    }
}

/// Encodes a typed vector back into its wire record.
pub fn encode_vector(vector: &SignalVector) -> RawVector {
    match vector.samples() {
        Samples::Real(v) => RawVector::from_real(vector.name(), v.clone()),
        Samples::Complex(v) => RawVector::from_complex(
            vector.name(),
            v.iter()
                .map(|c| RawComplex {
                    real: c.re,
                    imag: c.im,
                })
                .collect(),
        ),
    }
}

/// Lower-case name of a raw kind.
const fn kind_name(kind: RawKind) -> &'static str {
    match kind {
        RawKind::Real => "real",
        _ => "complex",
    }
}
