//! Rendering of result bundles.

use std::io::Write;

use anyhow::Result;
use simwire::{Complex64, ResultBundle, SignalVector};

/// Output format for analysis results.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum Format {
    /// One row per vector: name, kind, length, first and last sample.
    #[default]
    Table,
    /// The whole bundle as JSON.
    Json,
    /// Aligned sample columns for an external plotter.
    Csv,
}

pub fn print(bundle: &ResultBundle, format: Format, w: &mut impl Write) -> Result<()> {
    match format {
        Format::Table => table(bundle, w),
        Format::Json => {
            serde_json::to_writer_pretty(&mut *w, bundle)?;
            writeln!(w)?;
            Ok(())
        }
        Format::Csv => csv(bundle, w),
    }
}

fn table(bundle: &ResultBundle, w: &mut impl Write) -> Result<()> {
    if bundle.is_empty() {
        writeln!(w, "No vectors.")?;
        return Ok(());
    }
    writeln!(w, "{:<20} {:<8} {:>8} {:>24} {:>24}", "NAME", "KIND", "LEN", "FIRST", "LAST")?;
    for v in ordered(bundle) {
        let (kind, first, last) = match (v.as_real(), v.as_complex()) {
            (Some(s), _) => ("real", s.first().map(real), s.last().map(real)),
            (_, Some(s)) => ("complex", s.first().map(complex), s.last().map(complex)),
            _ => ("?", None, None),
        };
        writeln!(
            w,
            "{:<20} {:<8} {:>8} {:>24} {:>24}",
            v.name(),
            kind,
            v.len(),
            first.unwrap_or_default(),
            last.unwrap_or_default(),
        )?;
    }
    Ok(())
}

/// Independent variable first as real values, then each vector; complex
/// vectors become magnitude and phase-in-degrees column pairs.
fn csv(bundle: &ResultBundle, w: &mut impl Write) -> Result<()> {
    let scale = bundle.independent_variable().ok();
    let mut header = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    if let Some(v) = scale {
        header.push(v.name().to_owned());
        columns.push(v.real_parts());
    }
    for v in ordered(bundle) {
        if scale.is_some_and(|s| s.name() == v.name()) {
            continue;
        }
        if v.is_complex() {
            header.push(format!("{}.mag", v.name()));
            header.push(format!("{}.phase_deg", v.name()));
            columns.push(v.magnitude());
            columns.push(v.phase_deg());
        } else {
            header.push(v.name().to_owned());
            columns.push(v.real_parts());
        }
    }

    writeln!(w, "{}", header.join(","))?;
    for row in 0..bundle.sample_count() {
        let cells: Vec<String> = columns.iter().map(|c| real(&c[row])).collect();
        writeln!(w, "{}", cells.join(","))?;
    }
    Ok(())
}

/// Vectors sorted by name.
fn ordered(bundle: &ResultBundle) -> Vec<&SignalVector> {
    let mut vectors: Vec<&SignalVector> = bundle.iter().collect();
    vectors.sort_by(|a, b| a.name().cmp(b.name()));
    vectors
}

fn real(x: &f64) -> String {
    format!("{x:e}")
}

fn complex(z: &Complex64) -> String {
    format!("{:e}{:+e}j", z.re, z.im)
}
