//! The engine boundary.

use simwire_proto::{Analysis, ErrorCode, ErrorInfo, RawChunk, SourceFile, Sweep};

/// A simulator driven by one client connection.
///
/// Methods are called from the connection's task and must not block:
/// long-running work belongs on the engine's own thread, with [`poll`]
/// handing over whatever samples have accumulated since the last call.
///
/// [`poll`]: Engine::poll
pub trait Engine: Send + 'static {
    /// Replaces the working source set. The first file is the top-level
    /// netlist. Called only with sets that passed [`check_files`]; on error
    /// the previous set must stay in effect.
    fn load(&mut self, files: Vec<SourceFile>) -> Result<(), ErrorInfo>;

    /// Starts an analysis on the loaded sources, saving only `vectors`
    /// (all vectors when empty).
    fn start(&mut self, analysis: Analysis, vectors: &[String]) -> Result<(), ErrorInfo>;

    /// Returns the samples produced since the previous call. `more` stays
    /// `true` until the run has finished. An `Err` ends the run.
    fn poll(&mut self) -> Result<RawChunk, ErrorInfo>;

    /// Stops the running analysis, if any.
    fn halt(&mut self);
}

/// Rejects an empty set, empty names and repeated names.
pub fn check_files(files: &[SourceFile]) -> Result<(), ErrorInfo> {
    let invalid = |msg: String| Err(ErrorInfo::new(ErrorCode::InvalidFiles, msg));
    if files.is_empty() {
        return invalid("no files given".into());
    }
    for (i, file) in files.iter().enumerate() {
        if file.name.is_empty() {
            return invalid(format!("file #{i} has an empty name"));
        }
        if files[..i].iter().any(|f| f.name == file.name) {
            return invalid(format!("duplicate file name `{}`", file.name));
        }
    }
    Ok(())
}

/// Rejects non-finite or out-of-order analysis bounds.
pub fn check_analysis(analysis: &Analysis) -> Result<(), ErrorInfo> {
    let ok = match *analysis {
        Analysis::Transient { step, stop, start } => {
            [step, stop, start].iter().all(|x| x.is_finite())
                && step > 0.0
                && start >= 0.0
                && stop > start
        }
        Analysis::Ac {
            sweep,
            points,
            fstart,
            fstop,
        } => {
            // Log sweeps need a positive start frequency.
            let lowest_ok = match sweep {
                Sweep::Lin => fstart >= 0.0,
                _ => fstart > 0.0,
            };
            fstart.is_finite() && fstop.is_finite() && points > 0 && lowest_ok && fstop >= fstart
        }
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ErrorInfo::new(
            ErrorCode::InvalidAnalysis,
            format!("invalid parameters: {analysis:?}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_checks() {
        assert!(check_files(&[]).is_err());
        assert!(check_files(&[SourceFile::new("", ".end")]).is_err());
        let dup = [SourceFile::new("a.sp", "x"), SourceFile::new("a.sp", "y")];
        assert_eq!(check_files(&dup).unwrap_err().code, ErrorCode::InvalidFiles);
        check_files(&[SourceFile::new("a.sp", "x")]).unwrap();
    }

    #[test]
    fn analysis_checks() {
        check_analysis(&Analysis::Transient {
            step: 1e-6,
            stop: 1e-3,
            start: 0.0,
        })
        .unwrap();
        check_analysis(&Analysis::Op).unwrap();
        let bad = Analysis::Transient {
            step: 1e-6,
            stop: 0.0,
            start: 1e-3,
        };
        assert_eq!(
            check_analysis(&bad).unwrap_err().code,
            ErrorCode::InvalidAnalysis
        );
        let bad = Analysis::Ac {
            sweep: Sweep::Dec,
            points: 10,
            fstart: f64::NAN,
            fstop: 1e6,
        };
        assert!(check_analysis(&bad).is_err());
    }

    #[test]
    fn log_sweeps_reject_zero_start() {
        let ac = |sweep, fstart| Analysis::Ac {
            sweep,
            points: 10,
            fstart,
            fstop: 1e6,
        };
        for sweep in [Sweep::Dec, Sweep::Oct] {
            assert_eq!(
                check_analysis(&ac(sweep, 0.0)).unwrap_err().code,
                ErrorCode::InvalidAnalysis
            );
            check_analysis(&ac(sweep, 1.0)).unwrap();
        }
        check_analysis(&ac(Sweep::Lin, 0.0)).unwrap();
        assert!(check_analysis(&ac(Sweep::Lin, -1.0)).is_err());
    }
}
