//! `simwire tran|ac|op`: upload sources, run one analysis, print the vectors.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use simwire::{
    AnalysisSpec, CancelToken, RunOptions, SessionConfig, SimulationSession, SourceFile, Sweep,
};
use tracing::info;

use crate::output::{self, Format};

/// Options shared by every analysis command.
#[derive(clap::Args)]
pub struct Common {
    /// Top-level netlist, followed by include files.
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Vector to save (repeatable). Default: all.
    #[arg(long = "save", value_name = "NAME")]
    save: Vec<String>,

    /// Cancel the analysis after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Output format.
    #[arg(long, default_value = "table")]
    format: Format,
}

/// Arguments for `simwire tran`.
#[derive(clap::Args)]
pub struct TranArgs {
    /// Time step in seconds.
    #[arg(long)]
    step: f64,

    /// Stop time in seconds.
    #[arg(long)]
    stop: f64,

    /// Start time in seconds.
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    #[command(flatten)]
    common: Common,
}

/// Arguments for `simwire ac`.
#[derive(clap::Args)]
pub struct AcArgs {
    /// Sweep type: dec, oct or lin.
    #[arg(long, default_value = "dec")]
    sweep: Sweep,

    /// Points per decade/octave, or total points for lin.
    #[arg(long)]
    points: u32,

    /// Start frequency in Hz.
    #[arg(long)]
    fstart: f64,

    /// Stop frequency in Hz.
    #[arg(long)]
    fstop: f64,

    #[command(flatten)]
    common: Common,
}

/// Arguments for `simwire op`.
#[derive(clap::Args)]
pub struct OpArgs {
    #[command(flatten)]
    common: Common,
}

impl TranArgs {
    pub fn run(self, config: &SessionConfig) -> Result<()> {
        let spec = AnalysisSpec::transient(self.step, self.stop, self.start)?;
        self.common.run(config, &spec)
    }
}

impl AcArgs {
    pub fn run(self, config: &SessionConfig) -> Result<()> {
        let spec = AnalysisSpec::ac(self.sweep, self.points, self.fstart, self.fstop)?;
        self.common.run(config, &spec)
    }
}

impl OpArgs {
    pub fn run(self, config: &SessionConfig) -> Result<()> {
        self.common.run(config, &AnalysisSpec::op())
    }
}

impl Common {
    fn run(self, config: &SessionConfig, spec: &AnalysisSpec) -> Result<()> {
        let files = read_sources(&self.files)?;
        let opts = self.options()?;

        let session = SimulationSession::open_with(config.clone())?;
        session.load_files(files)?;
        let opts = opts.cancel_token(interrupt_token()?);
        info!(%spec, "running");
        let bundle = session
            .run_with(spec, opts)?
            .result()
            .with_context(|| format!("{spec} failed"))?;
        session.close();

        output::print(&bundle, self.format, &mut std::io::stdout().lock())
    }

    /// Timeout and saved vectors from the command line.
    fn options(&self) -> Result<RunOptions> {
        let mut opts = RunOptions::new();
        if let Some(secs) = self.timeout {
            let timeout = Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|d| !d.is_zero())
                .with_context(|| format!("invalid timeout {secs}"))?;
            opts = opts.timeout(timeout);
        }
        for name in &self.save {
            opts = opts.save(name.clone());
        }
        Ok(opts)
    }
}

/// A token set by the first Ctrl-C. A second Ctrl-C exits the process.
fn interrupt_token() -> Result<CancelToken> {
    let token = CancelToken::new();
    let cancelled = token.flag();
    flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&cancelled))
        .context("installing Ctrl-C handler")?;
    flag::register(SIGINT, cancelled).context("installing Ctrl-C handler")?;
    Ok(token)
}

/// Reads each path into a [`SourceFile`] named after its file name.
fn read_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                bail!("{}: not a file name", path.display());
            };
            let contents =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(SourceFile::new(name, contents))
        })
        .collect()
}
