//! Simulation sessions: connection lifecycle, uploads and analysis dispatch.
//!
//! A [`SimulationSession`] owns one engine connection and moves through
//! `Created → Connected → Ready ⇄ Busy → Closed`. At most one
//! [`AnalysisHandle`] is outstanding per session; uploads and runs travel
//! over the same in-order channel, so every upload is visible to every
//! later analysis.

use std::fmt;
use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use simwire_proto::{RawChunk, RunReq, SourceFile};
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisKind, AnalysisSpec};
use crate::bundle::ResultBundle;
use crate::client::Client;
use crate::codec::{self, RawBundle};
use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Lifecycle state of a [`SimulationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// Constructed, not yet connected.
    Created,
    /// Connected, no sources loaded.
    Connected,
    /// Sources loaded, no analysis outstanding.
    Ready,
    /// An analysis is outstanding.
    Busy,
    /// Closed; every operation fails with [`Error::SessionClosed`].
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Closed => "closed",
        })
    }
}

/// Connection state shared between a session and its handle.
#[derive(Debug)]
struct Channel {
    /// Current lifecycle state.
    state: SessionState,
    /// Identifier of the outstanding run.
    run: Option<u64>,
    /// Live connection, present between connect and close.
    client: Option<Client>,
}

impl Channel {
    /// Returns the connection if the session is open.
    fn client(&mut self) -> Result<&mut Client> {
        match self.state {
            SessionState::Created => Err(Error::NotConnected),
            SessionState::Closed => Err(Error::SessionClosed),
            _ => self.client.as_mut().ok_or(Error::NotConnected),
        }
    }

    /// Returns the connection if the session is open and idle.
    fn idle_client(&mut self) -> Result<&mut Client> {
        if self.state == SessionState::Busy {
            return Err(Error::ConcurrentAnalysis);
        }
        self.client()
    }

    /// Releases the session from `run`, if it is still the outstanding one.
    fn finish(&mut self, run: u64) {
        if self.run == Some(run) {
            self.run = None;
            if self.state == SessionState::Busy {
                self.state = SessionState::Ready;
            }
        }
    }
}

/// Longest single wait on the socket before the deadline and the cancel
/// token are checked again.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Locks a mutex, recovering from poisoning.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A session with a remote simulation engine.
///
/// Dropping the session closes it.
///
/// # Example
///
/// ```no_run
/// use simwire::{AnalysisSpec, SimulationSession, SourceFile};
///
/// let session = SimulationSession::open("localhost:5923")?;
/// session.load_files([SourceFile::new("rc.sp", "* rc\nR1 1 2 1k\nC2 2 0 1u\n.end\n")])?;
/// let bundle = session
///     .run(&AnalysisSpec::transient(1e-6, 1e-3, 0.0)?)?
///     .result()?;
/// println!("{:?}", bundle.independent_variable()?.as_real());
/// # Ok::<(), simwire::Error>(())
/// ```
#[derive(Debug)]
pub struct SimulationSession {
    /// Connection settings.
    config: SessionConfig,
    /// Channel shared with the outstanding [`AnalysisHandle`].
    shared: Arc<Mutex<Channel>>,
    /// Clone of the socket, shut down by [`close`](Self::close) when the
    /// channel is held by a blocked call.
    breaker: Mutex<Option<TcpStream>>,
}

impl SimulationSession {
    /// Creates an unconnected session. Call [`connect`](Self::connect)
    /// before anything else.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Channel {
                state: SessionState::Created,
                run: None,
                client: None,
            })),
            breaker: Mutex::new(None),
        }
    }

    /// Connects to the engine at `address` with default settings.
    pub fn open(address: impl Into<String>) -> Result<Self> {
        Self::open_with(SessionConfig::new(address))
    }

    /// Connects with explicit settings.
    pub fn open_with(config: SessionConfig) -> Result<Self> {
        let session = Self::new(config);
        session.connect()?;
        Ok(session)
    }

    /// Establishes the channel. A no-op on an already connected session.
    pub fn connect(&self) -> Result<()> {
        let mut ch = lock(&self.shared);
        match ch.state {
            SessionState::Created => {
                let client = Client::connect(&self.config)?;
                match client.try_clone_stream() {
                    Ok(stream) => *lock(&self.breaker) = Some(stream),
                    Err(e) => warn!(error = %e, "cannot clone stream; close may wait on a blocked call"),
                }
                ch.client = Some(client);
                ch.state = SessionState::Connected;
                info!(addr = %self.config.address, "session connected");
                Ok(())
            }
            SessionState::Closed => Err(Error::SessionClosed),
            _ => Ok(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        lock(&self.shared).state
    }

    /// Connection settings.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Checks that the engine answers. Allowed while an analysis runs.
    pub fn ping(&self) -> Result<()> {
        lock(&self.shared).client()?.ping()
    }

    /// Uploads source files, replacing the engine's working set.
    ///
    /// The first file is the top-level netlist; the rest are include
    /// files. The set is accepted or rejected as a whole. Returns the number
    /// of files the engine accepted.
    pub fn load_files(&self, files: impl IntoIterator<Item = SourceFile>) -> Result<usize> {
        let mut ch = lock(&self.shared);
        let client = ch.idle_client()?;

        let files: Vec<SourceFile> = files.into_iter().collect();
        check_files(&files)?;
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();

        let accepted = client.load_files(files)?;
        ch.state = SessionState::Ready;
        info!(files = ?names, "sources loaded");
        Ok(accepted as usize)
    }

    /// Starts an analysis with default options.
    pub fn run(&self, spec: &AnalysisSpec) -> Result<AnalysisHandle> {
        self.run_with(spec, RunOptions::default())
    }

    /// Starts an analysis.
    ///
    /// Fails with [`Error::ConcurrentAnalysis`] while another handle from
    /// this session is unresolved, and with [`Error::NotLoaded`] before the
    /// first successful [`load_files`](Self::load_files).
    pub fn run_with(&self, spec: &AnalysisSpec, opts: RunOptions) -> Result<AnalysisHandle> {
        let mut ch = lock(&self.shared);
        let loaded = ch.state == SessionState::Ready;
        let client = ch.idle_client()?;
        if !loaded {
            return Err(Error::NotLoaded);
        }

        let run = client.run(RunReq {
            analysis: *spec.as_wire(),
            vectors: opts.vectors,
        })?;
        ch.state = SessionState::Busy;
        ch.run = Some(run);
        info!(run, analysis = %spec, "analysis started");

        Ok(AnalysisHandle {
            shared: Arc::clone(&self.shared),
            run,
            kind: spec.kind(),
            cancel: opts.cancel.unwrap_or_default(),
            deadline: opts.timeout.map(|t| Instant::now() + t),
            poll: self.config.poll_interval_duration(),
            io_timeout: self.config.io_timeout_duration(),
            done: false,
        })
    }

    /// Closes the session, cancelling any outstanding analysis.
    ///
    /// Idempotent. Outstanding handles fail with [`Error::SessionClosed`]
    /// or, if they were mid-read, [`Error::Transport`]. Returns promptly
    /// even when another thread is blocked on the engine.
    pub fn close(&self) {
        let mut ch = self.lock_or_break();
        if ch.state == SessionState::Closed {
            return;
        }
        let outstanding = ch.run;
        if let (Some(run), Some(client)) = (outstanding, ch.client.as_mut()) {
            if let Err(e) = client.cancel(run) {
                warn!(run, error = %e, "cancel on close failed");
            }
        }
        if let Some(client) = ch.client.take() {
            client.shutdown();
        }
        lock(&self.breaker).take();
        ch.run = None;
        ch.state = SessionState::Closed;
        info!(addr = %self.config.address, "session closed");
    }

    /// Takes the channel lock. If a blocking call keeps it for longer than
    /// two read slices, the socket is shut down under it first.
    fn lock_or_break(&self) -> MutexGuard<'_, Channel> {
        let give_up = Instant::now() + 2 * READ_SLICE;
        loop {
            match self.shared.try_lock() {
                Ok(ch) => return ch,
                Err(TryLockError::Poisoned(p)) => return p.into_inner(),
                Err(TryLockError::WouldBlock) if Instant::now() < give_up => {
                    thread::sleep(Duration::from_millis(5));
                }
                Err(TryLockError::WouldBlock) => {
                    if let Some(stream) = lock(&self.breaker).as_ref() {
                        debug!("breaking blocked call");
                        if let Err(e) = stream.shutdown(Shutdown::Both) {
                            debug!(error = %e, "stream shutdown");
                        }
                    }
                    return lock(&self.shared);
                }
            }
        }
    }
}

impl Drop for SimulationSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Rejects file sets the engine could never accept.
fn check_files(files: &[SourceFile]) -> Result<()> {
    if files.is_empty() {
        return Err(Error::Load {
            message: "no files given".into(),
        });
    }
    for (i, file) in files.iter().enumerate() {
        if file.name.is_empty() {
            return Err(Error::Load {
                message: format!("file #{i} has an empty name"),
            });
        }
        if files[..i].iter().any(|f| f.name == file.name) {
            return Err(Error::Load {
                message: format!("duplicate file name `{}`", file.name),
            });
        }
    }
    Ok(())
}

/// Options for [`SimulationSession::run_with`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct RunOptions {
    /// Deadline for the whole analysis, measured from dispatch.
    timeout: Option<Duration>,
    /// Vectors to save; empty saves all.
    vectors: Vec<String>,
    /// External cancellation flag.
    cancel: Option<CancelToken>,
}

impl RunOptions {
    /// Default options: no timeout, save all vectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the analysis if it has not completed within `timeout`.
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Restricts the result to the named vector. Repeatable.
    pub fn save(mut self, vector: impl Into<String>) -> Self {
        self.vectors.push(vector.into());
        self
    }

    /// Uses an existing token to cancel the analysis.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Thread-safe cancellation flag for an [`AnalysisHandle`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for signal handlers that set it directly.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// An in-flight analysis.
///
/// [`result`](Self::result) is the only suspension point: it polls the
/// engine until the run completes, fails, is cancelled or times out.
/// Dropping an unresolved handle cancels the run.
#[derive(Debug)]
#[must_use = "dropping an AnalysisHandle cancels the analysis"]
pub struct AnalysisHandle {
    /// Channel shared with the session.
    shared: Arc<Mutex<Channel>>,
    /// Engine-assigned run identifier.
    run: u64,
    /// Analysis category, tagged onto the result.
    kind: AnalysisKind,
    /// Cancellation flag.
    cancel: CancelToken,
    /// Absolute deadline, if a timeout was requested.
    deadline: Option<Instant>,
    /// Pause between polls.
    poll: Duration,
    /// Longest wait for one reply; `None` waits indefinitely.
    io_timeout: Option<Duration>,
    /// Set once the run has been resolved or cancelled.
    done: bool,
}

impl AnalysisHandle {
    /// Engine-assigned run identifier.
    pub const fn run_id(&self) -> u64 {
        self.run
    }

    /// Analysis category.
    pub const fn kind(&self) -> AnalysisKind {
        self.kind
    }

    /// A token that cancels this analysis from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Cancels the analysis and notifies the engine.
    pub fn cancel(mut self) -> Result<()> {
        self.done = true;
        self.abort()
    }

    /// Waits for the engine to finish and returns the decoded result.
    ///
    /// Fails with [`Error::Simulation`] if the engine reports a fault,
    /// [`Error::Transport`] if the channel drops, and [`Error::Cancelled`]
    /// if the token fires or the timeout elapses first.
    pub fn result(mut self) -> Result<ResultBundle> {
        let outcome = self.collect();
        self.done = true;
        outcome
    }

    /// Polls until the run ends, accumulating chunks.
    ///
    /// Each socket wait is capped by [`READ_SLICE`] and the deadline, so the
    /// token and the deadline are honoured while the engine is silent.
    fn collect(&mut self) -> Result<ResultBundle> {
        let mut raw = RawBundle::new(self.kind);
        let mut sent = None;
        loop {
            if self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d) {
                if let Err(e) = self.abort() {
                    warn!(run = self.run, error = %e, "cancel failed");
                }
                info!(run = self.run, "analysis cancelled");
                return Err(Error::Cancelled);
            }

            let polled = {
                let mut ch = lock(&self.shared);
                let polled = ch
                    .client()
                    .and_then(|client| self.poll_once(client, &mut sent));
                if !matches!(polled, Ok(None) | Ok(Some(RawChunk { more: true, .. }))) {
                    ch.finish(self.run);
                }
                polled?
            };
            let Some(chunk) = polled else {
                thread::yield_now();
                continue;
            };
            let more = chunk.more;
            debug!(run = self.run, vectors = chunk.vectors.len(), more, "chunk");

            if let Err(e) = raw.absorb(chunk) {
                if let Err(ce) = self.abort() {
                    warn!(run = self.run, error = %ce, "cancel failed");
                }
                return Err(e);
            }
            if !more {
                break;
            }
            thread::sleep(self.pause(self.poll));
        }
        info!(run = self.run, vectors = raw.vectors.len(), "analysis complete");
        codec::decode(&raw)
    }

    /// Sends a `Read` unless one is in flight, then waits one slice for its
    /// reply. `sent` holds the time the in-flight read went out.
    fn poll_once(&self, client: &mut Client, sent: &mut Option<Instant>) -> Result<Option<RawChunk>> {
        let since = match *sent {
            Some(at) => at,
            None => {
                client.send_read(self.run)?;
                *sent.insert(Instant::now())
            }
        };
        if self.io_timeout.is_some_and(|limit| since.elapsed() >= limit) {
            client.cancel(self.run)?;
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no reply to read of run {}", self.run),
            )));
        }
        let chunk = client.poll_read(self.pause(READ_SLICE))?;
        if chunk.is_some() {
            *sent = None;
        }
        Ok(chunk)
    }

    /// `wait`, capped by the time left to the deadline.
    fn pause(&self, wait: Duration) -> Duration {
        self.deadline.map_or(wait, |d| {
            wait.min(d.saturating_duration_since(Instant::now()))
        })
    }

    /// Tells the engine to halt the run and releases the session.
    fn abort(&self) -> Result<()> {
        let mut ch = lock(&self.shared);
        if ch.run != Some(self.run) {
            return Ok(());
        }
        let sent = ch.client().and_then(|c| c.cancel(self.run));
        ch.finish(self.run);
        sent
    }
}

impl Drop for AnalysisHandle {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = self.abort() {
                warn!(run = self.run, error = %e, "cancel on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_before_connect_fail() {
        let session = SimulationSession::new(SessionConfig::default());
        assert_eq!(session.state(), SessionState::Created);
        assert!(matches!(session.ping(), Err(Error::NotConnected)));
        assert!(matches!(
            session.load_files([SourceFile::new("a.sp", ".end")]),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            session.run(&AnalysisSpec::op()),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn operations_after_close_fail() {
        let session = SimulationSession::new(SessionConfig::default());
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.connect(), Err(Error::SessionClosed)));
        assert!(matches!(session.ping(), Err(Error::SessionClosed)));
        assert!(matches!(
            session.run(&AnalysisSpec::op()),
            Err(Error::SessionClosed)
        ));
        session.close();
    }

    #[test]
    fn file_set_checks() {
        assert!(matches!(check_files(&[]), Err(Error::Load { .. })));
        assert!(matches!(
            check_files(&[SourceFile::new("", "x")]),
            Err(Error::Load { .. })
        ));
        assert!(matches!(
            check_files(&[SourceFile::new("a.sp", "x"), SourceFile::new("a.sp", "y")]),
            Err(Error::Load { .. })
        ));
        check_files(&[SourceFile::new("a.sp", "x"), SourceFile::new("b.inc", "y")]).unwrap();
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(token.flag().load(Ordering::SeqCst));
    }
}
