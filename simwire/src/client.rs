//! Blocking request/response client for a simulation engine.
//!
//! One [`Client`] owns one TCP connection. Replies arrive in request order.
//! A `Read` may be left in flight while other calls go through: its reply
//! is parked until [`poll_read`](Client::poll_read) collects it. Partially
//! received frames survive a read timeout, so a wait can be sliced without
//! losing sync with the engine.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use simwire_proto::{
    MAX_FRAME, PROTOCOL_VERSION, RawChunk, Request, Response, RunReq, SourceFile,
};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Shortest socket timeout; zero would mean "block forever".
const MIN_WAIT: Duration = Duration::from_millis(1);

/// A connection to a running simulation engine.
#[derive(Debug)]
pub struct Client {
    /// The underlying TCP stream.
    stream: TcpStream,
    /// Socket read timeout outside of [`poll_read`](Self::poll_read).
    io_timeout: Option<Duration>,
    /// Bytes of a frame not yet fully received.
    rx: Vec<u8>,
    /// Replies to skip: cancelled reads and unacknowledged cancels.
    owed: usize,
    /// A `Read` has been sent and its reply not yet handed out.
    read_in_flight: bool,
    /// Reply to the in-flight `Read`, received ahead of another call's.
    parked: Option<Response>,
    /// A call timed out waiting for its reply; the stream is out of sync.
    desynced: bool,
}

impl Client {
    /// Dials the configured address and performs the version handshake.
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        let stream = dial(config).map_err(|source| Error::Connection {
            addr: config.address.clone(),
            source,
        })?;
        let mut client = Self {
            stream,
            io_timeout: config.io_timeout_duration(),
            rx: Vec::new(),
            owed: 0,
            read_in_flight: false,
            parked: None,
            desynced: false,
        };
        client.hello().map_err(|e| match e {
            Error::Transport(source) => Error::Connection {
                addr: config.address.clone(),
                source,
            },
            other => other,
        })?;
        Ok(client)
    }

    /// Sends a ping and waits for a pong.
    pub fn ping(&mut self) -> Result<()> {
        match self.call(&Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(unexpected("Ping", &other)),
        }
    }

    /// Replaces the engine's working source set.
    pub fn load_files(&mut self, files: Vec<SourceFile>) -> Result<u32> {
        match self.call(&Request::LoadFiles(files))? {
            Response::Loaded { files } => Ok(files),
            other => Err(unexpected("LoadFiles", &other)),
        }
    }

    /// Starts an analysis and returns its run identifier.
    pub fn run(&mut self, req: RunReq) -> Result<u64> {
        match self.call(&Request::Run(req))? {
            Response::Started { run } => Ok(run),
            other => Err(unexpected("Run", &other)),
        }
    }

    /// Asks for the samples produced since the previous read, without
    /// waiting for them. Collect the reply with [`poll_read`](Self::poll_read).
    pub fn send_read(&mut self, run: u64) -> Result<()> {
        self.check_sync()?;
        if self.read_in_flight {
            return Err(Error::Protocol("a read is already in flight".into()));
        }
        debug!(run, "read");
        simwire_proto::encode(&mut self.stream, &Request::Read { run })?;
        self.read_in_flight = true;
        Ok(())
    }

    /// Waits up to `wait` for the reply to [`send_read`](Self::send_read).
    ///
    /// Returns `Ok(None)` if nothing complete arrived in time; the read stays
    /// in flight and a later call picks up where this one stopped.
    pub fn poll_read(&mut self, wait: Duration) -> Result<Option<RawChunk>> {
        if !self.read_in_flight {
            return Err(Error::Protocol("no read in flight".into()));
        }
        let resp = match self.parked.take() {
            Some(resp) => resp,
            None => {
                self.stream.set_read_timeout(Some(wait.max(MIN_WAIT)))?;
                let got = self.next_reply();
                self.stream.set_read_timeout(self.io_timeout)?;
                match got {
                    Ok(resp) => resp,
                    Err(e) if is_timeout(&e) => return Ok(None),
                    Err(e) => {
                        self.read_in_flight = false;
                        return Err(e.into());
                    }
                }
            }
        };
        self.read_in_flight = false;
        match resp {
            Response::Data(chunk) => Ok(Some(chunk)),
            Response::Error(info) => {
                debug!(%info, "engine error");
                Err(info.into())
            }
            other => Err(unexpected("Read", &other)),
        }
    }

    /// Asks the engine to halt a run. Does not wait for the acknowledgement,
    /// which is skipped when it arrives; an in-flight read is abandoned the
    /// same way.
    pub fn cancel(&mut self, run: u64) -> Result<()> {
        if self.read_in_flight {
            self.read_in_flight = false;
            if self.parked.take().is_none() {
                self.owed += 1;
            }
        }
        debug!(run, "cancel");
        simwire_proto::encode(&mut self.stream, &Request::Cancel { run })?;
        self.owed += 1;
        Ok(())
    }

    /// A second handle on the socket, for [`Shutdown`] from another thread.
    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// Closes both directions of the stream.
    pub fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(error = %e, "stream shutdown");
        }
    }

    /// Exchanges protocol versions.
    fn hello(&mut self) -> Result<()> {
        match self.call(&Request::Hello {
            version: PROTOCOL_VERSION,
        })? {
            Response::HelloAck { version } if version == PROTOCOL_VERSION => Ok(()),
            Response::HelloAck { version } => Err(Error::Protocol(format!(
                "engine protocol v{version}, client protocol v{PROTOCOL_VERSION}"
            ))),
            other => Err(unexpected("Hello", &other)),
        }
    }

    /// Sends one request and reads its response. Engine-reported errors
    /// become their matching [`Error`] kind.
    fn call(&mut self, req: &Request) -> Result<Response> {
        self.check_sync()?;
        debug!(?req, "request");
        simwire_proto::encode(&mut self.stream, req)?;
        if self.read_in_flight && self.parked.is_none() {
            let reply = self.reply()?;
            self.parked = Some(reply);
        }
        match self.reply()? {
            Response::Error(info) => {
                debug!(%info, "engine error");
                Err(info.into())
            }
            resp => Ok(resp),
        }
    }

    /// Fails once a timed-out call has left a reply unaccounted for.
    fn check_sync(&self) -> Result<()> {
        if self.desynced {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                "engine stopped answering",
            )));
        }
        Ok(())
    }

    /// Next reply for a blocking call, honouring the I/O timeout.
    fn reply(&mut self) -> Result<Response> {
        self.next_reply().map_err(|e| {
            if is_timeout(&e) {
                self.desynced = true;
            }
            Error::Transport(e)
        })
    }

    /// Next reply that is not owed to an abandoned request.
    fn next_reply(&mut self) -> io::Result<Response> {
        loop {
            let resp = self.next_frame()?;
            if self.owed == 0 {
                return Ok(resp);
            }
            self.owed -= 1;
            debug!(?resp, "skipped stale reply");
        }
    }

    /// Reads until one whole frame is buffered and decodes it.
    fn next_frame(&mut self) -> io::Result<Response> {
        let mut buf = [0u8; 8192];
        loop {
            if let Some(resp) = self.take_frame()? {
                return Ok(resp);
            }
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => self.rx.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Pops a complete frame off the receive buffer.
    fn take_frame(&mut self) -> io::Result<Option<Response>> {
        let Some(header) = self.rx.first_chunk::<4>() else {
            return Ok(None);
        };
        let len = u32::from_be_bytes(*header);
        if len > MAX_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame exceeds 64 MiB limit",
            ));
        }
        let end = 4 + len as usize;
        if self.rx.len() < end {
            return Ok(None);
        }
        let frame: Vec<u8> = self.rx.drain(..end).collect();
        simwire_proto::decode(&mut frame.as_slice()).map(Some)
    }
}

/// Socket timeouts surface as `WouldBlock` on Unix and `TimedOut` on Windows.
fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Opens a TCP stream to the first reachable resolved address.
fn dial(config: &SessionConfig) -> io::Result<TcpStream> {
    let timeout = config.connect_timeout_duration();
    let mut last = None;
    for addr in config.address.to_socket_addrs()? {
        let attempt = if timeout.is_zero() {
            TcpStream::connect(addr)
        } else {
            TcpStream::connect_timeout(&addr, timeout)
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(config.io_timeout_duration())?;
                stream.set_write_timeout(config.io_timeout_duration())?;
                return Ok(stream);
            }
            Err(e) => last = Some(e),
        }
    }
    Err(last.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("`{}` resolved to no addresses", config.address),
        )
    }))
}

/// Builds the error for a response that does not answer `call`.
fn unexpected(call: &str, resp: &Response) -> Error {
    Error::Protocol(format!("unexpected response to {call}: {resp:?}"))
}
