//! Per-connection conversation: handshake, then request/response until EOF.

use std::io;

use simwire_proto::{ErrorCode, ErrorInfo, PROTOCOL_VERSION, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::engine::{Engine, check_analysis, check_files};

/// Handles one connection: reads requests until EOF, answering each.
///
/// The first request must be [`Request::Hello`] with a matching version;
/// anything else is answered with an error and the connection is dropped.
/// On EOF any active run is halted.
pub async fn handle<E: Engine>(
    r: &mut (impl AsyncRead + Unpin),
    w: &mut (impl AsyncWrite + Unpin),
    engine: E,
) -> io::Result<()> {
    let hello: Request = match simwire_proto::recv(r).await {
        Ok(h) => h,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
        Err(e) => return Err(e),
    };

    let ack = match hello {
        Request::Hello { version } if version == PROTOCOL_VERSION => Response::HelloAck {
            version: PROTOCOL_VERSION,
        },
        Request::Hello { version } => Response::Error(ErrorInfo::version_mismatch(format!(
            "client protocol v{version}, engine protocol v{PROTOCOL_VERSION}"
        ))),
        _ => Response::Error(ErrorInfo::new(
            ErrorCode::Protocol,
            "expected Hello as the first request",
        )),
    };
    let accepted = matches!(ack, Response::HelloAck { .. });
    simwire_proto::send(w, &ack).await?;
    w.flush().await?;
    if !accepted {
        return Ok(());
    }

    let mut conv = Conversation::new(engine);
    loop {
        let req: Request = match simwire_proto::recv(r).await {
            Ok(req) => req,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                conv.end();
                return Ok(());
            }
            Err(e) => {
                conv.end();
                return Err(e);
            }
        };
        let resp = conv.respond(req);
        simwire_proto::send(w, &resp).await?;
        w.flush().await?;
    }
}

/// Protocol state of one connection after the handshake.
#[derive(Debug)]
pub struct Conversation<E> {
    /// The engine behind this connection.
    engine: E,
    /// Whether a source set has been accepted.
    loaded: bool,
    /// Identifier of the running analysis.
    active: Option<u64>,
    /// Next run identifier to hand out.
    next_run: u64,
}

impl<E: Engine> Conversation<E> {
    /// Wraps a fresh engine.
    pub const fn new(engine: E) -> Self {
        Self {
            engine,
            loaded: false,
            active: None,
            next_run: 1,
        }
    }

    /// Answers one request.
    pub fn respond(&mut self, req: Request) -> Response {
        match req {
            Request::LoadFiles(files) => self.load(files),
            Request::Run(run) => {
                if !self.loaded {
                    return error(ErrorCode::NotLoaded, "no source files loaded");
                }
                if self.active.is_some() {
                    return error(ErrorCode::Busy, "an analysis is already running");
                }
                if let Err(info) = check_analysis(&run.analysis)
                    .and_then(|()| self.engine.start(run.analysis, &run.vectors))
                {
                    return Response::Error(info);
                }
                let id = self.next_run;
                self.next_run += 1;
                self.active = Some(id);
                info!(run = id, analysis = ?run.analysis, "analysis started");
                Response::Started { run: id }
            }
            Request::Read { run } => {
                if self.active != Some(run) {
                    return error(ErrorCode::UnknownRun, format!("run {run} is not active"));
                }
                match self.engine.poll() {
                    Ok(chunk) => {
                        if !chunk.more {
                            self.active = None;
                            info!(run, "analysis finished");
                        }
                        Response::Data(chunk)
                    }
                    Err(info) => {
                        self.active = None;
                        info!(run, %info, "analysis failed");
                        Response::Error(info)
                    }
                }
            }
            Request::Cancel { run } => {
                if self.active == Some(run) {
                    self.engine.halt();
                    self.active = None;
                    info!(run, "analysis cancelled");
                }
                Response::Cancelled
            }
            Request::Ping => Response::Pong,
            Request::Hello { .. } => error(ErrorCode::Protocol, "duplicate Hello"),
            other => error(ErrorCode::Protocol, format!("unsupported request {other:?}")),
        }
    }

    /// Halts any active run at end of connection.
    pub fn end(&mut self) {
        if let Some(run) = self.active.take() {
            debug!(run, "halting on disconnect");
            self.engine.halt();
        }
    }

    /// Handles [`Request::LoadFiles`].
    fn load(&mut self, files: Vec<simwire_proto::SourceFile>) -> Response {
        if self.active.is_some() {
            return error(ErrorCode::Busy, "cannot load files while an analysis runs");
        }
        if let Err(info) = check_files(&files) {
            return Response::Error(info);
        }
        let count = u32::try_from(files.len()).unwrap_or(u32::MAX);
        match self.engine.load(files) {
            Ok(()) => {
                self.loaded = true;
                Response::Loaded { files: count }
            }
            Err(info) => Response::Error(info),
        }
    }
}

/// Shorthand for an error response.
fn error(code: ErrorCode, message: impl Into<String>) -> Response {
    Response::Error(ErrorInfo::new(code, message))
}

#[cfg(test)]
mod tests {
    use simwire_proto::{Analysis, RawChunk, RawVector, RunReq, SourceFile};

    use super::*;

    /// Engine that finishes after a fixed number of polls.
    #[derive(Debug, Default)]
    struct Countdown {
        polls_left: u32,
        halted: bool,
        fail: bool,
    }

    impl Engine for Countdown {
        fn load(&mut self, files: Vec<SourceFile>) -> Result<(), ErrorInfo> {
            self.fail = files[0].contents.contains(".fail");
            Ok(())
        }

        fn start(&mut self, _: Analysis, _: &[String]) -> Result<(), ErrorInfo> {
            self.polls_left = 2;
            Ok(())
        }

        fn poll(&mut self) -> Result<RawChunk, ErrorInfo> {
            if self.fail {
                return Err(ErrorInfo::simulation("no convergence"));
            }
            self.polls_left -= 1;
            Ok(RawChunk {
                scale: None,
                more: self.polls_left > 0,
                vectors: vec![RawVector::from_real("V(1)", vec![1.0])],
            })
        }

        fn halt(&mut self) {
            self.halted = true;
        }
    }

    fn run_req() -> Request {
        Request::Run(RunReq {
            analysis: Analysis::Op,
            vectors: Vec::new(),
        })
    }

    fn code(resp: &Response) -> ErrorCode {
        match resp {
            Response::Error(info) => info.code,
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn run_requires_loaded_sources() {
        let mut conv = Conversation::new(Countdown::default());
        assert_eq!(code(&conv.respond(run_req())), ErrorCode::NotLoaded);
    }

    #[test]
    fn one_run_at_a_time() {
        let mut conv = Conversation::new(Countdown::default());
        conv.respond(Request::LoadFiles(vec![SourceFile::new("a.sp", ".end")]));
        assert_eq!(conv.respond(run_req()), Response::Started { run: 1 });
        assert_eq!(code(&conv.respond(run_req())), ErrorCode::Busy);
        assert_eq!(
            code(&conv.respond(Request::LoadFiles(vec![SourceFile::new("b.sp", ".end")]))),
            ErrorCode::Busy
        );

        let Response::Data(first) = conv.respond(Request::Read { run: 1 }) else {
            panic!("expected Data");
        };
        assert!(first.more);
        let Response::Data(last) = conv.respond(Request::Read { run: 1 }) else {
            panic!("expected Data");
        };
        assert!(!last.more);
        assert_eq!(
            code(&conv.respond(Request::Read { run: 1 })),
            ErrorCode::UnknownRun
        );
        assert_eq!(conv.respond(run_req()), Response::Started { run: 2 });
    }

    #[test]
    fn engine_fault_ends_run() {
        let mut conv = Conversation::new(Countdown::default());
        conv.respond(Request::LoadFiles(vec![SourceFile::new("a.sp", ".fail")]));
        conv.respond(run_req());
        let resp = conv.respond(Request::Read { run: 1 });
        assert_eq!(
            resp,
            Response::Error(ErrorInfo::simulation("no convergence"))
        );
        assert_eq!(conv.respond(run_req()), Response::Started { run: 2 });
    }

    #[test]
    fn cancel_halts_engine() {
        let mut conv = Conversation::new(Countdown::default());
        conv.respond(Request::LoadFiles(vec![SourceFile::new("a.sp", ".end")]));
        conv.respond(run_req());
        assert_eq!(conv.respond(Request::Cancel { run: 1 }), Response::Cancelled);
        assert!(conv.engine.halted);
        // Idempotent.
        assert_eq!(conv.respond(Request::Cancel { run: 1 }), Response::Cancelled);
    }

    #[test]
    fn rejected_file_set_is_atomic() {
        let mut conv = Conversation::new(Countdown::default());
        let resp = conv.respond(Request::LoadFiles(vec![
            SourceFile::new("a.sp", ".end"),
            SourceFile::new("a.sp", ".end"),
        ]));
        assert_eq!(code(&resp), ErrorCode::InvalidFiles);
        assert_eq!(code(&conv.respond(run_req())), ErrorCode::NotLoaded);
    }

    #[tokio::test]
    async fn handshake_then_ping() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut sr, mut sw) = tokio::io::split(server);
        let task = tokio::spawn(async move {
            handle(&mut sr, &mut sw, Countdown::default()).await
        });

        let (mut cr, mut cw) = tokio::io::split(client);
        simwire_proto::send(&mut cw, &Request::Hello { version: PROTOCOL_VERSION })
            .await
            .unwrap();
        cw.flush().await.unwrap();
        let ack: Response = simwire_proto::recv(&mut cr).await.unwrap();
        assert_eq!(ack, Response::HelloAck { version: PROTOCOL_VERSION });

        simwire_proto::send(&mut cw, &Request::Ping).await.unwrap();
        cw.flush().await.unwrap();
        let pong: Response = simwire_proto::recv(&mut cr).await.unwrap();
        assert_eq!(pong, Response::Pong);

        drop(cw);
        drop(cr);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn version_mismatch_closes() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut sr, mut sw) = tokio::io::split(server);
        let task = tokio::spawn(async move {
            handle(&mut sr, &mut sw, Countdown::default()).await
        });

        let (mut cr, mut cw) = tokio::io::split(client);
        simwire_proto::send(&mut cw, &Request::Hello { version: 99 }).await.unwrap();
        cw.flush().await.unwrap();
        let resp: Response = simwire_proto::recv(&mut cr).await.unwrap();
        assert_eq!(code(&resp), ErrorCode::VersionMismatch);
        task.await.unwrap().unwrap();
    }
}
