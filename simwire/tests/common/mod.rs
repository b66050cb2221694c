//! Loopback engine for integration tests.
//!
//! [`RcEngine`] answers every netlist with the analytic response of a
//! first-order RC low-pass (R = 1 kΩ, C = 1 µF) driven by a 5 V, 1 kHz
//! sine. Marker lines in the top-level netlist change its behaviour:
//! `.fail` reports a simulation fault, `.stall` never finishes, `.crash`
//! drops the connection mid-run.

#![allow(dead_code)]

use std::f64::consts::PI;
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;

use simwire_proto::{
    Analysis, ErrorInfo, PROTOCOL_VERSION, RawChunk, RawComplex, RawVector, Request, Response,
    SourceFile, Sweep,
};
use simwire_server::Engine;

/// RC time constant in seconds.
const TAU: f64 = 1e-3;

/// Samples handed out per poll.
const CHUNK: usize = 128;

pub const NETLIST: &str = "* test
V1 1 0 AC 1 sin(0 5 1k)
R1 1 2 1k
C2 2 0 1u
.end
";

/// Synthetic engine with a closed-form RC response.
#[derive(Debug, Default)]
pub struct RcEngine {
    /// Top-level netlist of the working set.
    netlist: String,
    /// Data of the running analysis.
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    scale: Option<&'static str>,
    vectors: Vec<RawVector>,
    cursor: usize,
    total: usize,
}

impl Engine for RcEngine {
    fn load(&mut self, files: Vec<SourceFile>) -> Result<(), ErrorInfo> {
        self.netlist = files[0].contents.clone();
        Ok(())
    }

    fn start(&mut self, analysis: Analysis, vectors: &[String]) -> Result<(), ErrorInfo> {
        let (scale, mut data) = match analysis {
            Analysis::Transient { step, stop, start } => (Some("time"), transient(step, stop, start)),
            Analysis::Ac {
                sweep,
                points,
                fstart,
                fstop,
            } => (Some("freq"), ac(sweep, points, fstart, fstop)),
            _ => (
                None,
                vec![
                    RawVector::from_real("V(1)", vec![0.0]),
                    RawVector::from_real("V(2)", vec![0.0]),
                ],
            ),
        };
        if !vectors.is_empty() {
            data.retain(|v| Some(v.name.as_str()) == scale || vectors.contains(&v.name));
        }
        let total = data.first().map_or(0, |v| v.real.len().max(v.complex.len()));
        self.pending = Some(Pending {
            scale,
            vectors: data,
            cursor: 0,
            total,
        });
        Ok(())
    }

    fn poll(&mut self) -> Result<RawChunk, ErrorInfo> {
        if self.netlist.contains(".fail") {
            self.pending = None;
            return Err(ErrorInfo::simulation("timestep too small"));
        }
        if self.netlist.contains(".crash") {
            panic!("engine crashed");
        }
        if self.netlist.contains(".stall") {
            return Ok(RawChunk {
                scale: None,
                more: true,
                vectors: Vec::new(),
            });
        }
        let Some(p) = self.pending.as_mut() else {
            return Ok(RawChunk::default());
        };

        let end = (p.cursor + CHUNK).min(p.total);
        let vectors = p
            .vectors
            .iter()
            .map(|v| RawVector {
                name: v.name.clone(),
                kind: v.kind,
                real: slice(&v.real, p.cursor, end),
                complex: slice(&v.complex, p.cursor, end),
            })
            .collect();
        p.cursor = end;
        let chunk = RawChunk {
            scale: p.scale.map(str::to_owned),
            more: p.cursor < p.total,
            vectors,
        };
        if !chunk.more {
            self.pending = None;
        }
        Ok(chunk)
    }

    fn halt(&mut self) {
        self.pending = None;
    }
}

fn slice<T: Clone>(v: &[T], from: usize, to: usize) -> Vec<T> {
    if v.is_empty() { Vec::new() } else { v[from..to].to_vec() }
}

fn transient(step: f64, stop: f64, start: f64) -> Vec<RawVector> {
    let n = ((stop - start) / step).round() as usize + 1;
    let time: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
    let v1: Vec<f64> = time.iter().map(|t| 5.0 * (2.0 * PI * 1e3 * t).sin()).collect();
    let mut v2 = vec![0.0; n];
    for i in 1..n {
        v2[i] = v2[i - 1] + (v1[i - 1] - v2[i - 1]) * step / TAU;
    }
    vec![
        RawVector::from_real("time", time),
        RawVector::from_real("V(1)", v1),
        RawVector::from_real("V(2)", v2),
    ]
}

fn ac(sweep: Sweep, points: u32, fstart: f64, fstop: f64) -> Vec<RawVector> {
    let per = f64::from(points);
    let freqs: Vec<f64> = match sweep {
        Sweep::Lin if points == 1 => vec![fstart],
        Sweep::Lin => (0..points)
            .map(|k| fstart + f64::from(k) * (fstop - fstart) / (per - 1.0))
            .collect(),
        Sweep::Oct => log_points(2.0, per, fstart, fstop),
        _ => log_points(10.0, per, fstart, fstop),
    };
    let c = |re: f64, im: f64| RawComplex { real: re, imag: im };
    let freq = freqs.iter().map(|&f| c(f, 0.0)).collect();
    let v1 = freqs.iter().map(|_| c(1.0, 0.0)).collect();
    let v2 = freqs
        .iter()
        .map(|&f| {
            let wt = 2.0 * PI * f * TAU;
            let d = 1.0 + wt * wt;
            c(1.0 / d, -wt / d)
        })
        .collect();
    vec![
        RawVector::from_complex("freq", freq),
        RawVector::from_complex("V(1)", v1),
        RawVector::from_complex("V(2)", v2),
    ]
}

fn log_points(base: f64, per: f64, fstart: f64, fstop: f64) -> Vec<f64> {
    let span = (fstop / fstart).log(base);
    let n = (span * per + 1e-9).floor() as u32 + 1;
    (0..n)
        .map(|k| fstart * base.powf(f64::from(k) / per))
        .collect()
}

/// Starts an [`RcEngine`] server on a loopback port and returns its address.
pub fn spawn_engine() -> SocketAddr {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = simwire_server::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            simwire_server::serve(listener, RcEngine::default).await.unwrap();
        });
    });
    rx.recv().unwrap()
}

/// Starts an engine that handles the handshake, uploads and `Run`, then
/// never answers again once it has seen a `Read`.
pub fn spawn_silent_engine() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut s, _) = listener.accept().unwrap();
        let mut silent = false;
        while let Ok(req) = simwire_proto::decode::<Request>(&mut s) {
            let resp = match req {
                Request::Read { .. } => {
                    silent = true;
                    continue;
                }
                _ if silent => continue,
                Request::Hello { .. } => Response::HelloAck {
                    version: PROTOCOL_VERSION,
                },
                Request::LoadFiles(files) => Response::Loaded {
                    files: files.len() as u32,
                },
                Request::Run(_) => Response::Started { run: 1 },
                _ => Response::Pong,
            };
            if simwire_proto::encode(&mut s, &resp).is_err() {
                break;
            }
        }
    });
    addr
}

/// The standard netlist with an extra marker line.
pub fn netlist_with(marker: &str) -> SourceFile {
    SourceFile::new("bar.sp", NETLIST.replace(".end", &format!("{marker}\n.end")))
}

/// The standard netlist.
pub fn netlist() -> SourceFile {
    SourceFile::new("bar.sp", NETLIST)
}
