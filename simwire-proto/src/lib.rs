//! Wire protocol between simwire clients and remote simulation engines.
//!
//! Messages are serialized with [`postcard`] and framed with a 4-byte
//! big-endian length prefix, suitable for any reliable byte stream
//! (TCP, Unix socket, in-memory pipe).
//!
//! A conversation always opens with [`Request::Hello`]. After that the
//! client uploads sources with [`Request::LoadFiles`], starts an analysis
//! with [`Request::Run`] and pulls sample chunks with [`Request::Read`]
//! until a [`RawChunk`] arrives with `more == false`.

mod codec;
mod message;

#[cfg(feature = "async")]
pub use codec::{recv, send};
pub use codec::{MAX_FRAME, decode, encode};
pub use message::{
    Analysis, DEFAULT_PORT, ErrorCode, ErrorInfo, PROTOCOL_VERSION, RawChunk, RawComplex, RawKind,
    RawVector, Request, Response, RunReq, SourceFile, Sweep,
};
