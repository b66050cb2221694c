//! Length-prefixed frame codec over blocking and async streams.
//!
//! Each frame is: `[u32 big-endian length][postcard payload]`.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

/// Maximum allowed frame payload (64 MiB).
pub const MAX_FRAME: u32 = 64 * 1024 * 1024;

/// Encodes `msg` as a length-prefixed postcard frame and writes it to `w`.
pub fn encode<W: Write>(w: &mut W, msg: &impl Serialize) -> io::Result<()> {
    let payload = to_payload(msg)?;
    w.write_all(&frame_len(&payload)?.to_be_bytes())?;
    w.write_all(&payload)?;
    w.flush()
}

/// Reads a length-prefixed postcard frame from `r` and decodes it.
pub fn decode<T: for<'de> Deserialize<'de>>(r: &mut impl Read) -> io::Result<T> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    let mut payload = vec![0u8; checked_len(u32::from_be_bytes(buf))?];
    r.read_exact(&mut payload)?;
    from_payload(&payload)
}

/// Async counterpart of [`encode`]. Does not flush.
#[cfg(feature = "async")]
pub async fn send<W>(w: &mut W, msg: &impl Serialize) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let payload = to_payload(msg)?;
    w.write_all(&frame_len(&payload)?.to_be_bytes()).await?;
    w.write_all(&payload).await
}

/// Async counterpart of [`decode`].
#[cfg(feature = "async")]
pub async fn recv<T, R>(r: &mut R) -> io::Result<T>
where
    T: for<'de> Deserialize<'de>,
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await?;
    let mut payload = vec![0u8; checked_len(u32::from_be_bytes(buf))?];
    r.read_exact(&mut payload).await?;
    from_payload(&payload)
}

/// Serializes a message body.
fn to_payload(msg: &impl Serialize) -> io::Result<Vec<u8>> {
    postcard::to_allocvec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Deserializes a message body.
fn from_payload<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> io::Result<T> {
    postcard::from_bytes(payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Validates an outgoing payload size and returns it as a frame header.
fn frame_len(payload: &[u8]) -> io::Result<u32> {
    match u32::try_from(payload.len()) {
        Ok(len) if len <= MAX_FRAME => Ok(len),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds 64 MiB limit",
        )),
    }
}

/// Validates an incoming frame header.
fn checked_len(len: u32) -> io::Result<usize> {
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds 64 MiB limit",
        ));
    }
    Ok(len as usize)
}
