//! TCP listener and per-connection session spawn.

use std::io;

use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{info, warn};

use crate::dispatch;
use crate::engine::Engine;

/// Binds a listener for [`serve`].
pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Accepts connections forever, driving a fresh engine from `factory` on
/// each one.
pub async fn serve<F, E>(listener: TcpListener, factory: F) -> io::Result<()>
where
    F: Fn() -> E,
    E: Engine,
{
    loop {
        let (stream, peer) = listener.accept().await?;
        let engine = factory();
        info!(%peer, "client connected");
        tokio::spawn(async move {
            if let Err(e) = session(stream, engine).await {
                warn!(%peer, error = %e, "session error");
            }
            info!(%peer, "client disconnected");
        });
    }
}

/// Runs one connection to completion.
async fn session<E: Engine>(stream: TcpStream, engine: E) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    let mut r = BufReader::new(reader);
    let mut w = BufWriter::new(writer);
    dispatch::handle(&mut r, &mut w, engine).await
}
