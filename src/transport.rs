// THEORY:
// The transport carries one complete light batch per capture cycle from the
// estimating side to the renderer and answers each with an acknowledgment.
//
// 1.  **Framing**: every message is a 4-byte big-endian length followed by the
//     payload. A length past the configured maximum is refused before a single
//     payload byte is read, so a bad peer cannot make the server allocate.
// 2.  **All or Nothing**: a payload that does not decode as a valid batch is
//     discarded whole. It produces no batch, no acknowledgment, and the
//     connection is closed. Renderer state is never touched by it.
// 3.  **Bounded Concurrency**: each connection runs on its own task, and a
//     semaphore caps how many run at once. A connection that arrives while the
//     cap is reached waits in the listen backlog.
// 4.  **Hand-off**: decoded batches go into an unbounded channel owned by the
//     render loop. The network side never touches managed lights.
// 5.  **Shutdown**: a `watch` signal stops the accept loop, the listener is
//     released, and in-flight handlers are awaited before `run` returns.

use crate::config::TransportConfig;
use crate::core_modules::observation::LightBatch;
use crate::error::{TransportError, TransportResult};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub const ACK: &[u8] = b"Message received";

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame of at most `max_len` payload bytes.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> TransportResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Resolves once shutdown is requested or the signal's sender is gone.
async fn shutdown_requested(signal: &mut watch::Receiver<bool>) {
    while !*signal.borrow_and_update() {
        if signal.changed().await.is_err() {
            return;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerSummary {
    pub connections: u64,
}

pub struct LightServer {
    listener: TcpListener,
    config: TransportConfig,
}

impl LightServer {
    pub async fn bind(config: TransportConfig) -> TransportResult<Self> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| TransportError::Bind {
                addr: config.bind_address.clone(),
                source,
            })?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` turns true, forwarding every valid
    /// batch to `batches`.
    pub async fn run(
        self,
        batches: mpsc::UnboundedSender<LightBatch>,
        mut shutdown: watch::Receiver<bool>,
    ) -> TransportResult<ServerSummary> {
        let Self { listener, config } = self;
        let config = Arc::new(config);
        let permits = Arc::new(Semaphore::new(config.max_connections));
        let mut in_flight: FuturesUnordered<JoinHandle<()>> = FuturesUnordered::new();
        let mut summary = ServerSummary::default();

        info!(addr = %listener.local_addr()?, max_connections = config.max_connections, "light server accepting");

        loop {
            // --- 1. Wait for a free handler slot ---
            let permit = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                Some(joined) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Err(err) = joined {
                        error!(%err, "connection handler panicked");
                    }
                    continue;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // --- 2. Accept ---
            let (stream, peer) = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                },
            };
            summary.connections += 1;
            debug!(%peer, "connection accepted");

            // --- 3. Handle on its own task ---
            let batches = batches.clone();
            let config = config.clone();
            in_flight.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = handle_connection(stream, peer, &batches, &config).await {
                    warn!(%peer, %err, "connection closed with error");
                }
            }));
        }

        drop(listener);
        info!(in_flight = in_flight.len(), "light server stopping");
        while let Some(joined) = in_flight.next().await {
            if let Err(err) = joined {
                error!(%err, "connection handler panicked");
            }
        }
        Ok(summary)
    }
}

/// Serves one connection: batch in, acknowledgment out, until the peer
/// closes or sends something malformed.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    batches: &mpsc::UnboundedSender<LightBatch>,
    config: &TransportConfig,
) -> TransportResult<()> {
    loop {
        let payload = match timeout(config.read_timeout, read_frame(&mut stream, config.max_frame_len)).await {
            Err(_) => return Err(TransportError::Timeout(config.read_timeout)),
            Ok(Err(TransportError::Io(err))) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(%peer, "peer closed");
                return Ok(());
            }
            Ok(Err(err)) => return Err(err),
            Ok(Ok(payload)) => payload,
        };

        let batch = match LightBatch::from_json(&payload) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(%peer, %err, "malformed batch discarded");
                return Ok(());
            }
        };

        debug!(%peer, lights = batch.len(), "batch received");
        if batches.send(batch).is_err() {
            warn!("renderer queue closed, dropping connection");
            return Ok(());
        }
        write_frame(&mut stream, ACK).await?;
    }
}

/// Estimating-side client. Each batch is one connection and one exchange.
#[derive(Debug, Clone)]
pub struct LightClient {
    addr: String,
    timeout: Duration,
}

impl LightClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub async fn send_batch(&self, batch: &LightBatch) -> TransportResult<()> {
        let payload = batch.to_json()?;
        let exchange = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            write_frame(&mut stream, &payload).await?;
            let reply = read_frame(&mut stream, ACK.len()).await?;
            if reply != ACK {
                return Err(TransportError::Malformed(format!(
                    "unexpected acknowledgment {:?}",
                    String::from_utf8_lossy(&reply)
                )));
            }
            Ok::<(), TransportError>(())
        };
        timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}
