//! TCP accept loop and per-connection line pump
//!
//! Each accepted socket gets a [`ChannelConnection`]: a writer task drains
//! its queue onto the socket while the reader feeds lines to the
//! coordinator. Either side ending tears the session down.

use growroom_core::ConnectionId;
use growroom_hub::Coordinator;
use growroom_net::{encode_line, ChannelConnection, Outbound};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Accept connections until the listener fails
pub async fn serve(listener: TcpListener, hub: Arc<Coordinator>) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let hub = hub.clone();
        tokio::spawn(async move {
            handle_connection(hub, stream, addr).await;
        });
    }
}

async fn handle_connection(hub: Arc<Coordinator>, stream: TcpStream, addr: SocketAddr) {
    let id = ConnectionId(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed));
    if let Err(e) = stream.set_nodelay(true) {
        debug!(conn = %id, error = %e, "set_nodelay failed");
    }
    let (read_half, mut write_half) = stream.into_split();
    let (conn, mut outbound) = ChannelConnection::new(id, Some(addr.into()));
    hub.connect(Arc::new(conn));
    debug!(conn = %id, peer = %addr, "connection accepted");

    let mut writer = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            let message = match item {
                Outbound::Message(message) => message,
                Outbound::Close => break,
            };
            let line = match encode_line(&message) {
                Ok(line) => line,
                Err(e) => {
                    warn!(conn = %id, error = %e, "dropping unencodable message");
                    continue;
                }
            };
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        hub.handle_line(id, &line).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(conn = %id, error = %e, "read failed");
                    break;
                }
            },
            // The coordinator closed us, e.g. on heartbeat timeout
            _ = &mut writer => break,
        }
    }

    hub.disconnect(id).await;
    writer.abort();
}
