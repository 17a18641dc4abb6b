// TCP accept loop (§5 "one task per accepted connection") and the
// cooperative-shutdown race against the fatal-error cell (§7).

use super::connection;
use super::{FatalError, RedisServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub async fn run(server: Arc<RedisServer>) -> anyhow::Result<()> {
    let addr = server.config_snapshot().await.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {addr}");

    tokio::spawn(crate::persistence::aof::fsync_clock(server.clone()));
    tokio::spawn(crate::commands::expiration::run_sweeper(server.clone()));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        info!("accepted connection from {peer}");
                        let server = server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = connection::handle(server.clone(), socket, peer).await {
                                error!("connection error: {e}");
                            }
                        });
                    }
                    Err(e) => error!("accept failed: {e}"),
                }
            }
            fatal = server.fatal.wait() => {
                info!("shutting down: {fatal:?}");
                shutdown(&server).await;
                return match fatal {
                    FatalError::Io(msg) => Err(anyhow::anyhow!("fatal I/O error: {msg}")),
                    FatalError::ShutdownSave | FatalError::ShutdownNoSave => Ok(()),
                };
            }
        }
    }
}

fn is_loopback(addr: &SocketAddr) -> bool {
    addr.ip().is_loopback()
}

pub(super) fn peer_is_loopback(peer: &SocketAddr) -> bool {
    is_loopback(peer)
}

/// Clean-shutdown sequence (§4.7): stop the periodic tasks (they simply stop
/// being polled once this function returns and the process exits), final
/// flush, fsync, close.
async fn shutdown(server: &Arc<RedisServer>) {
    if let Err(e) = crate::persistence::aof::flush_aof(server, 0).await {
        error!("final AOF flush failed during shutdown: {e}");
    }
    let mut guard = server.state.write().await;
    if let Some(aof) = guard.aof.as_mut() {
        if let Err(e) = aof.sync().await {
            error!("final fsync failed during shutdown: {e}");
        }
    }
}
