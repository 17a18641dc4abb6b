// Per-connection driver (§4.2): frames commands off the socket, dispatches
// them, and honors the reader's flush boundaries. Also relays `MONITOR`
// broadcasts to this connection when it has opted in.

use super::client_info::ClientState;
use super::RedisServer;
use crate::commands::dispatcher;
use crate::persistence::aof;
use crate::protocol::{CommandReader, Reply};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub async fn handle(server: Arc<RedisServer>, socket: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
    let id = server.next_client_id();
    let addr = peer.to_string();
    server.clients.register(id, addr.clone());
    let mut client = ClientState::new(id, addr, super::listener::peer_is_loopback(&peer));

    let (mut read_half, mut write_half) = socket.into_split();
    let mut reader = CommandReader::new();
    let mut monitor_rx = server.subscribe_monitor();
    let mut read_buf = vec![0u8; 16 * 1024];
    let mut out = BytesMut::new();

    let outcome: anyhow::Result<()> = 'outer: loop {
        loop {
            match reader.next_command() {
                Ok(Some(cmd)) => {
                    if cmd.argv.is_empty() {
                        if cmd.flush_hint {
                            if let Err(e) = flush_boundary(&server, &mut client, &mut write_half, &mut out).await {
                                break 'outer Err(e);
                            }
                        }
                        continue;
                    }

                    let result = dispatcher::dispatch(&server, &mut client, cmd.raw, cmd.argv).await;
                    out.extend_from_slice(&result.reply);
                    server.clients.set_db(id, client.db_index);

                    if result.close {
                        if let Err(e) = write_half.write_all(&out).await {
                            break 'outer Err(e.into());
                        }
                        let _ = write_half.flush().await;
                        break 'outer Ok(());
                    }

                    if cmd.flush_hint {
                        if let Err(e) = flush_boundary(&server, &mut client, &mut write_half, &mut out).await {
                            break 'outer Err(e);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    out.extend_from_slice(&Reply::err(&format!("Protocol error: {}", e.message())));
                    let _ = write_half.write_all(&out).await;
                    let _ = write_half.flush().await;
                    break 'outer Ok(());
                }
            }
        }

        tokio::select! {
            n = read_half.read(&mut read_buf) => {
                let n = n?;
                if n == 0 {
                    break 'outer Ok(());
                }
                reader.feed(&read_buf[..n]);
            }
            Ok(line) = monitor_rx.recv(), if client.monitor => {
                write_half.write_all(&line).await?;
                write_half.flush().await?;
            }
        }
    };

    debug!("connection {id} closing");
    server.clients.unregister(id);
    outcome
}

async fn flush_boundary(
    server: &Arc<RedisServer>,
    client: &mut ClientState,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    out: &mut BytesMut,
) -> anyhow::Result<()> {
    if let Err(e) = aof::flush_aof(server, client.db_index).await {
        server.post_fatal_io("aof flush", &e).await;
    }
    write_half.write_all(out).await?;
    write_half.flush().await?;
    out.clear();
    Ok(())
}
