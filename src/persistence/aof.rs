// AOF persistence (§4.7): replay every command at startup through the same
// dispatch table live connections use, stage each mutating command's raw
// bytes per-DB, flush staged bytes at pipelining boundaries, fsync on a
// 1-second clock, and rewrite the file in the background with a diff-catchup
// splice (§4.7.1) so writes landing during the snapshot are never lost.

use crate::commands::dispatcher::{self, run_command};
use crate::protocol::CommandReader;
use crate::server::{ClientState, RedisServer, ServerConfig, ServerState};
use crate::storage::Value;
use bytes::{Bytes, BytesMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum AofError {
    #[error("aof io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("aof replay error: {0}")]
    Replay(String),
}

/// The live AOF file: an append-mode writer plus the path it was opened
/// from, so a finished rewrite can reopen it after the atomic rename.
pub struct AofHandle {
    file: File,
    path: PathBuf,
}

impl AofHandle {
    pub async fn open_append(path: impl AsRef<Path>) -> Result<Self, AofError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self { file, path })
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), AofError> {
        self.file.write_all(bytes).await?;
        Ok(())
    }

    pub async fn sync(&mut self) -> Result<(), AofError> {
        self.file.sync_data().await?;
        Ok(())
    }

    pub async fn len(&self) -> Result<u64, AofError> {
        Ok(self.file.metadata().await?.len())
    }

    /// Last-modified time of the file, for `LASTSAVE`. `0` if unavailable.
    pub fn mtime_unix(&self) -> u64 {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds a fresh `ServerState` and, if an AOF file exists, replays it
/// through the live command table before the server ever accepts a
/// connection. There is no separate replay interpreter (§4.7).
pub async fn load_and_open(config: ServerConfig) -> Result<ServerState, AofError> {
    let mut state = ServerState::new(config.clone());
    if !config.aof_enabled {
        return Ok(state);
    }

    if config.aof_path.exists() {
        let bytes = tokio::fs::read(&config.aof_path).await?;
        let replayed_dbnum = replay(&mut state, &bytes)?;
        state.aof_dbnum = replayed_dbnum;
        info!("AOF loaded from {:?}", config.aof_path);
    }

    state.aof = Some(AofHandle::open_append(&config.aof_path).await?);
    Ok(state)
}

fn replay(state: &mut ServerState, bytes: &[u8]) -> Result<i64, AofError> {
    let table = dispatcher::build_table();
    let mut reader = CommandReader::new();
    reader.feed(bytes);
    let mut client = ClientState::new(0, "<aof-replay>".to_string(), true);
    let mut replayed = 0u64;

    loop {
        match reader.next_command() {
            Ok(Some(cmd)) => {
                if cmd.argv.is_empty() {
                    continue;
                }
                let name = dispatcher::normalize_name(&cmd.argv[0]);
                let outcome = run_command(&table, state, &mut client, &name, &cmd.argv);
                if outcome.error {
                    return Err(AofError::Replay(format!(
                        "command {name} failed during replay: {}",
                        String::from_utf8_lossy(&outcome.reply)
                    )));
                }
                replayed += 1;
            }
            Ok(None) => break,
            Err(e) => return Err(AofError::Replay(e.message())),
        }
    }

    info!("replayed {replayed} commands from AOF");
    Ok(client.db_index as i64)
}

/// Drains every DB's staged bytes into the live AOF file (§4.7 steps 1-3):
/// `active_db` first (if it has anything staged), then the rest in
/// ascending order, emitting a synthetic `SELECT` whenever the DB number
/// written to the file changes.
pub async fn flush_aof(server: &RedisServer, active_db: usize) -> Result<(), AofError> {
    let mut guard = server.state.write().await;
    if guard.aof.is_none() {
        return Ok(());
    }

    let db_count = guard.dbs.len();
    let mut order: Vec<usize> = Vec::new();
    if active_db < db_count && !guard.dbs[active_db].aof_stage.is_empty() {
        order.push(active_db);
    }
    for i in 0..db_count {
        if i != active_db && !guard.dbs[i].aof_stage.is_empty() {
            order.push(i);
        }
    }
    if order.is_empty() {
        return Ok(());
    }

    let mut out = BytesMut::new();
    for num in order {
        if guard.aof_dbnum != num as i64 {
            write_select(&mut out, num);
            guard.aof_dbnum = num as i64;
        }
        let staged = guard.dbs[num].aof_stage.split();
        out.extend_from_slice(&staged);
    }

    let aof = guard.aof.as_mut().expect("checked above");
    aof.write_all(&out).await?;
    Ok(())
}

fn write_select(buf: &mut BytesMut, num: usize) {
    let num_s = num.to_string();
    crate::protocol::serializer::write_command_slices(buf, &[b"SELECT", num_s.as_bytes()]);
}

/// Background fsync clock (§4.8): one `sync_data` per second while an AOF
/// is open. A failed fsync is a fatal condition (§7).
pub async fn fsync_clock(server: Arc<RedisServer>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let synced = {
            let mut guard = server.state.write().await;
            match guard.aof.as_mut() {
                Some(aof) => Some(aof.sync().await),
                None => None,
            }
        };
        if let Some(Err(e)) = synced {
            server.post_fatal_io("aof fsync", &e).await;
            return;
        }
    }
}

fn temp_path_for(live: &Path) -> PathBuf {
    let dir = live.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    dir.join(format!("temp-rewrite-{}.aof", std::process::id()))
}

async fn write_frame(file: &mut File, argv: &[&[u8]]) -> Result<(), AofError> {
    let mut buf = BytesMut::new();
    crate::protocol::serializer::write_command_slices(&mut buf, argv);
    file.write_all(&buf).await?;
    Ok(())
}

async fn flush_mset_batch(file: &mut File, batch: &mut Vec<Bytes>) -> Result<(), AofError> {
    if batch.is_empty() {
        return Ok(());
    }
    let mut argv: Vec<&[u8]> = vec![b"MSET".as_ref()];
    argv.extend(batch.iter().map(|b| b.as_ref()));
    write_frame(file, &argv).await?;
    batch.clear();
    Ok(())
}

/// Background rewrite (§4.7.1): `BGREWRITEAOF`/`BGSAVE`/`SAVE` all funnel
/// here. Returns `Ok(false)` if there is no AOF to rewrite or a rewrite is
/// already running, without treating either as an error.
pub async fn rewrite_aof(server: &Arc<RedisServer>) -> Result<bool, AofError> {
    let (temp_path, live_path, lastpos, lastdbnum) = {
        let mut guard = server.state.write().await;
        if guard.aof.is_none() || guard.rewriting {
            return Ok(false);
        }
        guard.rewriting = true;
        let live_path = guard.aof.as_ref().unwrap().path().to_path_buf();
        let lastpos = guard.aof.as_mut().unwrap().len().await?;
        let lastdbnum = guard.aof_dbnum;
        (temp_path_for(&live_path), live_path, lastpos, lastdbnum)
    };

    let result = do_rewrite(server, &temp_path, &live_path, lastpos, lastdbnum).await;

    server.state.write().await.rewriting = false;

    match result {
        Ok(()) => {
            info!("AOF rewrite complete");
            Ok(true)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            error!("AOF rewrite failed: {e}");
            Err(e)
        }
    }
}

async fn do_rewrite(
    server: &Arc<RedisServer>,
    temp_path: &Path,
    live_path: &Path,
    lastpos: u64,
    lastdbnum: i64,
) -> Result<(), AofError> {
    let mut temp = OpenOptions::new().create(true).write(true).truncate(true).open(temp_path).await?;
    let mut emitted_dbnum: i64 = -1;

    let db_count = server.state.read().await.dbs.len();
    for dbnum in 0..db_count {
        let keys = {
            let guard = server.state.read().await;
            guard.dbs[dbnum].sorted_keys(Instant::now())
        };
        if keys.is_empty() {
            continue;
        }

        if emitted_dbnum != dbnum as i64 {
            let dbnum_s = dbnum.to_string();
            write_frame(&mut temp, &[b"SELECT", dbnum_s.as_bytes()]).await?;
            emitted_dbnum = dbnum as i64;
        }

        let mut string_batch: Vec<Bytes> = Vec::new();
        let mut expires: Vec<(Bytes, Duration)> = Vec::new();

        for (i, key) in keys.iter().enumerate() {
            if i > 0 && i % 100 == 0 {
                temp.flush().await?;
                tokio::task::yield_now().await;
            }

            let (value, deadline) = {
                let guard = server.state.read().await;
                let db = &guard.dbs[dbnum];
                match db.get(key) {
                    Some(v) => (Some(v.clone()), db.expiry_of(key)),
                    None => (None, None),
                }
            };
            let Some(value) = value else { continue };

            match value {
                Value::Str(v) => {
                    string_batch.push(key.clone());
                    string_batch.push(v);
                    if string_batch.len() >= 40 {
                        flush_mset_batch(&mut temp, &mut string_batch).await?;
                    }
                }
                Value::List(list) => {
                    let items: Vec<Bytes> = list.iter().cloned().collect();
                    for chunk in items.chunks(20) {
                        let mut argv: Vec<&[u8]> = vec![b"RPUSH".as_ref(), key.as_ref()];
                        argv.extend(chunk.iter().map(|b| b.as_ref()));
                        write_frame(&mut temp, &argv).await?;
                    }
                }
                Value::Set(set) => {
                    let items: Vec<Bytes> = set.iter().cloned().collect();
                    for chunk in items.chunks(20) {
                        let mut argv: Vec<&[u8]> = vec![b"SADD".as_ref(), key.as_ref()];
                        argv.extend(chunk.iter().map(|b| b.as_ref()));
                        write_frame(&mut temp, &argv).await?;
                    }
                }
            }

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if deadline > now {
                    expires.push((key.clone(), deadline - now));
                }
            }
        }

        flush_mset_batch(&mut temp, &mut string_batch).await?;

        for (key, dur) in expires {
            let secs = (dur.as_millis() as u64).div_ceil(1000).max(1);
            let secs_s = secs.to_string();
            write_frame(&mut temp, &[b"EXPIRE", key.as_ref(), secs_s.as_bytes()]).await?;
        }
    }

    temp.flush().await?;

    // Splice in whatever landed on the live file while the snapshot above
    // was being taken (§4.7.1 step 5): drain any remaining staged bytes
    // first, then copy the live file's tail past `lastpos`.
    flush_aof(server, 0).await?;
    let mut live_read = File::open(live_path).await?;
    let ln = live_read.metadata().await?.len();
    if ln > lastpos {
        if lastdbnum >= 0 && lastdbnum != emitted_dbnum {
            let lastdbnum_s = lastdbnum.to_string();
            write_frame(&mut temp, &[b"SELECT", lastdbnum_s.as_bytes()]).await?;
        }
        live_read.seek(std::io::SeekFrom::Start(lastpos)).await?;
        let mut tail = Vec::with_capacity((ln - lastpos) as usize);
        live_read.take(ln - lastpos).read_to_end(&mut tail).await?;
        temp.write_all(&tail).await?;
    }
    temp.flush().await?;
    drop(temp);
    drop(live_read);

    tokio::fs::rename(temp_path, live_path).await?;

    let mut guard = server.state.write().await;
    guard.aof = Some(AofHandle::open_append(live_path).await?);
    Ok(())
}
