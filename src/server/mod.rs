// Server module: the shared state every command operates on (`ServerState`),
// the handle wrapping it for a running server (`RedisServer`), and the
// fatal-error cell (§7) background tasks post to for a cooperative shutdown.

pub mod client_info;
pub mod config;
pub mod connection;
pub mod listener;

pub use client_info::{AuthStage, ClientRegistry, ClientState};
pub use config::ServerConfig;

use crate::commands::dispatcher::{self, CommandTable};
use crate::persistence::aof::AofHandle;
use crate::storage::Database;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::warn;

/// Everything a command function can read or mutate (§3 "Server state").
/// Guarded by `RedisServer::state`, a single shared readers-writer lock.
pub struct ServerState {
    pub dbs: Vec<Database>,
    pub config: ServerConfig,
    pub aof: Option<AofHandle>,
    /// Last DB number written to the AOF file; -1 means "none selected yet".
    pub aof_dbnum: i64,
    pub rewriting: bool,
    /// Same directory `RedisServer::clients` holds -- cloning a
    /// `ClientRegistry` shares the underlying map, so `CLIENT LIST`/`ID`
    /// (registered as plain `ReadFn`s, which only see `ServerState`) can
    /// reach it without needing the owning `Arc<RedisServer>`.
    pub clients: ClientRegistry,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let dbs = (0..config.databases).map(Database::new).collect();
        Self { dbs, config, aof: None, aof_dbnum: -1, rewriting: false, clients: ClientRegistry::new() }
    }
}

/// One of the handful of conditions that unwind the whole server (§7).
#[derive(Debug, Clone)]
pub enum FatalError {
    ShutdownSave,
    ShutdownNoSave,
    Io(String),
}

/// Idempotent one-shot post + wake, per §7's "Implementation mapping": first
/// poster wins, the watcher is notified exactly once per posted value.
pub struct FatalCell {
    inner: Mutex<Option<FatalError>>,
    notify: Notify,
}

impl FatalCell {
    pub fn new() -> Self {
        Self { inner: Mutex::new(None), notify: Notify::new() }
    }

    pub fn post(&self, err: FatalError) {
        let mut guard = self.inner.lock().unwrap();
        if guard.is_none() {
            *guard = Some(err);
            self.notify.notify_waiters();
        }
    }

    /// Waits until a fatal error has been posted, then returns it. Safe to
    /// call from multiple tasks; every waiter observes the same value.
    pub async fn wait(&self) -> FatalError {
        loop {
            if let Some(err) = self.inner.lock().unwrap().clone() {
                return err;
            }
            self.notify.notified().await;
        }
    }
}

impl Clone for FatalError {
    fn clone(&self) -> Self {
        match self {
            FatalError::ShutdownSave => FatalError::ShutdownSave,
            FatalError::ShutdownNoSave => FatalError::ShutdownNoSave,
            FatalError::Io(s) => FatalError::Io(s.clone()),
        }
    }
}

impl Default for FatalCell {
    fn default() -> Self {
        Self::new()
    }
}

/// The live server: shared state behind one lock, the immutable command
/// table, the client directory, the monitor fan-out, and the fatal cell.
pub struct RedisServer {
    pub state: RwLock<ServerState>,
    pub table: CommandTable,
    pub fatal: FatalCell,
    pub clients: ClientRegistry,
    monitor_tx: broadcast::Sender<Bytes>,
    next_client_id: AtomicU64,
}

impl RedisServer {
    pub async fn new(config: ServerConfig) -> anyhow::Result<std::sync::Arc<Self>> {
        let state = crate::persistence::aof::load_and_open(config).await?;
        let clients = state.clients.clone();
        let (monitor_tx, _) = broadcast::channel(1024);
        Ok(std::sync::Arc::new(Self {
            state: RwLock::new(state),
            table: dispatcher::build_table(),
            fatal: FatalCell::new(),
            clients,
            monitor_tx,
            next_client_id: AtomicU64::new(1),
        }))
    }

    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn config_snapshot(&self) -> ServerConfig {
        self.state.read().await.config.clone()
    }

    pub fn subscribe_monitor(&self) -> broadcast::Receiver<Bytes> {
        self.monitor_tx.subscribe()
    }

    /// Best-effort fan-out to connected `MONITOR` clients (§1 excludes the
    /// exact wire format of this fan-out from the core contract).
    pub fn broadcast_monitor(&self, client: &ClientState, name: &str, argv: &[Bytes]) {
        if self.monitor_tx.receiver_count() == 0 {
            return;
        }
        let mut line = format!("+[{}] {} {}", client.db_index, client.addr, name.to_lowercase());
        for arg in &argv[1..] {
            line.push(' ');
            line.push_str(&format!("{:?}", String::from_utf8_lossy(arg)));
        }
        line.push_str("\r\n");
        let _ = self.monitor_tx.send(Bytes::from(line));
    }

    pub async fn post_fatal_io(&self, context: &str, err: impl std::fmt::Display) {
        warn!("fatal I/O error during {context}: {err}");
        self.fatal.post(FatalError::Io(format!("{context}: {err}")));
    }
}
