// Per-connection client state (§3 "Client state") and the shared client
// directory backing `CLIENT LIST` (§4.9.1). `ClientState` lives entirely
// inside the connection task that owns it; `ClientRegistry` is the one piece
// shared across connections, so it is kept behind a plain `Mutex` rather than
// `dashmap` -- the teacher's `CLIENT LIST` traffic is low-frequency enough
// that a coarse lock is simpler and just as correct.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Authentication progress for one connection (§4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    None,
    LoopbackChecked,
    PasswordChecked,
}

/// Everything the dispatcher needs about the connection issuing the current
/// command. Owned by the connection task; never shared.
pub struct ClientState {
    pub id: u64,
    pub addr: String,
    pub peer_is_loopback: bool,
    pub db_index: usize,
    pub dirty: u64,
    pub auth: AuthStage,
    pub monitor: bool,
    pub name: Option<Bytes>,
    /// Set by the dispatcher after a command errors, so the monitor
    /// broadcaster (§4.2 step 8) can skip it.
    pub last_was_error: bool,
}

impl ClientState {
    pub fn new(id: u64, addr: String, peer_is_loopback: bool) -> Self {
        Self {
            id,
            addr,
            peer_is_loopback,
            db_index: 0,
            dirty: 0,
            auth: AuthStage::None,
            monitor: false,
            name: None,
            last_was_error: false,
        }
    }

    pub fn next_id() -> u64 {
        CLIENT_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    }
}

/// A point-in-time snapshot of one client, for `CLIENT LIST`.
#[derive(Debug, Clone)]
pub struct ClientSummary {
    pub id: u64,
    pub addr: String,
    pub db: usize,
    pub name: Option<String>,
    pub created_at: u64,
}

impl ClientSummary {
    fn to_list_entry(&self) -> String {
        format!(
            "id={} addr={} db={} name={} age={}",
            self.id,
            self.addr,
            self.db,
            self.name.as_deref().unwrap_or(""),
            now_secs().saturating_sub(self.created_at),
        )
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Shared directory of live connections, for `CLIENT LIST`/`CLIENT ID`.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<u64, ClientSummary>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&self, id: u64, addr: String) {
        self.clients.lock().unwrap().insert(
            id,
            ClientSummary {
                id,
                addr,
                db: 0,
                name: None,
                created_at: now_secs(),
            },
        );
    }

    pub fn unregister(&self, id: u64) {
        self.clients.lock().unwrap().remove(&id);
    }

    pub fn set_name(&self, id: u64, name: String) {
        if let Some(entry) = self.clients.lock().unwrap().get_mut(&id) {
            entry.name = Some(name);
        }
    }

    pub fn set_db(&self, id: u64, db: usize) {
        if let Some(entry) = self.clients.lock().unwrap().get_mut(&id) {
            entry.db = db;
        }
    }

    pub fn get_name(&self, id: u64) -> Option<String> {
        self.clients.lock().unwrap().get(&id).and_then(|c| c.name.clone())
    }

    pub fn count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn list(&self) -> String {
        let clients = self.clients.lock().unwrap();
        let mut entries: Vec<&ClientSummary> = clients.values().collect();
        entries.sort_by_key(|c| c.id);
        entries
            .iter()
            .map(|c| c.to_list_entry())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_list() {
        let reg = ClientRegistry::new();
        reg.register(1, "127.0.0.1:1111".to_string());
        reg.register(2, "127.0.0.1:2222".to_string());
        assert_eq!(reg.count(), 2);
        reg.set_name(1, "alice".to_string());
        assert_eq!(reg.get_name(1), Some("alice".to_string()));
        let listing = reg.list();
        assert!(listing.contains("name=alice"));
        reg.unregister(2);
        assert_eq!(reg.count(), 1);
    }
}
