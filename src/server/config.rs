// Server configuration (§1.1, §6). Deliberately tiny: no file parsing lives
// here (the CLI/config-file front end is an external collaborator per §1);
// `main` builds one of these directly. Kept close to the teacher's
// `ServerConfig`, trimmed to the fields this core actually uses and with the
// RDB fields dropped (§6: "Persisted state: the AOF file only").

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Empty means "all interfaces" (§6 default).
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// TCP accept backlog.
    pub tcp_backlog: u32,
    /// Advisory cap on concurrent clients.
    pub max_clients: usize,
    /// Number of logical databases.
    pub databases: usize,
    /// Enable AOF persistence.
    pub aof_enabled: bool,
    /// AOF file path, absolutized against the cwd at startup.
    pub aof_path: PathBuf,
    /// Refuse non-loopback clients when unauthenticated and unbound (§4.2.1).
    pub protected_mode: bool,
    /// Configured password, if any. `AUTH` compares against this.
    pub requirepass: Option<String>,
    /// Name substituted into the protected-mode DENIED message (§6).
    pub app_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: String::new(),
            port: 6379,
            tcp_backlog: 511,
            max_clients: 10_000,
            databases: 16,
            aof_enabled: true,
            aof_path: PathBuf::from("./appendonly.aof"),
            protected_mode: true,
            requirepass: None,
            app_name: "Redis".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind(mut self, bind: String) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn addr(&self) -> String {
        let host = if self.bind.is_empty() { "0.0.0.0" } else { &self.bind };
        format!("{}:{}", host, self.port)
    }

    /// Protected mode only bites when there's no bind address configured and
    /// no password set (§6 glossary: "Protected mode").
    pub fn is_protected(&self) -> bool {
        self.protected_mode && self.bind.is_empty() && self.requirepass.is_none()
    }
}
