// Library root: a single in-process key/value store speaking RESP over TCP
// (§1). `main.rs` just wires a `ServerConfig` and `server::listener::run`.

pub mod commands;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod storage;

pub use protocol::{CommandReader, ProtocolError, Reply};
pub use server::{RedisServer, ServerConfig};
pub use storage::{Database, TtlStatus, Value};
