// Command dispatcher (§4.2): the command table, the per-command lock
// discipline (§5), authentication (§4.2.1), and the two entry points that
// share both --
//
//   `dispatch`      -- live connections: normalizes, authenticates, takes the
//                      server lock in the mode the command declares, invokes
//                      it, stages AOF bytes, releases, broadcasts to monitors.
//   `run_command`   -- AOF replay: same table, same handler functions, no
//                      locking (the caller already owns the state exclusively)
//                      and no AOF staging. There is deliberately no second
//                      interpreter for command semantics (§4.7).

use crate::persistence::aof;
use crate::protocol::Reply;
use crate::server::client_info::{AuthStage, ClientState};
use crate::server::{FatalError, RedisServer, ServerConfig, ServerState};
use bitflags::bitflags;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

use super::{admin_cmds, config_cmds, connection_cmds, key_mgmt, list, server_cmds, set, string};

bitflags! {
    #[derive(Clone, Copy, Debug)]
    pub struct CommandFlags: u8 {
        const WRITE      = 0b0001;
        const IS_MONITOR = 0b0010;
    }
}

/// The result of invoking one command function: the reply bytes, how many
/// mutations it performed (§3 "dirty-counter"), and whether it errored.
pub struct CommandOutcome {
    pub reply: Vec<u8>,
    pub dirty: u64,
    pub error: bool,
}

impl CommandOutcome {
    pub fn simple(reply: Vec<u8>) -> Self {
        Self { reply, dirty: 0, error: false }
    }

    pub fn mutated(reply: Vec<u8>, dirty: u64) -> Self {
        Self { reply, dirty, error: false }
    }

    pub fn error(reply: Vec<u8>) -> Self {
        Self { reply, dirty: 0, error: true }
    }
}

pub type WriteFn = fn(&mut ServerState, &mut ClientState, &[Bytes]) -> CommandOutcome;
pub type ReadFn = fn(&ServerState, &mut ClientState, &[Bytes]) -> CommandOutcome;
pub type NoLockFn = fn(&mut ClientState, &[Bytes]) -> CommandOutcome;

#[derive(Clone, Copy)]
pub enum Handler {
    Write(WriteFn),
    Read(ReadFn),
    NoLock(NoLockFn),
}

pub struct CommandSpec {
    pub flags: CommandFlags,
    pub handler: Handler,
}

pub type CommandTable = HashMap<&'static str, CommandSpec>;

macro_rules! entry {
    ($table:expr, $name:expr, write, $f:expr) => {
        $table.insert($name, CommandSpec { flags: CommandFlags::WRITE, handler: Handler::Write($f) });
    };
    ($table:expr, $name:expr, read, $f:expr) => {
        $table.insert($name, CommandSpec { flags: CommandFlags::empty(), handler: Handler::Read($f) });
    };
    ($table:expr, $name:expr, nolock, $f:expr) => {
        $table.insert($name, CommandSpec { flags: CommandFlags::empty(), handler: Handler::NoLock($f) });
    };
}

/// Builds the command table once (at server startup). Every command the core
/// understands is named here; adding one never requires touching the reader,
/// the lock discipline, or the AOF pipeline (§1).
pub fn build_table() -> CommandTable {
    let mut t: CommandTable = HashMap::new();

    entry!(t, "PING", nolock, connection_cmds::cmd_ping);
    entry!(t, "ECHO", nolock, connection_cmds::cmd_echo);
    entry!(t, "AUTH", read, connection_cmds::cmd_auth);

    entry!(t, "GET", read, string::cmd_get);
    entry!(t, "SET", write, string::cmd_set);
    entry!(t, "APPEND", write, string::cmd_append);
    entry!(t, "GETSET", write, string::cmd_getset);
    entry!(t, "SETNX", write, string::cmd_setnx);
    entry!(t, "MSET", write, string::cmd_mset);
    entry!(t, "MSETNX", write, string::cmd_msetnx);
    entry!(t, "MGET", read, string::cmd_mget);
    entry!(t, "INCR", write, string::cmd_incr);
    entry!(t, "DECR", write, string::cmd_decr);
    entry!(t, "INCRBY", write, string::cmd_incrby);
    entry!(t, "DECRBY", write, string::cmd_decrby);
    entry!(t, "BITCOUNT", read, string::cmd_bitcount);

    entry!(t, "RPUSH", write, list::cmd_rpush);
    entry!(t, "LPUSH", write, list::cmd_lpush);
    entry!(t, "LRANGE", read, list::cmd_lrange);
    entry!(t, "LREM", write, list::cmd_lrem);
    entry!(t, "LTRIM", write, list::cmd_ltrim);
    entry!(t, "LPOP", write, list::cmd_lpop);
    entry!(t, "RPOP", write, list::cmd_rpop);
    entry!(t, "LLEN", read, list::cmd_llen);
    entry!(t, "LINDEX", read, list::cmd_lindex);
    entry!(t, "LSET", write, list::cmd_lset);

    entry!(t, "SADD", write, set::cmd_sadd);
    entry!(t, "SREM", write, set::cmd_srem);
    entry!(t, "SCARD", read, set::cmd_scard);
    entry!(t, "SISMEMBER", read, set::cmd_sismember);
    entry!(t, "SMEMBERS", read, set::cmd_smembers);
    entry!(t, "SMOVE", write, set::cmd_smove);
    entry!(t, "SPOP", write, set::cmd_spop);
    entry!(t, "SRANDMEMBER", read, set::cmd_srandmember);
    entry!(t, "SDIFF", read, set::cmd_sdiff);
    entry!(t, "SINTER", read, set::cmd_sinter);
    entry!(t, "SUNION", read, set::cmd_sunion);
    entry!(t, "SDIFFSTORE", write, set::cmd_sdiffstore);
    entry!(t, "SINTERSTORE", write, set::cmd_sinterstore);
    entry!(t, "SUNIONSTORE", write, set::cmd_sunionstore);

    entry!(t, "KEYS", read, key_mgmt::cmd_keys);
    entry!(t, "EXISTS", read, key_mgmt::cmd_exists);
    entry!(t, "DEL", write, key_mgmt::cmd_del);
    entry!(t, "TYPE", read, key_mgmt::cmd_type);
    entry!(t, "EXPIRE", write, key_mgmt::cmd_expire);
    entry!(t, "TTL", read, key_mgmt::cmd_ttl);
    entry!(t, "PERSIST", write, key_mgmt::cmd_persist);
    entry!(t, "RENAME", write, key_mgmt::cmd_rename);
    entry!(t, "RENAMENX", write, key_mgmt::cmd_renamenx);
    entry!(t, "RANDOMKEY", read, key_mgmt::cmd_randomkey);
    entry!(t, "SORT", write, key_mgmt::cmd_sort);

    entry!(t, "SELECT", read, server_cmds::cmd_select);
    entry!(t, "FLUSHDB", write, server_cmds::cmd_flushdb);
    entry!(t, "FLUSHALL", write, server_cmds::cmd_flushall);
    entry!(t, "DBSIZE", read, server_cmds::cmd_dbsize);
    entry!(t, "LASTSAVE", read, server_cmds::cmd_lastsave);

    entry!(t, "CONFIG", write, config_cmds::cmd_config);

    t.insert(
        "MONITOR",
        CommandSpec { flags: CommandFlags::IS_MONITOR, handler: Handler::NoLock(admin_cmds::cmd_monitor) },
    );
    entry!(t, "CLIENT", read, admin_cmds::cmd_client);

    t
}

/// ASCII-only case collapse (§4.2 step 3): always produced upper-case so the
/// table lookup and the lowercased-in-error-messages path never see mixed case.
pub fn normalize_name(raw: &[u8]) -> String {
    raw.iter().map(|b| b.to_ascii_uppercase() as char).collect()
}

/// Invoke `name` against `state`/`client` with no locking of its own -- the
/// caller already has exclusive access (replay) or has already taken the
/// appropriate lock (the `dispatch` below, per handler variant).
pub fn run_command(table: &CommandTable, state: &mut ServerState, client: &mut ClientState, name: &str, argv: &[Bytes]) -> CommandOutcome {
    match table.get(name) {
        None => CommandOutcome::error(Reply::err_unknown_command(argv.first().map(|b| b.as_ref()).unwrap_or(b""))),
        Some(spec) => match spec.handler {
            Handler::Write(f) => f(state, client, argv),
            Handler::Read(f) => f(state, client, argv),
            Handler::NoLock(f) => f(client, argv),
        },
    }
}

pub struct DispatchOutcome {
    pub reply: Vec<u8>,
    pub close: bool,
}

/// Full per-command pipeline for a live connection (§4.2 steps 3-8). The
/// caller (the connection driver) handles step 1 (reading) and step 9
/// (flush boundary).
pub async fn dispatch(server: &Arc<RedisServer>, client: &mut ClientState, raw: Bytes, argv: Vec<Bytes>) -> DispatchOutcome {
    let name = normalize_name(&argv[0]);

    if name == "QUIT" {
        return DispatchOutcome { reply: Reply::ok(), close: true };
    }

    if matches!(name.as_str(), "BGREWRITEAOF" | "BGSAVE" | "SAVE" | "SHUTDOWN") {
        if let Some(reply) = authenticate(&server.config_snapshot().await, client, &name) {
            return DispatchOutcome { reply, close: matches!(client.auth, AuthStage::None) };
        }
        return dispatch_admin_rewrite(server, client, &name, &argv).await;
    }

    let spec = match server.table.get(name.as_str()) {
        Some(spec) => spec,
        None => {
            return DispatchOutcome {
                reply: Reply::err_unknown_command(&argv[0]),
                close: false,
            };
        }
    };

    if let Some(reply) = authenticate(&server.config_snapshot().await, client, &name) {
        return DispatchOutcome { reply, close: matches!(client.auth, AuthStage::None) };
    }

    let outcome = match spec.handler {
        Handler::Write(f) => {
            let mut guard = server.state.write().await;
            let outcome = f(&mut guard, client, &argv);
            if outcome.dirty > 0 && spec.flags.contains(CommandFlags::WRITE) {
                guard.dbs[client.db_index].aof_stage.extend_from_slice(&raw);
            }
            outcome
        }
        Handler::Read(f) => {
            let guard = server.state.read().await;
            f(&guard, client, &argv)
        }
        Handler::NoLock(f) => f(client, &argv),
    };

    client.last_was_error = outcome.error;
    if !spec.flags.contains(CommandFlags::IS_MONITOR) && !outcome.error {
        server.broadcast_monitor(client, &name, &argv);
    }

    DispatchOutcome { reply: outcome.reply, close: false }
}

/// `BGREWRITEAOF`/`BGSAVE`/`SAVE`/`SHUTDOWN` (§4.9) need an owned `Arc` to
/// spawn or await the rewrite, so they bypass the plain fn-pointer handler
/// table and are wired directly into `dispatch` instead.
async fn dispatch_admin_rewrite(server: &Arc<RedisServer>, client: &mut ClientState, name: &str, argv: &[Bytes]) -> DispatchOutcome {
    match name {
        "BGREWRITEAOF" | "BGSAVE" => {
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = aof::rewrite_aof(&server).await {
                    server.post_fatal_io("aof rewrite", &e).await;
                }
            });
            DispatchOutcome { reply: Reply::simple("Background append only file rewriting started"), close: false }
        }
        "SAVE" => match aof::rewrite_aof(server).await {
            Ok(_) => DispatchOutcome { reply: Reply::ok(), close: false },
            Err(e) => DispatchOutcome { reply: Reply::err(&e.to_string()), close: false },
        },
        "SHUTDOWN" => {
            let nosave = argv.get(1).map(|a| a.eq_ignore_ascii_case(b"NOSAVE")).unwrap_or(false);
            if !nosave {
                let _ = aof::rewrite_aof(server).await;
            }
            server.fatal.post(if nosave { FatalError::ShutdownNoSave } else { FatalError::ShutdownSave });
            DispatchOutcome { reply: Vec::new(), close: true }
        }
        _ => {
            client.last_was_error = true;
            DispatchOutcome { reply: Reply::err_unknown_command(name.as_bytes()), close: false }
        }
    }
}

/// Three-state authentication (§4.2.1). Returns `Some(reply)` to
/// short-circuit dispatch, `None` to let the command proceed.
fn authenticate(config: &ServerConfig, client: &mut ClientState, cmd_name: &str) -> Option<Vec<u8>> {
    if client.auth == AuthStage::None {
        if config.is_protected() && !client.peer_is_loopback {
            return Some(protected_mode_denied(&config.app_name));
        }
        client.auth = AuthStage::LoopbackChecked;
    }

    if client.auth == AuthStage::LoopbackChecked && config.requirepass.is_some() && cmd_name != "AUTH" {
        return Some(Reply::err_noauth());
    }

    None
}

fn protected_mode_denied(app_name: &str) -> Vec<u8> {
    let msg = format!(
        "DENIED {app_name} is running in protected mode because protected mode is enabled, \
         no bind address was specified, no authentication password is requested to clients. \
         In this mode connections are only accepted from the loopback interface. \
         If you want to connect from external computers to {app_name} you may adopt one of the \
         following solutions: 1) Just disable protected mode sending the command \
         'CONFIG SET protected-mode no' from the loopback interface by connecting to {app_name} \
         from the same host the server is running, however MAKE SURE {app_name} is not publicly \
         accessible from internet if you do so. Use CONFIG REWRITE to make this change permanent. \
         2) Alternatively you can just disable the protected mode by editing the configuration \
         file, and setting the protected-mode option to 'no', and then restarting the server. \
         3) If you started the server manually just for testing, restart it with the \
         '--protected-mode no' option. 4) Setup a bind address or an authentication password. \
         NOTE: You only need to do one of the above things in order for the server to start \
         accepting connections from the outside."
    );
    Reply::error("DENIED", &msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mixed_case() {
        assert_eq!(normalize_name(b"SeLeCt"), "SELECT");
    }

    #[test]
    fn protected_mode_rejects_remote_without_password() {
        let mut cfg = ServerConfig::default();
        cfg.protected_mode = true;
        let mut client = ClientState::new(1, "1.2.3.4:1".into(), false);
        let reply = authenticate(&cfg, &mut client, "GET");
        assert!(reply.is_some());
        assert!(reply.unwrap().starts_with(b"-DENIED"));
    }

    #[test]
    fn requirepass_blocks_until_auth() {
        let mut cfg = ServerConfig::default();
        cfg.bind = "127.0.0.1".to_string();
        cfg.requirepass = Some("hunter2".to_string());
        let mut client = ClientState::new(1, "127.0.0.1:1".into(), true);
        assert!(authenticate(&cfg, &mut client, "GET").is_some());
        assert!(authenticate(&cfg, &mut client, "AUTH").is_none());
    }
}
