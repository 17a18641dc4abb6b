// Server administration commands (§4.9): DB selection, flushing, sizing, and
// `LASTSAVE`. `BGREWRITEAOF`/`BGSAVE`/`SAVE`/`SHUTDOWN` are wired directly
// into the dispatcher (they need an owned `Arc<RedisServer>`) rather than
// living here -- see `dispatcher::dispatch_admin_rewrite`.

use crate::protocol::Reply;
use crate::server::client_info::ClientState;
use crate::server::ServerState;
use bytes::Bytes;

use super::dispatcher::CommandOutcome;

pub fn cmd_select(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("SELECT"));
    }
    let idx = match std::str::from_utf8(&argv[1]).ok().and_then(|s| s.parse::<usize>().ok()) {
        Some(n) if n < state.dbs.len() => n,
        _ => return CommandOutcome::error(Reply::err("DB index is out of range")),
    };
    client.db_index = idx;
    CommandOutcome::simple(Reply::ok())
}

pub fn cmd_flushdb(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 1 {
        return CommandOutcome::error(Reply::err_arity("FLUSHDB"));
    }
    state.dbs[client.db_index].clear();
    CommandOutcome::mutated(Reply::ok(), 1)
}

pub fn cmd_flushall(state: &mut ServerState, _client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 1 {
        return CommandOutcome::error(Reply::err_arity("FLUSHALL"));
    }
    for db in state.dbs.iter_mut() {
        db.clear();
    }
    CommandOutcome::mutated(Reply::ok(), 1)
}

pub fn cmd_dbsize(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 1 {
        return CommandOutcome::error(Reply::err_arity("DBSIZE"));
    }
    CommandOutcome::simple(Reply::integer(state.dbs[client.db_index].live_len() as i64))
}

pub fn cmd_lastsave(state: &ServerState, _client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 1 {
        return CommandOutcome::error(Reply::err_arity("LASTSAVE"));
    }
    let mtime = state.aof.as_ref().map(|a| a.mtime_unix()).unwrap_or(0);
    CommandOutcome::simple(Reply::integer(mtime as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use crate::storage::Value;

    fn state() -> ServerState {
        ServerState::new(ServerConfig { databases: 4, ..ServerConfig::default() })
    }

    fn client() -> ClientState {
        ClientState::new(1, "test".into(), true)
    }

    #[test]
    fn select_switches_active_db() {
        let st = state();
        let mut cl = client();
        let out = cmd_select(&st, &mut cl, &[Bytes::from_static(b"SELECT"), Bytes::from_static(b"2")]);
        assert_eq!(out.reply, Reply::ok());
        assert_eq!(cl.db_index, 2);
    }

    #[test]
    fn select_out_of_range_errors() {
        let st = state();
        let mut cl = client();
        let out = cmd_select(&st, &mut cl, &[Bytes::from_static(b"SELECT"), Bytes::from_static(b"99")]);
        assert!(out.error);
    }

    #[test]
    fn flushdb_clears_only_active_db() {
        let mut st = state();
        let mut cl = client();
        st.dbs[0].set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")));
        st.dbs[1].set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")));
        cl.db_index = 0;
        cmd_flushdb(&mut st, &mut cl, &[Bytes::from_static(b"FLUSHDB")]);
        assert_eq!(st.dbs[0].live_len(), 0);
        assert_eq!(st.dbs[1].live_len(), 1);
    }

    #[test]
    fn flushall_clears_every_db() {
        let mut st = state();
        let mut cl = client();
        st.dbs[0].set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")));
        st.dbs[1].set(Bytes::from_static(b"k"), Value::Str(Bytes::from_static(b"v")));
        cmd_flushall(&mut st, &mut cl, &[Bytes::from_static(b"FLUSHALL")]);
        assert_eq!(st.dbs[0].live_len(), 0);
        assert_eq!(st.dbs[1].live_len(), 0);
    }
}
