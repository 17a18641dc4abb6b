// String/integer command handlers (§4.6).

use crate::protocol::Reply;
use crate::server::client_info::ClientState;
use crate::server::ServerState;
use crate::storage::Value;
use bytes::Bytes;
use std::time::{Duration, Instant};

use super::dispatcher::CommandOutcome;
use super::util::parse_i64;

fn wrong_type() -> CommandOutcome {
    CommandOutcome::error(Reply::err_wrong_type())
}

pub fn cmd_get(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("GET"));
    }
    let db = &state.dbs[client.db_index];
    match db.get(&argv[1]) {
        None => CommandOutcome::simple(Reply::null_bulk()),
        Some(Value::Str(v)) => CommandOutcome::simple(Reply::bulk(v)),
        Some(_) => wrong_type(),
    }
}

enum Presence {
    Nx,
    Xx,
    Any,
}

pub fn cmd_set(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 3 {
        return CommandOutcome::error(Reply::err_arity("SET"));
    }
    let key = argv[1].clone();
    let value = argv[2].clone();

    let mut presence = Presence::Any;
    let mut deadline: Option<Instant> = None;
    let mut has_ex_or_px = false;

    let mut i = 3;
    while i < argv.len() {
        let opt = argv[i].to_ascii_uppercase();
        match opt.as_slice() {
            b"NX" => {
                if matches!(presence, Presence::Xx) {
                    return CommandOutcome::error(Reply::err_syntax());
                }
                presence = Presence::Nx;
                i += 1;
            }
            b"XX" => {
                if matches!(presence, Presence::Nx) {
                    return CommandOutcome::error(Reply::err_syntax());
                }
                presence = Presence::Xx;
                i += 1;
            }
            b"EX" | b"PX" => {
                if has_ex_or_px || i + 1 >= argv.len() {
                    return CommandOutcome::error(Reply::err_syntax());
                }
                let n = match parse_i64(&argv[i + 1]) {
                    Ok(n) if n > 0 => n,
                    _ => return CommandOutcome::error(Reply::err_not_integer()),
                };
                let is_ex = opt.as_slice() == b"EX";
                deadline = Some(Instant::now() + if is_ex { Duration::from_secs(n as u64) } else { Duration::from_millis(n as u64) });
                has_ex_or_px = true;
                i += 2;
            }
            _ => return CommandOutcome::error(Reply::err_syntax()),
        }
    }

    let db = &mut state.dbs[client.db_index];
    let exists = db.exists(&key);
    match presence {
        Presence::Nx if exists => return CommandOutcome::simple(Reply::null_bulk()),
        Presence::Xx if !exists => return CommandOutcome::simple(Reply::null_bulk()),
        _ => {}
    }

    match deadline {
        Some(d) => db.set_with_expiry(key, Value::Str(value), d),
        None => db.set(key, Value::Str(value)),
    }
    CommandOutcome::mutated(Reply::ok(), 1)
}

pub fn cmd_append(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("APPEND"));
    }
    let db = &mut state.dbs[client.db_index];
    match db.get_mut(&argv[1]) {
        None => {
            let len = argv[2].len();
            db.set(argv[1].clone(), Value::Str(argv[2].clone()));
            CommandOutcome::mutated(Reply::integer(len as i64), 1)
        }
        Some(Value::Str(v)) => {
            let mut buf = Vec::with_capacity(v.len() + argv[2].len());
            buf.extend_from_slice(v);
            buf.extend_from_slice(&argv[2]);
            let len = buf.len();
            *v = Bytes::from(buf);
            CommandOutcome::mutated(Reply::integer(len as i64), 1)
        }
        Some(_) => wrong_type(),
    }
}

pub fn cmd_getset(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("GETSET"));
    }
    let db = &mut state.dbs[client.db_index];
    let old = match db.get(&argv[1]) {
        None => Reply::null_bulk(),
        Some(Value::Str(v)) => Reply::bulk(v),
        Some(_) => return wrong_type(),
    };
    db.set(argv[1].clone(), Value::Str(argv[2].clone()));
    CommandOutcome::mutated(old, 1)
}

pub fn cmd_setnx(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("SETNX"));
    }
    let db = &mut state.dbs[client.db_index];
    if db.exists(&argv[1]) {
        return CommandOutcome::simple(Reply::integer(0));
    }
    db.set(argv[1].clone(), Value::Str(argv[2].clone()));
    CommandOutcome::mutated(Reply::integer(1), 1)
}

pub fn cmd_mset(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 3 || argv.len() % 2 == 0 {
        return CommandOutcome::error(Reply::err_arity("MSET"));
    }
    let db = &mut state.dbs[client.db_index];
    let mut pairs = argv[1..].chunks(2);
    while let Some([k, v]) = pairs.next() {
        db.set(k.clone(), Value::Str(v.clone()));
    }
    CommandOutcome::mutated(Reply::ok(), 1)
}

pub fn cmd_msetnx(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 3 || argv.len() % 2 == 0 {
        return CommandOutcome::error(Reply::err_arity("MSETNX"));
    }
    let db = &mut state.dbs[client.db_index];
    let any_exists = argv[1..].chunks(2).any(|pair| db.exists(&pair[0]));
    if any_exists {
        return CommandOutcome::simple(Reply::integer(0));
    }
    let mut pairs = argv[1..].chunks(2);
    while let Some([k, v]) = pairs.next() {
        db.set(k.clone(), Value::Str(v.clone()));
    }
    CommandOutcome::mutated(Reply::integer(1), 1)
}

pub fn cmd_mget(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("MGET"));
    }
    let db = &state.dbs[client.db_index];
    let mut buf = Reply::multibulk_header(argv.len() - 1);
    for key in &argv[1..] {
        match db.get(key) {
            Some(Value::Str(v)) => buf.extend_from_slice(&Reply::bulk(v)),
            _ => buf.extend_from_slice(&Reply::null_bulk()),
        }
    }
    CommandOutcome::simple(buf)
}

/// Single formula for every increment/decrement command (§9 decision): the
/// absent-key case is `0 + delta`, never a hardcoded constant.
fn generic_incr_by(state: &mut ServerState, client: &mut ClientState, key: &Bytes, delta: i64, cmd: &str) -> CommandOutcome {
    let db = &mut state.dbs[client.db_index];
    let current = match db.get(key) {
        None => 0i64,
        Some(Value::Str(v)) => match std::str::from_utf8(v).ok().and_then(|s| s.parse::<i64>().ok()) {
            Some(n) => n,
            None => return CommandOutcome::error(Reply::err_not_integer()),
        },
        Some(_) => return wrong_type(),
    };
    let new_value = match current.checked_add(delta) {
        Some(n) => n,
        None => return CommandOutcome::error(Reply::err_not_integer()),
    };
    db.set(key.clone(), Value::Str(Bytes::from(new_value.to_string())));
    let _ = cmd;
    CommandOutcome::mutated(Reply::integer(new_value), 1)
}

pub fn cmd_incr(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("INCR"));
    }
    generic_incr_by(state, client, &argv[1], 1, "INCR")
}

pub fn cmd_decr(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("DECR"));
    }
    generic_incr_by(state, client, &argv[1], -1, "DECR")
}

pub fn cmd_incrby(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("INCRBY"));
    }
    let delta = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    generic_incr_by(state, client, &argv[1], delta, "INCRBY")
}

pub fn cmd_decrby(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("DECRBY"));
    }
    let delta = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    let delta = match delta.checked_neg() {
        Some(n) => n,
        None => return CommandOutcome::error(Reply::err_not_integer()),
    };
    generic_incr_by(state, client, &argv[1], delta, "DECRBY")
}

/// `end` is inclusive; the scan stops at `i > end OR i >= len(s)` (§9,
/// preserved verbatim from the source's clamp behavior).
pub fn cmd_bitcount(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 1 + 1 && argv.len() != 1 + 3 {
        return CommandOutcome::error(Reply::err_arity("BITCOUNT"));
    }
    let db = &state.dbs[client.db_index];
    let s: &[u8] = match db.get(&argv[1]) {
        None => return CommandOutcome::simple(Reply::integer(0)),
        Some(Value::Str(v)) => v,
        Some(_) => return wrong_type(),
    };

    let (start, end) = if argv.len() == 4 {
        let start = match parse_i64(&argv[2]) {
            Ok(n) => n,
            Err(reply) => return CommandOutcome::error(reply),
        };
        let end = match parse_i64(&argv[3]) {
            Ok(n) => n,
            Err(reply) => return CommandOutcome::error(reply),
        };
        (start, end)
    } else {
        (0, s.len() as i64 - 1)
    };

    let len = s.len() as i64;
    let mut start = if start < 0 { (start + len).max(0) } else { start };
    let end = if end < 0 { end + len } else { end };
    if start >= len || end < 0 || start > end {
        return CommandOutcome::simple(Reply::integer(0));
    }
    if start < 0 {
        start = 0;
    }

    let mut count = 0i64;
    let mut i = start;
    while i <= end && i < len {
        count += s[i as usize].count_ones() as i64;
        i += 1;
    }
    CommandOutcome::simple(Reply::integer(count))
}
