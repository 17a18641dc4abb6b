// List command handlers (§4.4). Concrete representation is `VecDeque<Bytes>`
// per §3; index resolution follows the `ridx` rule (§9) via `util::resolve_index`.

use crate::protocol::Reply;
use crate::server::client_info::ClientState;
use crate::server::ServerState;
use crate::storage::Value;
use bytes::Bytes;
use std::collections::VecDeque;

use super::dispatcher::CommandOutcome;
use super::util::{clamp_index, parse_i64, resolve_index};

fn wrong_type() -> CommandOutcome {
    CommandOutcome::error(Reply::err_wrong_type())
}

/// `LPUSH`/`RPUSH` accept one or more values; each is pushed individually in
/// argument order, so `LPUSH key a b` leaves `b` at the head (§4.4).
fn generic_push(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes], cmd: &str, front: bool) -> CommandOutcome {
    if argv.len() < 3 {
        return CommandOutcome::error(Reply::err_arity(cmd));
    }
    let db = &mut state.dbs[client.db_index];
    let key = &argv[1];
    if let Some(existing) = db.get(key) {
        if !matches!(existing, Value::List(_)) {
            return wrong_type();
        }
    }
    let entry = db.entry_or_insert_with(key, || Value::List(VecDeque::new()));
    let list = entry.as_list_mut().expect("checked above");
    for value in &argv[2..] {
        if front {
            list.push_front(value.clone());
        } else {
            list.push_back(value.clone());
        }
    }
    let len = list.len();
    CommandOutcome::mutated(Reply::integer(len as i64), 1)
}

pub fn cmd_lpush(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    generic_push(state, client, argv, "LPUSH", true)
}

pub fn cmd_rpush(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    generic_push(state, client, argv, "RPUSH", false)
}

pub fn cmd_llen(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("LLEN"));
    }
    let db = &state.dbs[client.db_index];
    match db.get(&argv[1]) {
        None => CommandOutcome::simple(Reply::integer(0)),
        Some(Value::List(l)) => CommandOutcome::simple(Reply::integer(l.len() as i64)),
        Some(_) => wrong_type(),
    }
}

/// Both endpoints are clamped into `[0, len-1]` after negative-resolution;
/// an empty range (start > stop, or an empty list) yields an empty array.
pub fn cmd_lrange(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 4 {
        return CommandOutcome::error(Reply::err_arity("LRANGE"));
    }
    let db = &state.dbs[client.db_index];
    let list = match db.get(&argv[1]) {
        None => return CommandOutcome::simple(Reply::multibulk_header(0)),
        Some(Value::List(l)) => l,
        Some(_) => return wrong_type(),
    };
    let start = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    let stop = match parse_i64(&argv[3]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };

    let len = list.len();
    if len == 0 {
        return CommandOutcome::simple(Reply::multibulk_header(0));
    }
    let start = clamp_index(start, len).min(len as i64 - 1).max(0);
    let mut stop = clamp_index(stop, len);
    if stop >= len as i64 {
        stop = len as i64 - 1;
    }
    if start > stop {
        return CommandOutcome::simple(Reply::multibulk_header(0));
    }

    let slice: Vec<&Bytes> = list.iter().skip(start as usize).take((stop - start + 1) as usize).collect();
    CommandOutcome::simple(Reply::bulk_array(slice))
}

/// Keeps the inclusive subrange `[start, stop]`; an emptied list removes the
/// key (§4.4).
pub fn cmd_ltrim(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 4 {
        return CommandOutcome::error(Reply::err_arity("LTRIM"));
    }
    let start = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    let stop = match parse_i64(&argv[3]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };

    let db = &mut state.dbs[client.db_index];
    let list = match db.get_mut(&argv[1]) {
        None => return CommandOutcome::mutated(Reply::ok(), 0),
        Some(Value::List(l)) => l,
        Some(_) => return wrong_type(),
    };

    let len = list.len();
    if len == 0 {
        return CommandOutcome::mutated(Reply::ok(), 0);
    }
    let count = len as i64;
    let ostart = if start < 0 { start + count } else { start };
    let ostop = if stop < 0 { stop + count } else { stop };

    let out_of_range = |i: i64| i < 0 || i >= count;
    if ostart > ostop || (out_of_range(ostart) && out_of_range(ostop)) {
        list.clear();
    } else {
        let start = ostart.max(0);
        let stop = ostop.min(count - 1);
        let keep: VecDeque<Bytes> = list.iter().skip(start as usize).take((stop - start + 1) as usize).cloned().collect();
        *list = keep;
    }
    db.remove_if_empty(&argv[1]);
    CommandOutcome::mutated(Reply::ok(), 1)
}

/// `count > 0` removes the first `count` matches scanning from the head,
/// `count < 0` scans from the tail, `count == 0` removes every match (§4.4).
pub fn cmd_lrem(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 4 {
        return CommandOutcome::error(Reply::err_arity("LREM"));
    }
    let count = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    let target = &argv[3];

    let db = &mut state.dbs[client.db_index];
    let list = match db.get_mut(&argv[1]) {
        None => return CommandOutcome::simple(Reply::integer(0)),
        Some(Value::List(l)) => l,
        Some(_) => return wrong_type(),
    };

    let mut removed = 0i64;
    if count >= 0 {
        let max = if count == 0 { usize::MAX } else { count as usize };
        let mut kept = VecDeque::with_capacity(list.len());
        for item in list.drain(..) {
            if (removed as usize) < max && &item == target {
                removed += 1;
            } else {
                kept.push_back(item);
            }
        }
        *list = kept;
    } else {
        let max = (-count) as usize;
        let mut kept: VecDeque<Bytes> = VecDeque::with_capacity(list.len());
        for item in list.drain(..).rev() {
            if (removed as usize) < max && &item == target {
                removed += 1;
            } else {
                kept.push_front(item);
            }
        }
        *list = kept;
    }

    db.remove_if_empty(&argv[1]);
    CommandOutcome::mutated(Reply::integer(removed), if removed > 0 { 1 } else { 0 })
}

fn generic_pop(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes], cmd: &str, front: bool) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity(cmd));
    }
    let db = &mut state.dbs[client.db_index];
    let list = match db.get_mut(&argv[1]) {
        None => return CommandOutcome::simple(Reply::null_bulk()),
        Some(Value::List(l)) => l,
        Some(_) => return wrong_type(),
    };
    let popped = if front { list.pop_front() } else { list.pop_back() };
    db.remove_if_empty(&argv[1]);
    match popped {
        Some(v) => CommandOutcome::mutated(Reply::bulk(&v), 1),
        None => CommandOutcome::simple(Reply::null_bulk()),
    }
}

pub fn cmd_lpop(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    generic_pop(state, client, argv, "LPOP", true)
}

pub fn cmd_rpop(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    generic_pop(state, client, argv, "RPOP", false)
}

/// Resolution and bounds-checking are two distinct steps (§4.4 `ridx`): a
/// negative index that resolves to still-negative, or `>= len`, is out of range.
pub fn cmd_lindex(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("LINDEX"));
    }
    let db = &state.dbs[client.db_index];
    let list = match db.get(&argv[1]) {
        None => return CommandOutcome::simple(Reply::null_bulk()),
        Some(Value::List(l)) => l,
        Some(_) => return wrong_type(),
    };
    let idx = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    match resolve_index(idx, list.len()) {
        None => CommandOutcome::simple(Reply::null_bulk()),
        Some(i) => CommandOutcome::simple(Reply::bulk(&list[i])),
    }
}

pub fn cmd_lset(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 4 {
        return CommandOutcome::error(Reply::err_arity("LSET"));
    }
    let idx = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    let db = &mut state.dbs[client.db_index];
    let list = match db.get_mut(&argv[1]) {
        None => return CommandOutcome::error(Reply::err_no_such_key()),
        Some(Value::List(l)) => l,
        Some(_) => return wrong_type(),
    };
    match resolve_index(idx, list.len()) {
        None => CommandOutcome::error(Reply::err_index_out_of_range()),
        Some(i) => {
            list[i] = argv[3].clone();
            CommandOutcome::mutated(Reply::ok(), 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;

    fn state() -> ServerState {
        ServerState::new(ServerConfig { databases: 2, ..ServerConfig::default() })
    }

    fn client() -> ClientState {
        ClientState::new(1, "test".into(), true)
    }

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn rpush_then_lrange() {
        let mut st = state();
        let mut cl = client();
        cmd_rpush(&mut st, &mut cl, &[b("RPUSH"), b("L"), b("a"), b("b"), b("c")]);
        let out = cmd_lrange(&st, &mut cl, &[b("LRANGE"), b("L"), b("0"), b("-1")]);
        assert_eq!(out.reply, Reply::bulk_array(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]));
    }

    #[test]
    fn lpush_prepends_each_in_argument_order() {
        let mut st = state();
        let mut cl = client();
        cmd_lpush(&mut st, &mut cl, &[b("LPUSH"), b("L"), b("a"), b("b")]);
        let out = cmd_lrange(&st, &mut cl, &[b("LRANGE"), b("L"), b("0"), b("-1")]);
        assert_eq!(out.reply, Reply::bulk_array(vec![b"b".to_vec(), b"a".to_vec()]));
    }

    #[test]
    fn lrange_last_element() {
        let mut st = state();
        let mut cl = client();
        cmd_rpush(&mut st, &mut cl, &[b("RPUSH"), b("L"), b("a"), b("b"), b("c")]);
        let out = cmd_lrange(&st, &mut cl, &[b("LRANGE"), b("L"), b("-1"), b("-1")]);
        assert_eq!(out.reply, Reply::bulk_array(vec![b"c".to_vec()]));
    }

    #[test]
    fn lrem_positive_count_from_head() {
        let mut st = state();
        let mut cl = client();
        cmd_rpush(&mut st, &mut cl, &[b("RPUSH"), b("L"), b("a"), b("b"), b("a"), b("a")]);
        let out = cmd_lrem(&mut st, &mut cl, &[b("LREM"), b("L"), b("2"), b("a")]);
        assert_eq!(out.reply, Reply::integer(2));
        let out = cmd_lrange(&st, &mut cl, &[b("LRANGE"), b("L"), b("0"), b("-1")]);
        assert_eq!(out.reply, Reply::bulk_array(vec![b"b".to_vec(), b"a".to_vec()]));
    }

    #[test]
    fn ltrim_emptying_removes_key() {
        let mut st = state();
        let mut cl = client();
        cmd_rpush(&mut st, &mut cl, &[b("RPUSH"), b("L"), b("a")]);
        cmd_ltrim(&mut st, &mut cl, &[b("LTRIM"), b("L"), b("5"), b("10")]);
        let out = cmd_llen(&st, &mut cl, &[b("LLEN"), b("L")]);
        assert_eq!(out.reply, Reply::integer(0));
    }

    #[test]
    fn lpop_emptying_removes_key() {
        let mut st = state();
        let mut cl = client();
        cmd_rpush(&mut st, &mut cl, &[b("RPUSH"), b("L"), b("only")]);
        cmd_lpop(&mut st, &mut cl, &[b("LPOP"), b("L")]);
        let out = cmd_llen(&st, &mut cl, &[b("LLEN"), b("L")]);
        assert_eq!(out.reply, Reply::integer(0));
    }

    #[test]
    fn lindex_out_of_range_is_null() {
        let mut st = state();
        let mut cl = client();
        cmd_rpush(&mut st, &mut cl, &[b("RPUSH"), b("L"), b("a")]);
        let out = cmd_lindex(&st, &mut cl, &[b("LINDEX"), b("L"), b("5")]);
        assert_eq!(out.reply, Reply::null_bulk());
    }

    #[test]
    fn lset_out_of_range_errors() {
        let mut st = state();
        let mut cl = client();
        cmd_rpush(&mut st, &mut cl, &[b("RPUSH"), b("L"), b("a")]);
        let out = cmd_lset(&mut st, &mut cl, &[b("LSET"), b("L"), b("-5"), b("x")]);
        assert!(out.error);
    }

    #[test]
    fn type_error_on_non_list() {
        let mut st = state();
        let mut cl = client();
        let db = &mut st.dbs[cl.db_index];
        db.set(b("strkey"), Value::Str(b("v")));
        let out = cmd_lpush(&mut st, &mut cl, &[b("LPUSH"), b("strkey"), b("x")]);
        assert!(out.error);
    }
}
