// Set command handlers (§4.5). Concrete representation is `HashSet<Bytes>`
// per §3.

use crate::protocol::Reply;
use crate::server::client_info::ClientState;
use crate::server::ServerState;
use crate::storage::Value;
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use super::dispatcher::CommandOutcome;
use super::util::parse_i64;

fn wrong_type() -> CommandOutcome {
    CommandOutcome::error(Reply::err_wrong_type())
}

/// Reads `key` as a set, erroring on a type mismatch; absent keys read as an
/// empty set (used by the variadic `SDIFF`/`SINTER`/`SUNION` family).
fn read_set(state: &ServerState, db_index: usize, key: &Bytes) -> Result<HashSet<Bytes>, CommandOutcome> {
    match state.dbs[db_index].get(key) {
        None => Ok(HashSet::new()),
        Some(Value::Set(s)) => Ok(s.clone()),
        Some(_) => Err(wrong_type()),
    }
}

/// Members attempted independently; already-present adds don't count and
/// don't bump `dirty` (§4.5).
pub fn cmd_sadd(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 3 {
        return CommandOutcome::error(Reply::err_arity("SADD"));
    }
    let db = &mut state.dbs[client.db_index];
    let key = &argv[1];
    if let Some(existing) = db.get(key) {
        if !matches!(existing, Value::Set(_)) {
            return wrong_type();
        }
    }
    let entry = db.entry_or_insert_with(key, || Value::Set(HashSet::new()));
    let set = entry.as_set_mut().expect("checked above");
    let mut added = 0i64;
    for member in &argv[2..] {
        if set.insert(member.clone()) {
            added += 1;
        }
    }
    CommandOutcome::mutated(Reply::integer(added), if added > 0 { 1 } else { 0 })
}

pub fn cmd_srem(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 3 {
        return CommandOutcome::error(Reply::err_arity("SREM"));
    }
    let db = &mut state.dbs[client.db_index];
    let set = match db.get_mut(&argv[1]) {
        None => return CommandOutcome::simple(Reply::integer(0)),
        Some(Value::Set(s)) => s,
        Some(_) => return wrong_type(),
    };
    let mut removed = 0i64;
    for member in &argv[2..] {
        if set.remove(member) {
            removed += 1;
        }
    }
    db.remove_if_empty(&argv[1]);
    CommandOutcome::mutated(Reply::integer(removed), if removed > 0 { 1 } else { 0 })
}

pub fn cmd_scard(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("SCARD"));
    }
    let db = &state.dbs[client.db_index];
    match db.get(&argv[1]) {
        None => CommandOutcome::simple(Reply::integer(0)),
        Some(Value::Set(s)) => CommandOutcome::simple(Reply::integer(s.len() as i64)),
        Some(_) => wrong_type(),
    }
}

pub fn cmd_sismember(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("SISMEMBER"));
    }
    let db = &state.dbs[client.db_index];
    match db.get(&argv[1]) {
        None => CommandOutcome::simple(Reply::integer(0)),
        Some(Value::Set(s)) => CommandOutcome::simple(Reply::integer(s.contains(&argv[2]) as i64)),
        Some(_) => wrong_type(),
    }
}

pub fn cmd_smembers(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("SMEMBERS"));
    }
    let db = &state.dbs[client.db_index];
    match db.get(&argv[1]) {
        None => CommandOutcome::simple(Reply::multibulk_header(0)),
        Some(Value::Set(s)) => CommandOutcome::simple(Reply::bulk_array(s.iter().collect::<Vec<_>>())),
        Some(_) => wrong_type(),
    }
}

pub fn cmd_smove(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 4 {
        return CommandOutcome::error(Reply::err_arity("SMOVE"));
    }
    let (src, dst, member) = (&argv[1], &argv[2], &argv[3]);
    let db = &mut state.dbs[client.db_index];

    if let Some(existing) = db.get(dst) {
        if !matches!(existing, Value::Set(_)) {
            return wrong_type();
        }
    }
    let removed = match db.get_mut(src) {
        None => return CommandOutcome::simple(Reply::integer(0)),
        Some(Value::Set(s)) => s.remove(member),
        Some(_) => return wrong_type(),
    };
    if !removed {
        return CommandOutcome::simple(Reply::integer(0));
    }
    db.remove_if_empty(src);
    let entry = db.entry_or_insert_with(dst, || Value::Set(HashSet::new()));
    entry.as_set_mut().expect("checked above").insert(member.clone());
    CommandOutcome::mutated(Reply::integer(1), 1)
}

/// `SPOP [count]`: without `count`, pops and returns one member as a bulk
/// string (or null bulk if absent/empty); with `count`, returns a multibulk
/// array of up to `count` distinct members, removing each.
pub fn cmd_spop(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 && argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("SPOP"));
    }
    let count = if argv.len() == 3 {
        match parse_i64(&argv[2]) {
            Ok(n) if n >= 0 => Some(n as usize),
            Ok(_) => return CommandOutcome::error(Reply::err("index out of range")),
            Err(reply) => return CommandOutcome::error(reply),
        }
    } else {
        None
    };

    let db = &mut state.dbs[client.db_index];
    let set = match db.get_mut(&argv[1]) {
        None => {
            return CommandOutcome::simple(if count.is_some() { Reply::multibulk_header(0) } else { Reply::null_bulk() });
        }
        Some(Value::Set(s)) => s,
        Some(_) => return wrong_type(),
    };

    let mut rng = rand::thread_rng();
    match count {
        None => {
            let chosen = set.iter().next().cloned();
            match chosen {
                None => CommandOutcome::simple(Reply::null_bulk()),
                Some(member) => {
                    set.remove(&member);
                    db.remove_if_empty(&argv[1]);
                    CommandOutcome::mutated(Reply::bulk(&member), 1)
                }
            }
        }
        Some(n) => {
            let mut members: Vec<Bytes> = set.iter().cloned().collect();
            members.shuffle(&mut rng);
            members.truncate(n);
            for m in &members {
                set.remove(m);
            }
            let dirty = if members.is_empty() { 0 } else { 1 };
            db.remove_if_empty(&argv[1]);
            CommandOutcome::mutated(Reply::bulk_array(members), dirty)
        }
    }
}

/// `SRANDMEMBER [count]`: negative `count` permits repeats (sampling with
/// replacement); positive `count` returns distinct members up to set size (§4.5).
pub fn cmd_srandmember(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 && argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("SRANDMEMBER"));
    }
    let db = &state.dbs[client.db_index];
    let set = match db.get(&argv[1]) {
        None => {
            return CommandOutcome::simple(if argv.len() == 3 { Reply::multibulk_header(0) } else { Reply::null_bulk() });
        }
        Some(Value::Set(s)) => s,
        Some(_) => return wrong_type(),
    };

    if argv.len() == 2 {
        if set.is_empty() {
            return CommandOutcome::simple(Reply::null_bulk());
        }
        let mut rng = rand::thread_rng();
        let pick = set.iter().nth(rng.gen_range(0..set.len())).expect("checked non-empty above");
        return CommandOutcome::simple(Reply::bulk(pick));
    }

    let count = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    let members: Vec<&Bytes> = set.iter().collect();
    if members.is_empty() {
        return CommandOutcome::simple(Reply::multibulk_header(0));
    }

    let mut rng = rand::thread_rng();
    let picked: Vec<Bytes> = if count < 0 {
        let n = (-count) as usize;
        (0..n).map(|_| members[rng.gen_range(0..members.len())].clone()).collect()
    } else {
        let n = (count as usize).min(members.len());
        let mut idx: Vec<usize> = (0..members.len()).collect();
        idx.shuffle(&mut rng);
        idx.into_iter().take(n).map(|i| members[i].clone()).collect()
    };
    CommandOutcome::simple(Reply::bulk_array(picked))
}

fn generic_set_op(state: &ServerState, db_index: usize, argv: &[Bytes], op: fn(HashSet<Bytes>, &HashSet<Bytes>) -> HashSet<Bytes>) -> Result<HashSet<Bytes>, CommandOutcome> {
    let mut acc = read_set(state, db_index, &argv[1])?;
    for key in &argv[2..] {
        let next = read_set(state, db_index, key)?;
        acc = op(acc, &next);
    }
    Ok(acc)
}

fn diff_op(mut acc: HashSet<Bytes>, other: &HashSet<Bytes>) -> HashSet<Bytes> {
    acc.retain(|m| !other.contains(m));
    acc
}

fn inter_op(acc: HashSet<Bytes>, other: &HashSet<Bytes>) -> HashSet<Bytes> {
    acc.into_iter().filter(|m| other.contains(m)).collect()
}

fn union_op(mut acc: HashSet<Bytes>, other: &HashSet<Bytes>) -> HashSet<Bytes> {
    acc.extend(other.iter().cloned());
    acc
}

pub fn cmd_sdiff(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("SDIFF"));
    }
    match generic_set_op(state, client.db_index, argv, diff_op) {
        Ok(result) => CommandOutcome::simple(Reply::bulk_array(result.iter().collect::<Vec<_>>())),
        Err(out) => out,
    }
}

pub fn cmd_sinter(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("SINTER"));
    }
    match generic_set_op(state, client.db_index, argv, inter_op) {
        Ok(result) => CommandOutcome::simple(Reply::bulk_array(result.iter().collect::<Vec<_>>())),
        Err(out) => out,
    }
}

pub fn cmd_sunion(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("SUNION"));
    }
    match generic_set_op(state, client.db_index, argv, union_op) {
        Ok(result) => CommandOutcome::simple(Reply::bulk_array(result.iter().collect::<Vec<_>>())),
        Err(out) => out,
    }
}

/// Shared body for `{SDIFF,SINTER,SUNION}STORE`: compute the result against
/// `argv[2..]`, then store it into `argv[1]`, deleting it if the result is
/// empty (§4.5). Returns the cardinality.
fn generic_store(
    state: &mut ServerState,
    client: &mut ClientState,
    argv: &[Bytes],
    cmd: &str,
    op: fn(HashSet<Bytes>, &HashSet<Bytes>) -> HashSet<Bytes>,
) -> CommandOutcome {
    if argv.len() < 3 {
        return CommandOutcome::error(Reply::err_arity(cmd));
    }
    let dst = argv[1].clone();
    let result = {
        let state_ref: &ServerState = state;
        let mut acc = match read_set(state_ref, client.db_index, &argv[2]) {
            Ok(s) => s,
            Err(out) => return out,
        };
        for key in &argv[3..] {
            let next = match read_set(state_ref, client.db_index, key) {
                Ok(s) => s,
                Err(out) => return out,
            };
            acc = op(acc, &next);
        }
        acc
    };

    let db = &mut state.dbs[client.db_index];
    let card = result.len();
    if result.is_empty() {
        db.del(&dst);
    } else {
        db.set(dst, Value::Set(result));
    }
    CommandOutcome::mutated(Reply::integer(card as i64), 1)
}

pub fn cmd_sdiffstore(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    generic_store(state, client, argv, "SDIFFSTORE", diff_op)
}

pub fn cmd_sinterstore(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    generic_store(state, client, argv, "SINTERSTORE", inter_op)
}

pub fn cmd_sunionstore(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    generic_store(state, client, argv, "SUNIONSTORE", union_op)
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
    fn sadd_dedupes_and_counts_new_only() {
        let mut st = state();
        let mut cl = client();
        let out = cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("s"), b("a"), b("b"), b("a")]);
        assert_eq!(out.reply, Reply::integer(2));
        let out = cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("s"), b("a")]);
        assert_eq!(out.reply, Reply::integer(0));
        assert_eq!(out.dirty, 0);
    }

    #[test]
    fn srem_emptying_removes_key() {
        let mut st = state();
        let mut cl = client();
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("s"), b("a")]);
        cmd_srem(&mut st, &mut cl, &[b("SREM"), b("s"), b("a")]);
        let out = cmd_scard(&st, &mut cl, &[b("SCARD"), b("s")]);
        assert_eq!(out.reply, Reply::integer(0));
    }

    #[test]
    fn smove_moves_member_between_sets() {
        let mut st = state();
        let mut cl = client();
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("src"), b("m")]);
        let out = cmd_smove(&mut st, &mut cl, &[b("SMOVE"), b("src"), b("dst"), b("m")]);
        assert_eq!(out.reply, Reply::integer(1));
        assert_eq!(cmd_sismember(&st, &mut cl, &[b("SISMEMBER"), b("dst"), b("m")]).reply, Reply::integer(1));
        assert_eq!(cmd_sismember(&st, &mut cl, &[b("SISMEMBER"), b("src"), b("m")]).reply, Reply::integer(0));
    }

    #[test]
    fn sdiff_excludes_members_in_subsequent_sets() {
        let mut st = state();
        let mut cl = client();
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("a"), b("x"), b("y"), b("z")]);
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("b"), b("y")]);
        let out = cmd_sdiff(&st, &mut cl, &[b("SDIFF"), b("a"), b("b")]);
        assert!(out.reply.starts_with(b"*2\r\n"));
    }

    #[test]
    fn sinterstore_deletes_dst_when_empty() {
        let mut st = state();
        let mut cl = client();
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("a"), b("x")]);
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("b"), b("y")]);
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("dst"), b("leftover")]);
        let out = cmd_sinterstore(&mut st, &mut cl, &[b("SINTERSTORE"), b("dst"), b("a"), b("b")]);
        assert_eq!(out.reply, Reply::integer(0));
        assert_eq!(cmd_scard(&st, &mut cl, &[b("SCARD"), b("dst")]).reply, Reply::integer(0));
    }

    #[test]
    fn spop_with_count_removes_distinct_members() {
        let mut st = state();
        let mut cl = client();
        cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("s"), b("a"), b("b"), b("c")]);
        let out = cmd_spop(&mut st, &mut cl, &[b("SPOP"), b("s"), b("2")]);
        assert!(out.reply.starts_with(b"*2\r\n"));
        assert_eq!(cmd_scard(&st, &mut cl, &[b("SCARD"), b("s")]).reply, Reply::integer(1));
    }

    #[test]
    fn type_error_on_non_set() {
        let mut st = state();
        let mut cl = client();
        let db = &mut st.dbs[cl.db_index];
        db.set(b("strkey"), Value::Str(b("v")));
        let out = cmd_sadd(&mut st, &mut cl, &[b("SADD"), b("strkey"), b("x")]);
        assert!(out.error);
    }
}
