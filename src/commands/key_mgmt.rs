// Key-space commands (§4.3, §4.3.1, §4.9's `SORT`): pattern-matched listing,
// existence/deletion, type introspection, expiry, and the `RENAME` family
// supplemented from `original_source/server/keys.go` (§4.3.1).

use crate::protocol::Reply;
use crate::server::client_info::ClientState;
use crate::server::ServerState;
use crate::storage::db::TtlStatus;
use crate::storage::Value;
use bytes::Bytes;
use rand::Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::dispatcher::CommandOutcome;
use super::util::parse_i64;

fn wrong_type() -> CommandOutcome {
    CommandOutcome::error(Reply::err_wrong_type())
}

pub fn cmd_keys(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("KEYS"));
    }
    let db = &state.dbs[client.db_index];
    let keys = db.keys_matching(&argv[1]);
    CommandOutcome::simple(Reply::bulk_array(keys))
}

pub fn cmd_exists(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("EXISTS"));
    }
    let db = &state.dbs[client.db_index];
    let count = argv[1..].iter().filter(|k| db.exists(k)).count();
    CommandOutcome::simple(Reply::integer(count as i64))
}

pub fn cmd_del(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("DEL"));
    }
    let db = &mut state.dbs[client.db_index];
    let removed = argv[1..].iter().filter(|k| db.del(k)).count();
    CommandOutcome::mutated(Reply::integer(removed as i64), if removed > 0 { 1 } else { 0 })
}

pub fn cmd_type(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("TYPE"));
    }
    let db = &state.dbs[client.db_index];
    CommandOutcome::simple(Reply::simple(db.get_type(&argv[1])))
}

pub fn cmd_expire(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("EXPIRE"));
    }
    let secs = match parse_i64(&argv[2]) {
        Ok(n) => n,
        Err(reply) => return CommandOutcome::error(reply),
    };
    let db = &mut state.dbs[client.db_index];
    let deadline = if secs <= 0 {
        Instant::now()
    } else {
        Instant::now() + Duration::from_secs(secs as u64)
    };
    let ok = db.expire(&argv[1], deadline);
    CommandOutcome::mutated(Reply::integer(ok as i64), if ok { 1 } else { 0 })
}

pub fn cmd_ttl(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("TTL"));
    }
    let db = &state.dbs[client.db_index];
    let secs = match db.ttl(&argv[1]) {
        TtlStatus::NoKey => -2,
        TtlStatus::NoExpiry => -1,
        TtlStatus::Remaining(d) => (d + Duration::from_millis(999)).as_secs() as i64,
    };
    CommandOutcome::simple(Reply::integer(secs))
}

pub fn cmd_persist(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 2 {
        return CommandOutcome::error(Reply::err_arity("PERSIST"));
    }
    let db = &mut state.dbs[client.db_index];
    let had_expiry = db.persist(&argv[1]);
    CommandOutcome::mutated(Reply::integer(had_expiry as i64), if had_expiry { 1 } else { 0 })
}

/// Plain `get`+`del`+`set`: any existing expiry on `src` is dropped, matching
/// `original_source/server/keys.go` (§4.3.1).
pub fn cmd_rename(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("RENAME"));
    }
    let db = &mut state.dbs[client.db_index];
    let value = match db.get(&argv[1]) {
        None => return CommandOutcome::error(Reply::err_no_such_key()),
        Some(v) => v.clone(),
    };
    db.del(&argv[1]);
    db.set(argv[2].clone(), value);
    CommandOutcome::mutated(Reply::ok(), 1)
}

pub fn cmd_renamenx(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 3 {
        return CommandOutcome::error(Reply::err_arity("RENAMENX"));
    }
    let db = &mut state.dbs[client.db_index];
    let value = match db.get(&argv[1]) {
        None => return CommandOutcome::error(Reply::err_no_such_key()),
        Some(v) => v.clone(),
    };
    if db.exists(&argv[2]) {
        return CommandOutcome::simple(Reply::integer(0));
    }
    db.del(&argv[1]);
    db.set(argv[2].clone(), value);
    CommandOutcome::mutated(Reply::integer(1), 1)
}

/// Draws uniformly over the live key set via `rand` (§4.3.1 implementation
/// note: a strict improvement over the source's map-iteration-order pick,
/// with no observable contract change).
pub fn cmd_randomkey(state: &ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() != 1 {
        return CommandOutcome::error(Reply::err_arity("RANDOMKEY"));
    }
    let db = &state.dbs[client.db_index];
    let keys = db.keys_matching(b"*");
    if keys.is_empty() {
        return CommandOutcome::simple(Reply::null_bulk());
    }
    let idx = rand::thread_rng().gen_range(0..keys.len());
    CommandOutcome::simple(Reply::bulk(&keys[idx]))
}

enum SortKey {
    Num(f64),
    Alpha(Bytes),
    Missing,
}

fn by_pattern_lookup(state: &ServerState, db_index: usize, pattern: &[u8], member: &Bytes) -> Option<Bytes> {
    let lookup_key = substitute(pattern, member);
    match state.dbs[db_index].get(&lookup_key) {
        Some(Value::Str(v)) => Some(v.clone()),
        _ => None,
    }
}

fn substitute(pattern: &[u8], member: &Bytes) -> Bytes {
    let pos = pattern.iter().position(|&b| b == b'*');
    match pos {
        None => Bytes::copy_from_slice(pattern),
        Some(i) => {
            let mut out = Vec::with_capacity(pattern.len() + member.len());
            out.extend_from_slice(&pattern[..i]);
            out.extend_from_slice(member);
            out.extend_from_slice(&pattern[i + 1..]);
            Bytes::from(out)
        }
    }
}

/// `SORT key [BY pat] [LIMIT off cnt] [GET pat ...] [ASC|DESC] [ALPHA] [STORE dst]` (§4.3).
pub fn cmd_sort(state: &mut ServerState, client: &mut ClientState, argv: &[Bytes]) -> CommandOutcome {
    if argv.len() < 2 {
        return CommandOutcome::error(Reply::err_arity("SORT"));
    }

    let mut by_pattern: Option<Bytes> = None;
    let mut limit: Option<(i64, i64)> = None;
    let mut get_patterns: Vec<Bytes> = Vec::new();
    let mut descending = false;
    let mut alpha = false;
    let mut store: Option<Bytes> = None;

    let mut i = 2;
    while i < argv.len() {
        let opt = argv[i].to_ascii_uppercase();
        match opt.as_slice() {
            b"BY" => {
                if i + 1 >= argv.len() {
                    return CommandOutcome::error(Reply::err_syntax());
                }
                by_pattern = Some(argv[i + 1].clone());
                i += 2;
            }
            b"LIMIT" => {
                if i + 2 >= argv.len() {
                    return CommandOutcome::error(Reply::err_syntax());
                }
                let off = match parse_i64(&argv[i + 1]) {
                    Ok(n) => n,
                    Err(reply) => return CommandOutcome::error(reply),
                };
                let cnt = match parse_i64(&argv[i + 2]) {
                    Ok(n) => n,
                    Err(reply) => return CommandOutcome::error(reply),
                };
                limit = Some((off, cnt));
                i += 3;
            }
            b"GET" => {
                if i + 1 >= argv.len() {
                    return CommandOutcome::error(Reply::err_syntax());
                }
                get_patterns.push(argv[i + 1].clone());
                i += 2;
            }
            b"ASC" => {
                descending = false;
                i += 1;
            }
            b"DESC" => {
                descending = true;
                i += 1;
            }
            b"ALPHA" => {
                alpha = true;
                i += 1;
            }
            b"STORE" => {
                if i + 1 >= argv.len() {
                    return CommandOutcome::error(Reply::err_syntax());
                }
                store = Some(argv[i + 1].clone());
                i += 2;
            }
            _ => return CommandOutcome::error(Reply::err_syntax()),
        }
    }

    let db_index = client.db_index;
    let mut members: Vec<Bytes> = {
        let db = &state.dbs[db_index];
        match db.get(&argv[1]) {
            None => Vec::new(),
            Some(Value::List(l)) => l.iter().cloned().collect(),
            Some(Value::Set(s)) => s.iter().cloned().collect(),
            Some(_) => return wrong_type(),
        }
    };

    let by_has_star = by_pattern.as_ref().map(|p| p.contains(&b'*')).unwrap_or(false);

    if by_pattern.is_none() || by_has_star {
        let state_ref: &ServerState = state;
        let mut keyed: Vec<(SortKey, Bytes)> = Vec::with_capacity(members.len());
        for member in members.drain(..) {
            let raw = match &by_pattern {
                Some(p) => by_pattern_lookup(state_ref, db_index, p, &member),
                None => Some(member.clone()),
            };
            let key = match raw {
                None => SortKey::Missing,
                Some(v) if alpha => SortKey::Alpha(v),
                Some(v) => match std::str::from_utf8(&v).ok().and_then(|s| s.trim().parse::<f64>().ok()) {
                    Some(f) => SortKey::Num(f),
                    None => return CommandOutcome::error(Reply::err("One or more scores can't be converted into double")),
                },
            };
            keyed.push((key, member));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            let ord = match (a, b) {
                (SortKey::Missing, SortKey::Missing) => std::cmp::Ordering::Equal,
                (SortKey::Missing, _) => std::cmp::Ordering::Less,
                (_, SortKey::Missing) => std::cmp::Ordering::Greater,
                (SortKey::Num(x), SortKey::Num(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
                (SortKey::Alpha(x), SortKey::Alpha(y)) => x.cmp(y),
                _ => std::cmp::Ordering::Equal,
            };
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        members = keyed.into_iter().map(|(_, m)| m).collect();
    }

    if let Some((off, cnt)) = limit {
        let off = off.max(0) as usize;
        let end = if cnt < 0 { members.len() } else { (off + cnt as usize).min(members.len()) };
        members = if off >= members.len() { Vec::new() } else { members[off..end].to_vec() };
    }

    let state_ref: &ServerState = state;
    let output: Vec<Option<Bytes>> = if get_patterns.is_empty() {
        members.iter().map(|m| Some(m.clone())).collect()
    } else {
        let mut out = Vec::with_capacity(members.len() * get_patterns.len());
        for member in &members {
            for pat in &get_patterns {
                if pat.as_ref() == b"#" {
                    out.push(Some(member.clone()));
                } else {
                    out.push(by_pattern_lookup(state_ref, db_index, pat, member));
                }
            }
        }
        out
    };

    match store {
        Some(dst) => {
            let list: VecDeque<Bytes> = output.into_iter().map(|v| v.unwrap_or_else(Bytes::new)).collect();
            let len = list.len();
            let db = &mut state.dbs[db_index];
            if list.is_empty() {
                db.del(&dst);
            } else {
                db.set(dst, Value::List(list));
            }
            CommandOutcome::mutated(Reply::integer(len as i64), 1)
        }
        None => {
            let mut buf = Reply::multibulk_header(output.len());
            for item in output {
                match item {
                    Some(v) => buf.extend_from_slice(&Reply::bulk(&v)),
                    None => buf.extend_from_slice(&Reply::null_bulk()),
                }
            }
            CommandOutcome::simple(buf)
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
    fn exists_counts_present_keys() {
        let mut st = state();
        let mut cl = client();
        st.dbs[0].set(b("a"), Value::Str(b("1")));
        let out = cmd_exists(&st, &mut cl, &[b("EXISTS"), b("a"), b("missing")]);
        assert_eq!(out.reply, Reply::integer(1));
    }

    #[test]
    fn del_reports_removed_count() {
        let mut st = state();
        let mut cl = client();
        st.dbs[0].set(b("a"), Value::Str(b("1")));
        st.dbs[0].set(b("b"), Value::Str(b("2")));
        let out = cmd_del(&mut st, &mut cl, &[b("DEL"), b("a"), b("b"), b("c")]);
        assert_eq!(out.reply, Reply::integer(2));
    }

    #[test]
    fn expire_zero_means_immediate_absence() {
        let mut st = state();
        let mut cl = client();
        st.dbs[0].set(b("k"), Value::Str(b("v")));
        cmd_expire(&mut st, &mut cl, &[b("EXPIRE"), b("k"), b("0")]);
        assert!(st.dbs[0].get(b"k").is_none());
    }

    #[test]
    fn ttl_reports_no_key_as_minus_two() {
        let st = state();
        let mut cl = client();
        let out = cmd_ttl(&st, &mut cl, &[b("TTL"), b("missing")]);
        assert_eq!(out.reply, Reply::integer(-2));
    }

    #[test]
    fn rename_moves_value_and_drops_expiry() {
        let mut st = state();
        let mut cl = client();
        st.dbs[0].set_with_expiry(b("src"), Value::Str(b("v")), Instant::now() + Duration::from_secs(10));
        cmd_rename(&mut st, &mut cl, &[b("RENAME"), b("src"), b("dst")]);
        assert_eq!(st.dbs[0].get(b"dst"), Some(&Value::Str(b("v"))));
        assert_eq!(st.dbs[0].ttl(b"dst"), TtlStatus::NoExpiry);
    }

    #[test]
    fn renamenx_refuses_existing_dst() {
        let mut st = state();
        let mut cl = client();
        st.dbs[0].set(b("src"), Value::Str(b("v")));
        st.dbs[0].set(b("dst"), Value::Str(b("other")));
        let out = cmd_renamenx(&mut st, &mut cl, &[b("RENAMENX"), b("src"), b("dst")]);
        assert_eq!(out.reply, Reply::integer(0));
    }

    #[test]
    fn sort_numeric_ascending() {
        let mut st = state();
        let mut cl = client();
        let db = &mut st.dbs[0];
        db.set(b("L"), Value::List(VecDeque::from(vec![b("3"), b("1"), b("2")])));
        let out = cmd_sort(&mut st, &mut cl, &[b("SORT"), b("L")]);
        assert_eq!(out.reply, Reply::bulk_array(vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]));
    }

    #[test]
    fn sort_alpha_with_store() {
        let mut st = state();
        let mut cl = client();
        let db = &mut st.dbs[0];
        db.set(b("L"), Value::List(VecDeque::from(vec![b("banana"), b("apple")])));
        let out = cmd_sort(&mut st, &mut cl, &[b("SORT"), b("L"), b("ALPHA"), b("STORE"), b("dst")]);
        assert_eq!(out.reply, Reply::integer(2));
        assert_eq!(
            st.dbs[0].get(b"dst"),
            Some(&Value::List(VecDeque::from(vec![b("apple"), b("banana")])))
        );
    }
}
