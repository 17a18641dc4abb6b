// A single logical database: key -> value, key -> expiry deadline, and the
// AOF staging buffer writes accumulate into between flush boundaries (§3).

use super::pattern::glob_match;
use super::types::Value;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Result of a TTL lookup (§4.9 `TTL`): no such (live) key, a key with no
/// expiry set, or the remaining duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TtlStatus {
    NoKey,
    NoExpiry,
    Remaining(Duration),
}

pub struct Database {
    pub num: usize,
    items: HashMap<Bytes, Value>,
    expires: HashMap<Bytes, Instant>,
    /// Bytes of complete RESP commands written since the last global flush
    /// (§4.7). Only ever holds whole frames.
    pub aof_stage: BytesMut,
}

impl Database {
    pub fn new(num: usize) -> Self {
        Self {
            num,
            items: HashMap::new(),
            expires: HashMap::new(),
            aof_stage: BytesMut::new(),
        }
    }

    fn is_expired(&self, key: &[u8]) -> bool {
        match self.expires.get(key) {
            Some(deadline) => Instant::now() >= *deadline,
            None => false,
        }
    }

    /// `get` never mutates on a lazy-expire observation -- the sweeper (§4.8)
    /// owns eviction. A logically-expired key simply reads back as absent.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        if self.is_expired(key) {
            return None;
        }
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        if self.is_expired(key) {
            return None;
        }
        self.items.get_mut(key)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Textual type tag for `TYPE`: `"none"` for absent/expired keys.
    pub fn get_type(&self, key: &[u8]) -> &'static str {
        self.get(key).map(Value::type_name).unwrap_or("none")
    }

    /// Any write via the `set`-family clears a prior expiry (§3 invariant).
    pub fn set(&mut self, key: Bytes, value: Value) {
        self.expires.remove(&key);
        self.items.insert(key, value);
    }

    pub fn set_with_expiry(&mut self, key: Bytes, value: Value, deadline: Instant) {
        self.items.insert(key.clone(), value);
        self.expires.insert(key, deadline);
    }

    /// Insert-if-absent for the mutating list and set commands, which must
    /// not disturb an existing expiry.
    pub fn entry_or_insert_with(&mut self, key: &Bytes, default: impl FnOnce() -> Value) -> &mut Value {
        self.items.entry(key.clone()).or_insert_with(default)
    }

    pub fn del(&mut self, key: &[u8]) -> bool {
        self.expires.remove(key);
        self.items.remove(key).is_some()
    }

    /// Removes the key if its value becomes empty, matching the "a fully
    /// emptied list/set triggers key removal" edge cases in §4.4/§4.5.
    pub fn remove_if_empty(&mut self, key: &[u8]) {
        let empty = match self.items.get(key) {
            Some(Value::List(l)) => l.is_empty(),
            Some(Value::Set(s)) => s.is_empty(),
            _ => false,
        };
        if empty {
            self.del(key);
        }
    }

    /// Sets a deadline on an existing key; false if the key is absent.
    pub fn expire(&mut self, key: &[u8], deadline: Instant) -> bool {
        if !self.items.contains_key(key) {
            return false;
        }
        self.expires.insert(Bytes::copy_from_slice(key), deadline);
        true
    }

    /// Clears any expiry on `key`; true if one was present.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        self.expires.remove(key).is_some()
    }

    pub fn ttl(&self, key: &[u8]) -> TtlStatus {
        if !self.items.contains_key(key) || self.is_expired(key) {
            return TtlStatus::NoKey;
        }
        match self.expires.get(key) {
            None => TtlStatus::NoExpiry,
            Some(deadline) => {
                let now = Instant::now();
                if now >= *deadline {
                    TtlStatus::NoKey
                } else {
                    TtlStatus::Remaining(*deadline - now)
                }
            }
        }
    }

    /// Live-key count for `DBSIZE`: items minus anything logically expired
    /// but not yet swept.
    pub fn live_len(&self) -> usize {
        self.items.keys().filter(|k| !self.is_expired(k)).count()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.expires.clear();
    }

    /// `*` alone matches every (live) key without running the glob matcher.
    pub fn keys_matching(&self, pattern: &[u8]) -> Vec<Bytes> {
        let all = pattern == b"*";
        self.items
            .keys()
            .filter(|k| !self.is_expired(k))
            .filter(|k| all || glob_match(pattern, k))
            .cloned()
            .collect()
    }

    /// A key list in sorted byte order, for the AOF rewrite's deterministic
    /// traversal (§4.7.1).
    pub fn sorted_keys(&self, now: Instant) -> Vec<Bytes> {
        let mut keys: Vec<Bytes> = self
            .items
            .keys()
            .filter(|k| match self.expires.get(*k) {
                Some(deadline) => now < *deadline,
                None => true,
            })
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn expiry_of(&self, key: &[u8]) -> Option<Instant> {
        self.expires.get(key).copied()
    }

    /// Evicts every key past its deadline, returning the keys removed so the
    /// sweeper (§4.8) can log `DEL` for each into the right DB's stage.
    pub fn sweep_expired(&mut self) -> Vec<Bytes> {
        let now = Instant::now();
        let expired: Vec<Bytes> = self
            .expires
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.items.remove(key);
            self.expires.remove(key);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clears_expiry() {
        let mut db = Database::new(0);
        let k = Bytes::from_static(b"k");
        db.set_with_expiry(
            k.clone(),
            Value::Str(Bytes::from_static(b"v")),
            Instant::now() + Duration::from_secs(10),
        );
        assert_ne!(db.ttl(&k), TtlStatus::NoExpiry);
        db.set(k.clone(), Value::Str(Bytes::from_static(b"v2")));
        assert_eq!(db.ttl(&k), TtlStatus::NoExpiry);
    }

    #[test]
    fn get_does_not_mutate_on_lazy_expiry() {
        let mut db = Database::new(0);
        let k = Bytes::from_static(b"k");
        db.set_with_expiry(
            k.clone(),
            Value::Str(Bytes::from_static(b"v")),
            Instant::now() - Duration::from_secs(1),
        );
        assert!(db.get(&k).is_none());
        assert!(db.get(&k).is_none());
        assert_eq!(db.ttl(&k), TtlStatus::NoKey);
    }

    #[test]
    fn expire_zero_is_immediate() {
        let mut db = Database::new(0);
        let k = Bytes::from_static(b"k");
        db.set(k.clone(), Value::Str(Bytes::from_static(b"v")));
        assert!(db.expire(&k, Instant::now()));
        assert!(db.get(&k).is_none());
    }

    #[test]
    fn del_is_unconditional() {
        let mut db = Database::new(0);
        let k = Bytes::from_static(b"k");
        assert!(!db.del(&k));
        db.set(k.clone(), Value::Str(Bytes::from_static(b"v")));
        assert!(db.del(&k));
        assert!(!db.exists(&k));
    }

    #[test]
    fn keys_glob_filters_pattern() {
        let mut db = Database::new(0);
        db.set(Bytes::from_static(b"user:1"), Value::Str(Bytes::new()));
        db.set(Bytes::from_static(b"user:2"), Value::Str(Bytes::new()));
        db.set(Bytes::from_static(b"post:1"), Value::Str(Bytes::new()));
        let mut matched = db.keys_matching(b"user:*");
        matched.sort();
        assert_eq!(
            matched,
            vec![Bytes::from_static(b"user:1"), Bytes::from_static(b"user:2")]
        );
        assert_eq!(db.keys_matching(b"*").len(), 3);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let mut db = Database::new(0);
        db.set_with_expiry(
            Bytes::from_static(b"a"),
            Value::Str(Bytes::new()),
            Instant::now() - Duration::from_millis(1),
        );
        db.set(Bytes::from_static(b"b"), Value::Str(Bytes::new()));
        let swept = db.sweep_expired();
        assert_eq!(swept, vec![Bytes::from_static(b"a")]);
        assert_eq!(db.live_len(), 1);
    }
}
