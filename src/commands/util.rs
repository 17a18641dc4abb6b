// Small argument-parsing helpers shared by every command module: integer
// parsing with Redis's exact error text, and the `ridx` index-resolution
// rule (§9) used by LINDEX/LSET/LRANGE/LTRIM.

use crate::protocol::Reply;
use bytes::Bytes;

pub fn parse_i64(b: &[u8]) -> Result<i64, Vec<u8>> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(Reply::err_not_integer)
}

pub fn parse_usize_count(b: &[u8]) -> Result<i64, Vec<u8>> {
    parse_i64(b)
}

/// Resolves a possibly-negative index against `len`, negative-resolve
/// *then* bounds-check as two distinct steps (§9 `ridx`). `None` if the
/// resolved index still falls outside `[0, len)`.
pub fn resolve_index(idx: i64, len: usize) -> Option<usize> {
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved >= len as i64 {
        None
    } else {
        Some(resolved as usize)
    }
}

/// Same resolution rule but clamps into range instead of rejecting, for
/// `LRANGE`/`LTRIM`/`BITCOUNT`-style inclusive ranges.
pub fn clamp_index(idx: i64, len: usize) -> i64 {
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    resolved.max(0)
}

pub fn bytes_eq_ignore_ascii_case(a: &Bytes, lit: &[u8]) -> bool {
    a.eq_ignore_ascii_case(lit)
}
