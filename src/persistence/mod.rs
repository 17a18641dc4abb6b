// Persistence: the AOF file is the only on-disk state the core keeps (§6).
// There is no RDB snapshot format.

pub mod aof;

pub use aof::{rewrite_aof, AofError, AofHandle};
