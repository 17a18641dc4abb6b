// Storage module - the stored value types and the per-DB key/value map.

pub mod db;
pub mod pattern;
pub mod types;

pub use db::{Database, TtlStatus};
pub use types::Value;
