// Wire protocol: RESP value model, the incremental command reader, and the
// serializer used to turn replies back into bytes.

use thiserror::Error;

pub mod parser;
pub mod serializer;

pub use parser::{CommandReader, ParsedCommand};
pub use serializer::Reply;

/// Errors raised by the command reader (§4.1). These always terminate the
/// connection; the message text is part of the wire contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid multibulk length")]
    InvalidMultibulkLength,

    #[error("expected '$', got '{0}'")]
    ExpectedDollar(char),

    #[error("invalid bulk length")]
    InvalidBulkLength,

    #[error("unbalanced quotes in request")]
    UnbalancedQuotes,
}

impl ProtocolError {
    /// The text redis-cli and friends expect after `-ERR Protocol error: `.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
