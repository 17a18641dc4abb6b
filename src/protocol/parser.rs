// Incremental command framer: RESP multibulk and inline-telnet on the same
// connection, returning whole commands as soon as they're buffered (§4.1).

use super::ProtocolError;
use bytes::{Bytes, BytesMut};

/// One fully-framed command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// The wire bytes of the command, always valid RESP multibulk -- an
    /// inline command is re-encoded here before being handed back so the
    /// AOF only ever stores RESP.
    pub raw: Bytes,
    pub argv: Vec<Bytes>,
    /// See §4.1: true when the dispatcher should drain the AOF stage and
    /// flush the socket after this command rather than keep pipelining.
    pub flush_hint: bool,
}

/// Frames commands out of a byte stream incrementally. The caller owns the
/// socket read loop: feed bytes in as they arrive, then drain whole commands
/// with `next_command` until it returns `Ok(None)` (needs more bytes).
#[derive(Debug, Default)]
pub struct CommandReader {
    buf: BytesMut,
    /// Mirrors the source's `copied` flag: true once `buf` has been grown by
    /// appending a fresh read onto leftover bytes from a previous call,
    /// which signals that the remaining bytes span more than one socket
    /// read rather than arriving as a single pipelined batch.
    appended: bool,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly-read socket bytes to the accumulation buffer.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.buf.is_empty() {
            self.buf = BytesMut::from(chunk);
            self.appended = false;
        } else {
            self.buf.extend_from_slice(chunk);
            self.appended = true;
        }
    }

    /// True if the buffer holds no unconsumed bytes (the caller needs to
    /// perform another socket read before calling `next_command` again).
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Try to frame one whole command out of the buffer. Returns `Ok(None)`
    /// if more bytes are needed -- this never blocks or reads the socket
    /// itself.
    pub fn next_command(&mut self) -> Result<Option<ParsedCommand>, ProtocolError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let parsed = try_parse_one(&self.buf)?;
        let Some((consumed, argv, telnet)) = parsed else {
            return Ok(None);
        };
        let raw_slice = self.buf.split_to(consumed).freeze();
        let consumed_all = self.buf.is_empty();
        let flush_hint = consumed_all || telnet || self.appended;
        if consumed_all {
            self.appended = false;
        }
        let raw = if telnet {
            encode_multibulk_wire(&argv)
        } else {
            raw_slice
        };
        Ok(Some(ParsedCommand {
            raw,
            argv,
            flush_hint,
        }))
    }
}

/// Re-encode an inline command's argv into RESP multibulk wire form, the
/// format the AOF expects.
fn encode_multibulk_wire(argv: &[Bytes]) -> Bytes {
    let mut out = BytesMut::new();
    super::serializer::write_command(&mut out, argv);
    out.freeze()
}

/// Attempt to parse one command out of `data`. Returns:
/// - `Ok(Some((consumed, argv, is_telnet)))` on a complete command
/// - `Ok(None)` if more bytes are needed
/// - `Err` on malformed input
fn try_parse_one(data: &[u8]) -> Result<Option<(usize, Vec<Bytes>, bool)>, ProtocolError> {
    if data[0] == b'*' {
        try_parse_multibulk(data)
    } else {
        try_parse_inline(data).map(|opt| opt.map(|(n, args)| (n, args, true)))
    }
}

fn try_parse_multibulk(data: &[u8]) -> Result<Option<(usize, Vec<Bytes>, bool)>, ProtocolError> {
    let Some(header_end) = find_newline(data, 1) else {
        return Ok(None);
    };
    if data[header_end - 1] != b'\r' {
        return Err(ProtocolError::InvalidMultibulkLength);
    }
    let count: i64 = std::str::from_utf8(&data[1..header_end - 1])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ProtocolError::InvalidMultibulkLength)?;
    let mut pos = header_end + 1;
    if count <= 0 {
        return Ok(Some((pos, Vec::new(), false)));
    }
    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if pos >= data.len() {
            return Ok(None);
        }
        if data[pos] != b'$' {
            return Err(ProtocolError::ExpectedDollar(data[pos] as char));
        }
        let len_start = pos + 1;
        let Some(len_end) = find_newline(data, len_start) else {
            return Ok(None);
        };
        if data[len_end - 1] != b'\r' {
            return Err(ProtocolError::InvalidBulkLength);
        }
        let len: u64 = std::str::from_utf8(&data[len_start..len_end - 1])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ProtocolError::InvalidBulkLength)?;
        let body_start = len_end + 1;
        let body_end = body_start + len as usize;
        if data.len() < body_end + 2 {
            return Ok(None);
        }
        args.push(Bytes::copy_from_slice(&data[body_start..body_end]));
        pos = body_end + 2;
    }
    Ok(Some((pos, args, false)))
}

/// Find the index of the first `\n` at or after `from`.
fn find_newline(data: &[u8], from: usize) -> Option<usize> {
    data[from..].iter().position(|&b| b == b'\n').map(|p| p + from)
}

fn try_parse_inline(data: &[u8]) -> Result<Option<(usize, Vec<Bytes>)>, ProtocolError> {
    let Some(nl) = find_newline(data, 0) else {
        return Ok(None);
    };
    let line_end = if nl > 0 && data[nl - 1] == b'\r' { nl - 1 } else { nl };
    let line = &data[..line_end];
    if line.is_empty() {
        return Ok(Some((nl + 1, Vec::new())));
    }
    let args = parse_inline_args(line)?;
    Ok(Some((nl + 1, args)))
}

/// Tokenize an inline command line: whitespace-separated tokens, with
/// double-quoted tokens permitted only at the start of a token and whose
/// closing quote must be followed by whitespace or end-of-line.
fn parse_inline_args(line: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
    let mut args = Vec::new();
    let mut i = 0;
    let n = line.len();
    while i < n {
        while i < n && (line[i] == b' ' || line[i] == b'\t') {
            i += 1;
        }
        if i >= n {
            break;
        }
        if line[i] == b'"' {
            let start = i + 1;
            let mut j = start;
            loop {
                if j >= n {
                    return Err(ProtocolError::UnbalancedQuotes);
                }
                if line[j] == b'"' {
                    break;
                }
                j += 1;
            }
            if j + 1 < n && line[j + 1] != b' ' && line[j + 1] != b'\t' {
                return Err(ProtocolError::UnbalancedQuotes);
            }
            args.push(Bytes::copy_from_slice(&line[start..j]));
            i = j + 1;
        } else {
            let start = i;
            while i < n && line[i] != b' ' && line[i] != b'\t' {
                i += 1;
            }
            args.push(Bytes::copy_from_slice(&line[start..i]));
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(cmd: &ParsedCommand) -> Vec<&[u8]> {
        cmd.argv.iter().map(|b| b.as_ref()).collect()
    }

    #[test]
    fn parses_whole_multibulk_in_one_feed() {
        let mut r = CommandReader::new();
        r.feed(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        let cmd = r.next_command().unwrap().unwrap();
        assert_eq!(argv(&cmd), vec![b"GET".as_ref(), b"k".as_ref()]);
        assert!(cmd.flush_hint);
        assert!(r.next_command().unwrap().is_none());
    }

    #[test]
    fn needs_more_bytes_across_two_feeds() {
        let mut r = CommandReader::new();
        r.feed(b"*1\r\n$4\r\nPI");
        assert!(r.next_command().unwrap().is_none());
        r.feed(b"NG\r\n");
        let cmd = r.next_command().unwrap().unwrap();
        assert_eq!(argv(&cmd), vec![b"PING".as_ref()]);
        assert!(cmd.flush_hint);
    }

    #[test]
    fn pipelined_batch_in_one_read_does_not_flush_until_tail() {
        let mut r = CommandReader::new();
        r.feed(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n");
        let first = r.next_command().unwrap().unwrap();
        assert!(!first.flush_hint);
        let second = r.next_command().unwrap().unwrap();
        assert!(second.flush_hint);
    }

    #[test]
    fn inline_command_always_flushes() {
        let mut r = CommandReader::new();
        r.feed(b"PING\r\nPING\r\n");
        let first = r.next_command().unwrap().unwrap();
        assert!(first.flush_hint);
        assert_eq!(argv(&first), vec![b"PING".as_ref()]);
        assert_eq!(first.raw.as_ref(), b"*1\r\n$4\r\nPING\r\n".as_ref());
    }

    #[test]
    fn inline_quoted_token() {
        let mut r = CommandReader::new();
        r.feed(b"SET k \"hello world\"\r\n");
        let cmd = r.next_command().unwrap().unwrap();
        assert_eq!(
            argv(&cmd),
            vec![b"SET".as_ref(), b"k".as_ref(), b"hello world".as_ref()]
        );
    }

    #[test]
    fn inline_unbalanced_quote_errors() {
        let mut r = CommandReader::new();
        r.feed(b"SET k \"hello\r\n");
        assert_eq!(
            r.next_command().unwrap_err(),
            ProtocolError::UnbalancedQuotes
        );
    }

    #[test]
    fn inline_quote_must_be_followed_by_space() {
        let mut r = CommandReader::new();
        r.feed(b"SET k \"hi\"there\r\n");
        assert_eq!(
            r.next_command().unwrap_err(),
            ProtocolError::UnbalancedQuotes
        );
    }

    #[test]
    fn multibulk_missing_dollar() {
        let mut r = CommandReader::new();
        r.feed(b"*1\r\nXfoo\r\n");
        assert_eq!(
            r.next_command().unwrap_err(),
            ProtocolError::ExpectedDollar('X')
        );
    }

    #[test]
    fn multibulk_bad_length() {
        let mut r = CommandReader::new();
        r.feed(b"*x\r\n");
        assert_eq!(
            r.next_command().unwrap_err(),
            ProtocolError::InvalidMultibulkLength
        );
    }

    #[test]
    fn multibulk_bad_bulk_length() {
        let mut r = CommandReader::new();
        r.feed(b"*1\r\n$x\r\nfoo\r\n");
        assert_eq!(
            r.next_command().unwrap_err(),
            ProtocolError::InvalidBulkLength
        );
    }

    #[test]
    fn binary_safe_bulk() {
        let mut r = CommandReader::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"*1\r\n$4\r\n");
        buf.extend_from_slice(&[0u8, b'\r', b'\n', 0xffu8]);
        buf.extend_from_slice(b"\r\n");
        r.feed(&buf);
        let cmd = r.next_command().unwrap().unwrap();
        assert_eq!(cmd.argv[0].as_ref(), &[0u8, b'\r', b'\n', 0xffu8]);
    }

    // Feeding the same bytes in arbitrary chunk sizes must parse identically
    // to feeding them whole (the incremental-framing property).
    #[test]
    fn chunked_feed_matches_whole_feed() {
        let whole = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nhello\r\n*1\r\n$4\r\nPING\r\n";
        let mut whole_reader = CommandReader::new();
        whole_reader.feed(whole);
        let mut whole_cmds = Vec::new();
        while let Some(c) = whole_reader.next_command().unwrap() {
            whole_cmds.push(c.argv);
        }

        for chunk_size in 1..=7 {
            let mut r = CommandReader::new();
            let mut cmds = Vec::new();
            for chunk in whole.chunks(chunk_size) {
                r.feed(chunk);
                while let Some(c) = r.next_command().unwrap() {
                    cmds.push(c.argv);
                }
            }
            assert_eq!(cmds, whole_cmds, "chunk_size={chunk_size}");
        }
    }
}
