// RESP reply encoding and the shared command-wire encoder used by the AOF,
// inline->multibulk conversion, and the rewrite's synthesized commands.

use bytes::{BufMut, Bytes, BytesMut};

/// Convenience constructors for RESP replies (§6). Each returns the encoded
/// wire bytes ready to push onto a client's writer.
pub struct Reply;

impl Reply {
    pub fn ok() -> Vec<u8> {
        Self::simple("OK")
    }

    pub fn simple(s: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(s.len() + 3);
        buf.push(b'+');
        buf.extend_from_slice(s.as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// `kind` is the uppercase error token (`ERR`, `WRONGTYPE`, `NOAUTH`, ...).
    pub fn error(kind: &str, msg: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(kind.len() + msg.len() + 4);
        buf.push(b'-');
        buf.extend_from_slice(kind.as_bytes());
        if !msg.is_empty() {
            buf.push(b' ');
            buf.extend_from_slice(msg.as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }

    pub fn err(msg: &str) -> Vec<u8> {
        Self::error("ERR", msg)
    }

    pub fn err_wrong_type() -> Vec<u8> {
        Self::error(
            "WRONGTYPE",
            "Operation against a key holding the wrong kind of value",
        )
    }

    pub fn err_arity(cmd: &str) -> Vec<u8> {
        Self::err(&format!(
            "wrong number of arguments for '{}'",
            cmd.to_lowercase()
        ))
    }

    pub fn err_not_integer() -> Vec<u8> {
        Self::err("value is not an integer or out of range")
    }

    pub fn err_syntax() -> Vec<u8> {
        Self::err("syntax error")
    }

    pub fn err_no_such_key() -> Vec<u8> {
        Self::err("no such key")
    }

    pub fn err_index_out_of_range() -> Vec<u8> {
        Self::err("index out of range")
    }

    pub fn err_unknown_command(name: &[u8]) -> Vec<u8> {
        Self::err(&format!(
            "unknown command '{}'",
            String::from_utf8_lossy(name)
        ))
    }

    pub fn err_noauth() -> Vec<u8> {
        Self::error("NOAUTH", "Authentication required.")
    }

    pub fn err_invalid_password() -> Vec<u8> {
        Self::err("invalid password")
    }

    pub fn integer(i: i64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.push(b':');
        buf.extend_from_slice(i.to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf
    }

    pub fn null_bulk() -> Vec<u8> {
        b"$-1\r\n".to_vec()
    }

    pub fn null_array() -> Vec<u8> {
        b"*-1\r\n".to_vec()
    }

    pub fn bulk(data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(data.len() + 16);
        buf.push(b'$');
        buf.extend_from_slice(data.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(data);
        buf.extend_from_slice(b"\r\n");
        buf
    }

    pub fn multibulk_header(n: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.push(b'*');
        buf.extend_from_slice(n.to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Encode a multibulk array of bulk strings in one shot.
    pub fn bulk_array<I, T>(items: I) -> Vec<u8>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let items: Vec<T> = items.into_iter().collect();
        let mut buf = Self::multibulk_header(items.len());
        for item in &items {
            buf.extend_from_slice(&Self::bulk(item.as_ref()));
        }
        buf
    }
}

/// Encode `argv` as a RESP multibulk command, the wire form used for the AOF
/// and for converting inline commands before they're logged or replicated.
pub fn write_command(buf: &mut BytesMut, argv: &[Bytes]) {
    buf.put_u8(b'*');
    buf.put_slice(argv.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in argv {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

/// Same as `write_command` but for byte-slice argv, used where callers don't
/// already hold `Bytes` (e.g. the rewrite pass building commands from owned
/// snapshots).
pub fn write_command_slices(buf: &mut BytesMut, argv: &[&[u8]]) {
    buf.put_u8(b'*');
    buf.put_slice(argv.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in argv {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_basic_replies() {
        assert_eq!(Reply::ok(), b"+OK\r\n");
        assert_eq!(Reply::integer(-42), b":-42\r\n");
        assert_eq!(Reply::bulk(b"foobar"), b"$6\r\nfoobar\r\n");
        assert_eq!(Reply::null_bulk(), b"$-1\r\n");
    }

    #[test]
    fn encodes_typed_errors() {
        assert_eq!(
            Reply::err_wrong_type(),
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );
        assert_eq!(
            Reply::err_arity("GET"),
            b"-ERR wrong number of arguments for 'get'\r\n"
        );
    }

    #[test]
    fn encodes_bulk_array() {
        let out = Reply::bulk_array(vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(out, b"*2\r\n$1\r\na\r\n$1\r\nb\r\n");
    }

    #[test]
    fn encodes_command_wire() {
        let mut buf = BytesMut::new();
        write_command(&mut buf, &[Bytes::from_static(b"GET"), Bytes::from_static(b"k")]);
        assert_eq!(buf.freeze().as_ref(), b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n".as_ref());
    }
}
