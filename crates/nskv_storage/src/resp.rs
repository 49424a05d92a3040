//! RESP2 command executor for Redis-compatible stores.
//!
//! Commands are sent as arrays of bulk strings. Replies are parsed into
//! [`CommandReply`]:
//! - Simple strings (`+`) become [`CommandReply::Status`]
//! - Errors (`-`) become [`CommandReply::Error`]
//! - Integers (`:`) become [`CommandReply::Integer`]
//! - Bulk strings (`$`) become [`CommandReply::String`], `$-1` becomes `Nil`
//! - Arrays (`*`) of bulk strings become [`CommandReply::Array`], `*-1` becomes `Nil`

use crate::error::{StorageError, StorageResult};
use crate::executor::{CommandExecutor, CommandReply, ReplyHandler};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Maximum bulk string size accepted in a reply (512MB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements accepted in an array reply.
pub const MAX_ELEMENTS: usize = 1_000_000;

/// Encodes `argv` as a RESP2 array of bulk strings.
#[must_use]
pub fn encode_command(argv: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + argv.iter().map(|a| a.len() + 16).sum::<usize>());
    buf.push(b'*');
    buf.extend_from_slice(argv.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    for arg in argv {
        buf.push(b'$');
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Encodes a reply the way a store would send it.
#[must_use]
pub fn encode_reply(reply: &CommandReply) -> Vec<u8> {
    fn bulk(buf: &mut Vec<u8>, data: &[u8]) {
        buf.push(b'$');
        buf.extend_from_slice(data.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(data);
        buf.extend_from_slice(b"\r\n");
    }

    let mut buf = Vec::new();
    match reply {
        CommandReply::Nil => buf.extend_from_slice(b"$-1\r\n"),
        CommandReply::Integer(n) => {
            buf.push(b':');
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        CommandReply::String(data) => bulk(&mut buf, data),
        CommandReply::Array(items) => {
            buf.push(b'*');
            buf.extend_from_slice(items.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            for item in items {
                bulk(&mut buf, item);
            }
        }
        CommandReply::Status(s) => {
            buf.push(b'+');
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        CommandReply::Error(s) => {
            buf.push(b'-');
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
    }
    buf
}

/// Reads one CRLF-terminated line, without the terminator.
fn read_line<R: BufRead>(reader: &mut R) -> StorageResult<Vec<u8>> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(StorageError::Unavailable("connection closed by store".into()));
    }
    if !line.ends_with(b"\r\n") {
        return Err(StorageError::Protocol("line not terminated by CRLF".into()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_length(line: &[u8], what: &str) -> StorageResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StorageError::Protocol(format!("invalid {what} length")))
}

/// Reads a bulk string body after its `$<len>` header.
fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> StorageResult<Option<Vec<u8>>> {
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(StorageError::Protocol("invalid bulk string length".into()));
    }
    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return Err(StorageError::Protocol(format!(
            "bulk string too large: {len} > {MAX_BULK_SIZE}"
        )));
    }
    let mut data = vec![0u8; len + 2];
    reader.read_exact(&mut data)?;
    if &data[len..] != b"\r\n" {
        return Err(StorageError::Protocol("missing CRLF after bulk string".into()));
    }
    data.truncate(len);
    Ok(Some(data))
}

/// Reads and parses one reply.
pub fn read_reply<R: BufRead>(reader: &mut R) -> StorageResult<CommandReply> {
    let line = read_line(reader)?;
    let Some((&type_byte, rest)) = line.split_first() else {
        return Err(StorageError::Protocol("empty reply line".into()));
    };

    match type_byte {
        b'+' => Ok(CommandReply::Status(String::from_utf8_lossy(rest).into_owned())),
        b'-' => Ok(CommandReply::Error(String::from_utf8_lossy(rest).into_owned())),
        b':' => std::str::from_utf8(rest)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(CommandReply::Integer)
            .ok_or_else(|| StorageError::Protocol("invalid integer".into())),
        b'$' => {
            let len = parse_length(rest, "bulk string")?;
            Ok(match read_bulk(reader, len)? {
                Some(data) => CommandReply::String(data),
                None => CommandReply::Nil,
            })
        }
        b'*' => {
            let len = parse_length(rest, "array")?;
            if len == -1 {
                return Ok(CommandReply::Nil);
            }
            if len < 0 || len as usize > MAX_ELEMENTS {
                return Err(StorageError::Protocol(format!("invalid array length {len}")));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let header = read_line(reader)?;
                match header.split_first() {
                    Some((b'$', len)) => {
                        let len = parse_length(len, "bulk string")?;
                        let item = read_bulk(reader, len)?.ok_or_else(|| {
                            StorageError::Protocol("nil element in array reply".into())
                        })?;
                        items.push(item);
                    }
                    _ => {
                        return Err(StorageError::Protocol(
                            "array reply element is not a bulk string".into(),
                        ))
                    }
                }
            }
            Ok(CommandReply::Array(items))
        }
        other => Err(StorageError::Protocol(format!(
            "unsupported reply type byte 0x{other:02x}"
        ))),
    }
}

fn unavailable(err: StorageError) -> StorageError {
    match err {
        StorageError::Io(e) => StorageError::Unavailable(e.to_string()),
        other => other,
    }
}

/// An open connection to the store.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn open(addr: &str, timeout: Duration) -> StorageResult<Self> {
        let addrs = addr
            .to_socket_addrs()
            .map_err(|e| StorageError::Unavailable(format!("cannot resolve {addr}: {e}")))?;

        let mut last_err = None;
        for sock_addr in addrs {
            match TcpStream::connect_timeout(&sock_addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    tracing::info!(peer = addr, "connected to store");
                    return Ok(Self {
                        reader: BufReader::new(stream.try_clone()?),
                        writer: BufWriter::new(stream),
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(StorageError::Unavailable(match last_err {
            Some(e) => format!("cannot connect to {addr}: {e}"),
            None => format!("{addr} resolved to no addresses"),
        }))
    }

    fn round_trip(&mut self, argv: &[Vec<u8>]) -> StorageResult<CommandReply> {
        self.writer.write_all(&encode_command(argv))?;
        self.writer.flush()?;
        read_reply(&mut self.reader)
    }
}

/// A [`CommandExecutor`] speaking RESP2 over one TCP connection.
///
/// Commands are written and answered one at a time on the calling (I/O)
/// thread. An I/O or protocol failure fails the in-flight command with
/// [`StorageError::Unavailable`] (or the protocol error) and drops the
/// connection, so a late reply can never be read as the answer to a later
/// command. The next command reconnects first.
pub struct RespExecutor {
    conn: Option<Connection>,
    addr: String,
    timeout: Duration,
}

impl RespExecutor {
    /// Connects to `addr`, failing after `timeout`.
    ///
    /// `timeout` also bounds every later read, write and reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if no resolved address accepts
    /// the connection.
    pub fn connect(addr: &str, timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(addr, timeout)?;
        Ok(Self {
            conn: Some(conn),
            addr: addr.to_string(),
            timeout,
        })
    }

    /// Returns true while a connection is open.
    ///
    /// False after a failure, until the next command reconnects.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn execute(&mut self, argv: &[Vec<u8>]) -> StorageResult<CommandReply> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                tracing::debug!(peer = %self.addr, "reconnecting to store");
                Connection::open(&self.addr, self.timeout).map_err(unavailable)?
            }
        };
        match conn.round_trip(argv) {
            Ok(reply) => {
                self.conn = Some(conn);
                Ok(reply)
            }
            Err(err) => {
                tracing::error!(peer = %self.addr, error = %err, "store connection failed");
                Err(unavailable(err))
            }
        }
    }
}

impl std::fmt::Debug for RespExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespExecutor")
            .field("addr", &self.addr)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl CommandExecutor for RespExecutor {
    fn run_argv_async(&mut self, argv: Vec<Vec<u8>>, handler: ReplyHandler) {
        let result = self.execute(&argv);
        handler(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    fn parse(bytes: &[u8]) -> StorageResult<CommandReply> {
        read_reply(&mut Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn encode_hget() {
        let argv = vec![b"HGET".to_vec(), b"k".to_vec(), b"value".to_vec()];
        assert_eq!(
            encode_command(&argv),
            b"*3\r\n$4\r\nHGET\r\n$1\r\nk\r\n$5\r\nvalue\r\n".to_vec()
        );
    }

    #[test]
    fn parse_scalar_replies() {
        assert_eq!(parse(b"+OK\r\n").unwrap(), CommandReply::Status("OK".into()));
        assert_eq!(
            parse(b"-ERR nope\r\n").unwrap(),
            CommandReply::Error("ERR nope".into())
        );
        assert_eq!(parse(b":42\r\n").unwrap(), CommandReply::Integer(42));
        assert_eq!(parse(b":-1\r\n").unwrap(), CommandReply::Integer(-1));
    }

    #[test]
    fn parse_bulk_and_nil() {
        assert_eq!(
            parse(b"$6\r\nfoo\r\nb\r\n").unwrap(),
            CommandReply::String(b"foo\r\nb".to_vec())
        );
        assert_eq!(parse(b"$-1\r\n").unwrap(), CommandReply::Nil);
        assert_eq!(parse(b"$0\r\n\r\n").unwrap(), CommandReply::String(Vec::new()));
    }

    #[test]
    fn parse_array() {
        assert_eq!(
            parse(b"*2\r\n$3\r\na/1\r\n$3\r\na/2\r\n").unwrap(),
            CommandReply::Array(vec![b"a/1".to_vec(), b"a/2".to_vec()])
        );
        assert_eq!(parse(b"*0\r\n").unwrap(), CommandReply::Array(Vec::new()));
        assert_eq!(parse(b"*-1\r\n").unwrap(), CommandReply::Nil);
    }

    #[test]
    fn parse_rejects_malformed_replies() {
        assert!(matches!(parse(b":abc\r\n"), Err(StorageError::Protocol(_))));
        assert!(matches!(parse(b"$3\r\nabcd\r\n"), Err(StorageError::Protocol(_))));
        assert!(matches!(parse(b"*1\r\n:1\r\n"), Err(StorageError::Protocol(_))));
        assert!(matches!(parse(b"*1\r\n$-1\r\n"), Err(StorageError::Protocol(_))));
        assert!(matches!(parse(b"?\r\n"), Err(StorageError::Protocol(_))));
        assert!(matches!(parse(b"+OK\n"), Err(StorageError::Protocol(_))));
    }

    #[test]
    fn encoded_replies_parse_back() {
        let replies = [
            CommandReply::Nil,
            CommandReply::Integer(-7),
            CommandReply::String(b"a\r\nb".to_vec()),
            CommandReply::Array(vec![b"x".to_vec(), Vec::new()]),
            CommandReply::Status("OK".into()),
            CommandReply::Error("ERR wrong".into()),
        ];
        for reply in replies {
            assert_eq!(parse(&encode_reply(&reply)).unwrap(), reply);
        }
    }

    #[test]
    fn commands_parse_as_arrays() {
        // A store reads commands with the same grammar as array replies.
        let argv = vec![b"DEL".to_vec(), b"k1".to_vec(), b"k2".to_vec()];
        assert_eq!(parse(&encode_command(&argv)).unwrap(), CommandReply::Array(argv));
    }

    #[test]
    fn eof_is_unavailable() {
        assert!(parse(b"").unwrap_err().is_unavailable());
    }

    #[test]
    fn connect_refused_is_unavailable() {
        // Bind then drop to get a port that is very likely closed.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = RespExecutor::connect(&format!("127.0.0.1:{port}"), Duration::from_millis(200))
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn round_trip_against_scripted_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let expected = encode_command(&[b"HEXISTS".to_vec(), b"k".to_vec(), b"value".to_vec()]);
            let mut request = vec![0u8; expected.len()];
            reader.read_exact(&mut request).unwrap();
            assert_eq!(request, expected);
            stream.write_all(b":1\r\n").unwrap();
            // Close without answering the next command.
        });

        let mut executor = RespExecutor::connect(&addr, Duration::from_secs(2)).unwrap();
        let (tx, rx) = mpsc::channel();
        let first = tx.clone();
        executor.run_argv_async(
            vec![b"HEXISTS".to_vec(), b"k".to_vec(), b"value".to_vec()],
            Box::new(move |r| first.send(r).unwrap()),
        );
        assert_eq!(rx.recv().unwrap().unwrap(), CommandReply::Integer(1));
        server.join().unwrap();

        executor.run_argv_async(
            vec![b"PING".to_vec()],
            Box::new(move |r| tx.send(r).unwrap()),
        );
        assert!(rx.recv().unwrap().unwrap_err().is_unavailable());
        assert!(!executor.is_connected());
    }

    #[test]
    fn slow_reply_fails_only_the_in_flight_command() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            // First connection: answer after the client has given up.
            let (mut slow, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(slow.try_clone().unwrap());
            read_reply(&mut reader).unwrap();
            thread::sleep(Duration::from_millis(400));
            let _ = slow.write_all(b"+PONG\r\n");

            // Second connection: answer promptly.
            let (mut fresh, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(fresh.try_clone().unwrap());
            read_reply(&mut reader).unwrap();
            fresh.write_all(b"+PONG\r\n").unwrap();
        });

        let mut executor = RespExecutor::connect(&addr, Duration::from_millis(200)).unwrap();
        let (tx, rx) = mpsc::channel();
        let first = tx.clone();
        executor.run_argv_async(vec![b"PING".to_vec()], Box::new(move |r| first.send(r).unwrap()));
        assert!(rx.recv().unwrap().unwrap_err().is_unavailable());
        assert!(!executor.is_connected());

        thread::sleep(Duration::from_millis(300));
        executor.run_argv_async(vec![b"PING".to_vec()], Box::new(move |r| tx.send(r).unwrap()));
        assert_eq!(rx.recv().unwrap().unwrap(), CommandReply::Status("PONG".into()));
        assert!(executor.is_connected());
        server.join().unwrap();
    }
}
