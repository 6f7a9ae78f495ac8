//! STOMP frame model and its text wire format.
//!
//! A frame on the wire is:
//!
//! ```text
//! COMMAND\n
//! name:value\n        (zero or more)
//! \n
//! BODY\0
//! ```
//!
//! Header lines may end in `\r\n` or `\n`. Header values are not escaped, so
//! values containing `:` are kept verbatim after the first colon and values
//! containing newlines cannot be represented.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Byte that terminates every frame.
pub const FRAME_TERMINATOR: u8 = b'\0';

pub const DESTINATION_HEADER: &str = "destination";
pub const LOGIN_HEADER: &str = "login";
pub const PASSCODE_HEADER: &str = "passcode";
pub const MESSAGE_HEADER: &str = "message";
pub const SESSION_HEADER: &str = "session";
/// Request header asking for a RECEIPT. Only RECEIPT frames carry it on the
/// wire; it is dropped when any other frame is serialized.
pub const RECEIPT_HEADER: &str = "receipt";

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("header line of {len} bytes exceeds the {max} byte limit")]
    HeaderTooLong { len: usize, max: usize },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("frame has no command line")]
    MissingCommand,

    #[error("frame headers are not valid UTF-8")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every command name the broker knows about, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Message,
    Subscribe,
    Unsubscribe,
    Ack,
    Receipt,
    Disconnect,
    Error,
}

impl Command {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Receipt => "RECEIPT",
            Command::Disconnect => "DISCONNECT",
            Command::Error => "ERROR",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list with first-wins semantics for repeated names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header unless one with the same name is already present.
    /// Returns `false` when the header was dropped as a duplicate.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value.into()));
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// One protocol message: command line, ordered headers and a raw body.
///
/// Inbound frames keep the command line exactly as the client sent it so that
/// dispatch can reject names it does not know; frames built by the broker use
/// [`Frame::new`] with a [`Command`].
///
/// ```
/// use stompmq::protocol::{Command, Frame};
///
/// let frame = Frame::new(Command::Send)
///     .with_header("destination", "/queue/x")
///     .with_body("hello");
/// let wire = frame.to_bytes();
/// assert_eq!(&wire[..], b"SEND\ndestination:/queue/x\n\nhello\0");
///
/// let decoded = Frame::parse(wire.slice(..wire.len() - 1), 1024).unwrap();
/// assert_eq!(decoded, frame);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command: command.as_str().to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Parses one frame whose terminator has already been stripped.
    ///
    /// Leading blank lines (left over from a previous frame's trailing
    /// newline) are skipped. Header lines without a colon are ignored and
    /// repeated header names keep their first value. Any line of the header
    /// block longer than `max_header_len` rejects the whole frame.
    pub fn parse(raw: Bytes, max_header_len: usize) -> Result<Self, FrameError> {
        let start = raw
            .iter()
            .position(|b| *b != b'\r' && *b != b'\n')
            .unwrap_or(raw.len());

        let mut cursor = start;
        let mut command: Option<String> = None;
        let mut headers = Headers::new();
        let mut body_start = raw.len();

        while cursor < raw.len() {
            let (line, next) = match raw[cursor..].iter().position(|b| *b == b'\n') {
                Some(offset) => (&raw[cursor..cursor + offset], cursor + offset + 1),
                None => (&raw[cursor..], raw.len()),
            };
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            cursor = next;

            if line.len() > max_header_len {
                return Err(FrameError::HeaderTooLong {
                    len: line.len(),
                    max: max_header_len,
                });
            }

            if line.is_empty() {
                body_start = cursor;
                break;
            }

            let line = std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
            if command.is_none() {
                command = Some(line.trim_end().to_string());
                continue;
            }

            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name, value.trim_start_matches([' ', '\t']));
            }
        }

        let command = command
            .filter(|command| !command.is_empty())
            .ok_or(FrameError::MissingCommand)?;
        let body = if body_start < raw.len() {
            raw.slice(body_start..)
        } else {
            Bytes::new()
        };

        Ok(Self {
            command,
            headers,
            body,
        })
    }

    /// Serializes the frame, terminator included.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let keep_receipt = self.command == Command::Receipt.as_str();

        dst.reserve(self.encoded_len_hint());
        dst.put_slice(self.command.as_bytes());
        dst.put_u8(b'\n');
        for (name, value) in self.headers.iter() {
            if name == RECEIPT_HEADER && !keep_receipt {
                continue;
            }
            dst.put_slice(name.as_bytes());
            dst.put_u8(b':');
            dst.put_slice(value.as_bytes());
            dst.put_u8(b'\n');
        }
        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(FRAME_TERMINATOR);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    fn encoded_len_hint(&self) -> usize {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.len() + value.len() + 2)
            .sum();
        self.command.len() + headers + self.body.len() + 3
    }
}
