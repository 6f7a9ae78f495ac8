use crate::protocol::{Command, Headers, MESSAGE_HEADER};
use bytes::Bytes;
use std::fmt;

/// Stable arena index of a connection's session. Subscriber lists store
/// these instead of references so a session can go away independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// DISCONNECT or ERROR is being flushed; further requests are ignored.
    Closing,
    Closed,
}

/// The reply a handler builds for the current request.
///
/// `command == None` means no frame is sent (besides a requested RECEIPT).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub command: Option<Command>,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(command: Command) -> Self {
        Self {
            command: Some(command),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut response = Self::new(Command::Error);
        response.headers.insert(MESSAGE_HEADER, message);
        response
    }

    pub fn is_error(&self) -> bool {
        self.command == Some(Command::Error)
    }
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    response: Response,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Unauthenticated,
            response: Response::none(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn is_closing(&self) -> bool {
        matches!(self.state, SessionState::Closing | SessionState::Closed)
    }

    pub fn authenticate(&mut self) {
        if self.state == SessionState::Unauthenticated {
            self.state = SessionState::Authenticated;
        }
    }

    /// Drops authentication and stops accepting requests.
    pub fn begin_close(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closing;
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn set_response(&mut self, response: Response) {
        self.response = response;
    }

    /// Hands the response over to assembly, leaving "no frame" behind for
    /// the next request.
    pub fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }
}
