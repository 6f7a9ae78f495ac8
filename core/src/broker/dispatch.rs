//! Command table and per-command handlers.
//!
//! [`CommandTable::standard`] lists every command the broker knows, in a
//! fixed order, with its direction and (for client commands) the handler
//! that serves it. [`CommandTable::dispatch`] looks a request up, applies the
//! authentication gate and runs the handler; [`assemble`] turns the handler's
//! [`Response`] into the frames that go on the wire.

use super::outbox::Outboxes;
use super::session::{Response, Session};
use crate::config::BrokerConfig;
use crate::destination::{DestinationRegistry, RegistryError};
use crate::metrics::BrokerMetrics;
use crate::protocol::{
    Command, Frame, DESTINATION_HEADER, LOGIN_HEADER, MESSAGE_HEADER, PASSCODE_HEADER,
    RECEIPT_HEADER, SESSION_HEADER,
};
use crate::storage::StorageError;
use tracing::{debug, error, info, warn};

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Issued by clients.
    Inbound,
    /// Emitted by the broker.
    Outbound,
}

/// Why a request failed. The `Display` text becomes the `message` header of
/// the ERROR frame sent back to the client.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Receipt not allowed on CONNECT")]
    ReceiptOnConnect,

    #[error("Destination header missing")]
    DestinationMissing,

    #[error("Unknown command")]
    UnknownCommand,

    #[error(transparent)]
    Destination(#[from] RegistryError),

    #[error("Persistence failure")]
    Persistence(#[from] StorageError),
}

/// Everything a handler may touch while serving one request.
pub struct HandlerContext<'a> {
    pub session: &'a mut Session,
    pub registry: &'a mut DestinationRegistry,
    pub outboxes: &'a Outboxes,
    pub config: &'a BrokerConfig,
    pub metrics: &'a BrokerMetrics,
    pub table: &'a CommandTable,
}

pub trait CommandHandler: Send + Sync {
    /// Serves `request`, leaving any reply in the session's response. An
    /// `Err` is turned into an ERROR frame by the caller.
    fn handle(&self, ctx: &mut HandlerContext<'_>, request: &Frame) -> Result<(), ProtocolError>;
}

fn destination_header(request: &Frame) -> Result<&str, ProtocolError> {
    request
        .header(DESTINATION_HEADER)
        .ok_or(ProtocolError::DestinationMissing)
}

pub struct ConnectHandler;

impl CommandHandler for ConnectHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, request: &Frame) -> Result<(), ProtocolError> {
        if request.headers.contains(RECEIPT_HEADER) {
            return Err(ProtocolError::ReceiptOnConnect);
        }

        if ctx.config.auth_enabled() {
            let login = request.header(LOGIN_HEADER);
            let passcode = request.header(PASSCODE_HEADER);
            if login != Some(ctx.config.auth_user.as_str())
                || passcode != Some(ctx.config.auth_pass.as_str())
            {
                warn!(
                    "Session {} failed authentication as {:?}",
                    ctx.session.id(),
                    login
                );
                return Err(ProtocolError::AuthenticationFailed);
            }
        }

        ctx.session.authenticate();
        info!("Session {} authenticated", ctx.session.id());

        let mut response = Response::new(Command::Connected);
        response
            .headers
            .insert(SESSION_HEADER, ctx.session.id().to_string());
        ctx.session.set_response(response);
        Ok(())
    }
}

pub struct SendHandler;

impl CommandHandler for SendHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, request: &Frame) -> Result<(), ProtocolError> {
        let name = destination_header(request)?;
        let log = ctx.registry.log().clone();
        let destination = ctx.registry.get_or_create(name)?;

        if destination.is_durable() {
            let seq = destination.persist(&log, &request.body)?;
            ctx.metrics.message_persisted();
            debug!("Persisted {} bytes to {} as #{}", request.body.len(), name, seq);
        }
        let subscribers = destination.subscribers().to_vec();
        ctx.metrics.update_destination_count(ctx.registry.len());

        let message = Response {
            command: Some(Command::Message),
            headers: request.headers.clone(),
            body: request.body.clone(),
        };
        let assembled = assemble(ctx.table, None, message);

        // A subscriber that cannot be reached is skipped; the sender never
        // sees it.
        for subscriber in subscribers {
            let delivered = assembled
                .frames
                .iter()
                .try_for_each(|frame| ctx.outboxes.deliver(subscriber, frame.clone()));
            match delivered {
                Ok(()) => ctx.metrics.message_delivered(),
                Err(e) => {
                    warn!("Delivery to session {} on {} failed: {}", subscriber, name, e);
                    ctx.metrics.delivery_failed();
                }
            }
        }

        ctx.session.set_response(Response::none());
        Ok(())
    }
}

pub struct SubscribeHandler;

impl CommandHandler for SubscribeHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, request: &Frame) -> Result<(), ProtocolError> {
        let name = destination_header(request)?;
        let session = ctx.session.id();

        if ctx.registry.get_or_create(name)?.subscribe(session) {
            debug!("Session {} subscribed to {}", session, name);
        } else {
            debug!("Session {} already subscribed to {}", session, name);
        }
        ctx.metrics.update_destination_count(ctx.registry.len());

        ctx.session.set_response(Response::none());
        Ok(())
    }
}

pub struct UnsubscribeHandler;

impl CommandHandler for UnsubscribeHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, request: &Frame) -> Result<(), ProtocolError> {
        let name = destination_header(request)?;
        let session = ctx.session.id();

        let removed = ctx
            .registry
            .find_mut(name)
            .map(|destination| destination.unsubscribe(session))
            .unwrap_or(false);
        if removed {
            debug!("Session {} unsubscribed from {}", session, name);
        }

        ctx.session.set_response(Response::none());
        Ok(())
    }
}

/// Acknowledgements are accepted and ignored.
pub struct AckHandler;

impl CommandHandler for AckHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, _request: &Frame) -> Result<(), ProtocolError> {
        ctx.session.set_response(Response::none());
        Ok(())
    }
}

pub struct DisconnectHandler;

impl CommandHandler for DisconnectHandler {
    fn handle(&self, ctx: &mut HandlerContext<'_>, _request: &Frame) -> Result<(), ProtocolError> {
        debug!("Session {} disconnecting", ctx.session.id());
        ctx.session.begin_close();
        ctx.session.set_response(Response::none());
        Ok(())
    }
}

pub struct CommandEntry {
    pub command: Command,
    pub direction: Direction,
    handler: Option<Box<dyn CommandHandler>>,
}

impl CommandEntry {
    fn inbound(command: Command, handler: impl CommandHandler + 'static) -> Self {
        Self {
            command,
            direction: Direction::Inbound,
            handler: Some(Box::new(handler)),
        }
    }

    fn outbound(command: Command) -> Self {
        Self {
            command,
            direction: Direction::Outbound,
            handler: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.command.as_str()
    }
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("command", &self.command)
            .field("direction", &self.direction)
            .finish()
    }
}

#[derive(Debug)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn standard() -> Self {
        Self {
            entries: vec![
                CommandEntry::inbound(Command::Connect, ConnectHandler),
                CommandEntry::outbound(Command::Connected),
                CommandEntry::inbound(Command::Send, SendHandler),
                CommandEntry::outbound(Command::Message),
                CommandEntry::inbound(Command::Subscribe, SubscribeHandler),
                CommandEntry::inbound(Command::Unsubscribe, UnsubscribeHandler),
                CommandEntry::inbound(Command::Ack, AckHandler),
                CommandEntry::outbound(Command::Receipt),
                CommandEntry::inbound(Command::Disconnect, DisconnectHandler),
                CommandEntry::outbound(Command::Error),
            ],
        }
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// First entry, in table order, whose name is exactly `name`.
    pub fn lookup(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    pub fn is_outbound(&self, command: Command) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.command == command && entry.direction == Direction::Outbound)
    }

    /// Runs the handler for `request`. CONNECT and DISCONNECT are the only
    /// commands served before authentication.
    pub fn dispatch(
        &self,
        ctx: &mut HandlerContext<'_>,
        request: &Frame,
    ) -> Result<(), ProtocolError> {
        let entry = self
            .lookup(&request.command)
            .filter(|entry| entry.direction == Direction::Inbound)
            .ok_or(ProtocolError::UnknownCommand)?;

        let exempt = matches!(entry.command, Command::Connect | Command::Disconnect);
        if !exempt && !ctx.session.is_authenticated() {
            return Err(ProtocolError::AuthenticationRequired);
        }

        let handler = entry
            .handler
            .as_deref()
            .ok_or(ProtocolError::UnknownCommand)?;
        handler.handle(ctx, request)
    }
}

/// Wire frames produced for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembled {
    pub frames: Vec<Frame>,
    /// The connection must be closed once the frames are flushed.
    pub terminal: bool,
}

/// Builds the frames for `response`: a RECEIPT first when `receipt` is set
/// and the outcome is not an ERROR, then the response itself. A response
/// command that is not an outbound table entry is a broker defect and is
/// replaced with a generic internal-error frame.
pub fn assemble(table: &CommandTable, receipt: Option<&str>, response: Response) -> Assembled {
    let mut assembled = Assembled {
        frames: Vec::with_capacity(2),
        terminal: response.is_error(),
    };

    if let Some(receipt) = receipt {
        if !response.is_error() {
            assembled
                .frames
                .push(Frame::new(Command::Receipt).with_header(RECEIPT_HEADER, receipt));
        }
    }

    let Some(command) = response.command else {
        return assembled;
    };

    if table.is_outbound(command) {
        let mut headers = response.headers;
        headers.remove(RECEIPT_HEADER);
        assembled.frames.push(Frame {
            command: command.as_str().to_string(),
            headers,
            body: response.body,
        });
    } else {
        error!("Response command {} has no outbound table entry", command);
        assembled.frames.push(internal_error());
        assembled.terminal = true;
    }
    assembled
}

pub fn internal_error() -> Frame {
    Frame::new(Command::Error).with_header(MESSAGE_HEADER, INTERNAL_ERROR_MESSAGE)
}
