use super::dispatch::{assemble, CommandTable, HandlerContext};
use super::outbox::{Outbox, Outboxes};
use super::session::{Response, Session, SessionId};
use crate::config::BrokerConfig;
use crate::destination::DestinationRegistry;
use crate::metrics::BrokerMetrics;
use crate::protocol::{Frame, FrameError, RECEIPT_HEADER};
use crate::storage::MessageLog;
use crate::{Result, StompmqError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The protocol engine.
///
/// Owns every piece of mutable broker state (sessions, the destination
/// registry, connection outboxes) and processes one request at a time. The
/// server runs it inside a single task, so a request, including its durable
/// append and the whole fan-out, completes before the next one starts.
///
/// Fan-out only queues frames on unbounded outboxes; a slow subscriber
/// grows its own queue rather than stalling the engine, and nothing bounds
/// that queue.
pub struct MessageHandler {
    config: Arc<BrokerConfig>,
    table: CommandTable,
    registry: DestinationRegistry,
    sessions: HashMap<SessionId, Session>,
    outboxes: Outboxes,
    next_session_id: u64,
    metrics: Arc<BrokerMetrics>,
}

impl MessageHandler {
    pub fn new(config: BrokerConfig, log: MessageLog) -> Self {
        let registry = DestinationRegistry::new(
            log,
            config.volatile_prefix.clone(),
            config.max_destination_length,
        );
        Self {
            config: Arc::new(config),
            table: CommandTable::standard(),
            registry,
            sessions: HashMap::new(),
            outboxes: Outboxes::new(),
            next_session_id: 0,
            metrics: Arc::new(BrokerMetrics::new()),
        }
    }

    /// Opens the message log named by `config` (or an in-memory one when no
    /// database file is configured) and builds the engine on top of it.
    /// Rejects a configuration that fails [`BrokerConfig::validate`].
    pub fn open(config: BrokerConfig) -> Result<Self> {
        config.validate().map_err(StompmqError::Config)?;

        let log = match config.db_path() {
            Some(path) => MessageLog::open(path, config.cache_size)?,
            None => {
                warn!("No dbFile configured, durable destinations are kept in memory only");
                MessageLog::in_memory()
            }
        };
        Ok(Self::new(config, log))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Registers a new connection. Ids are handed out from 0 and never
    /// reused.
    pub fn open_session(&mut self, outbox: Outbox) -> SessionId {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        self.sessions.insert(id, Session::new(id));
        self.outboxes.insert(id, outbox);
        self.metrics.connection_opened();
        debug!("Opened session {}", id);
        id
    }

    /// Serves one request from `id` and queues the resulting frames. An
    /// ERROR outcome or a DISCONNECT closes the connection after the frames.
    pub fn handle_frame(&mut self, id: SessionId, request: Frame) {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!("Dropping {} for unknown session {}", request.command, id);
            return;
        };
        if session.is_closing() {
            debug!("Session {} is closing, ignoring {}", id, request.command);
            return;
        }
        self.metrics.frame_received();

        let mut ctx = HandlerContext {
            session: &mut *session,
            registry: &mut self.registry,
            outboxes: &self.outboxes,
            config: &self.config,
            metrics: &self.metrics,
            table: &self.table,
        };
        if let Err(e) = self.table.dispatch(&mut ctx, &request) {
            warn!("Session {} {} rejected: {}", id, request.command, e);
            ctx.session.set_response(Response::error(e.to_string()));
        }

        let response = session.take_response();
        let closing = session.is_closing();
        let assembled = assemble(
            &self.table,
            request.header(RECEIPT_HEADER),
            response,
        );
        if assembled.terminal {
            self.metrics.error_response();
        }

        for frame in assembled.frames {
            if let Err(e) = self.outboxes.deliver(id, frame) {
                debug!("Reply to session {} dropped: {}", id, e);
            }
        }

        if assembled.terminal || closing {
            self.teardown(id);
        }
    }

    /// A complete frame from `id` could not be parsed. Only that request is
    /// lost; nothing is sent back.
    pub fn handle_frame_error(&mut self, id: SessionId, error: &FrameError) {
        self.metrics.frame_error();
        warn!("Session {} sent a malformed frame: {}", id, error);
    }

    /// The transport reports the connection gone. Safe to call more than
    /// once and at any point, including for a session already torn down.
    pub fn close_session(&mut self, id: SessionId) {
        let Some(mut session) = self.sessions.remove(&id) else {
            return;
        };
        session.close();
        self.outboxes.remove(id);
        self.registry.remove_subscriber(id);
        self.metrics.connection_closed();
        debug!("Closed session {}", id);
    }

    /// Closes every connection, used on broker shutdown.
    pub fn shutdown(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.teardown(id);
            self.close_session(id);
        }
        info!("Broker stopped: {}", self.metrics.snapshot().report());
    }

    // Moves the session to Closing, asks its writer to flush and close, and
    // unsubscribes it everywhere. The session entry itself goes away when the
    // transport reports the disconnect.
    fn teardown(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.begin_close();
        }
        self.outboxes.close(id);
        self.registry.remove_subscriber(id);
    }
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler")
            .field("sessions", &self.sessions.len())
            .field("destinations", &self.registry.len())
            .field("next_session_id", &self.next_session_id)
            .finish_non_exhaustive()
    }
}
