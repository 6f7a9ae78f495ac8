use super::handler::MessageHandler;
use super::outbox::{Outbound, Outbox};
use super::session::SessionId;
use crate::config::BrokerConfig;
use crate::protocol::{Frame, FrameError, StompFrameCodec};
use crate::{Result, StompmqError};
use futures::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

/// What connection tasks report to the engine task.
#[derive(Debug)]
pub enum EngineEvent {
    Open {
        outbox: Outbox,
        reply: oneshot::Sender<SessionId>,
    },
    Frame {
        session: SessionId,
        frame: Frame,
    },
    Invalid {
        session: SessionId,
        error: FrameError,
    },
    Closed {
        session: SessionId,
    },
    Shutdown,
}

type EventSender = mpsc::UnboundedSender<EngineEvent>;
type FrameWriter = FramedWrite<OwnedWriteHalf, StompFrameCodec>;

/// TCP front end of the broker.
///
/// Every accepted connection gets a reader task, which splits the byte
/// stream into frames and forwards them to the engine, and a writer task,
/// which drains the connection's outbox. The [`MessageHandler`] lives in a
/// single engine task, so all protocol state has exactly one owner.
pub struct BrokerServer {
    config: Arc<BrokerConfig>,
    listener: TcpListener,
    handler: MessageHandler,
    // Graceful shutdown coordination
    shutdown_tx: broadcast::Sender<()>,
}

impl BrokerServer {
    pub async fn bind(handler: MessageHandler) -> Result<Self> {
        let config = Arc::new(handler.config().clone());
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| StompmqError::Network(format!("failed to bind {addr}: {e}")))?;
        let (shutdown_tx, _) = broadcast::channel(16);

        Ok(Self {
            config,
            listener,
            handler,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that stops the server when `()` is sent on it.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(());
    }

    pub async fn run(self) -> Result<()> {
        let BrokerServer {
            config,
            listener,
            handler,
            shutdown_tx,
        } = self;

        info!("stompmq broker listening on {}", listener.local_addr()?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = tokio::spawn(run_engine(handler, events_rx));
        let mut shutdown_rx = shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = optimize_client_socket(&stream) {
                                warn!("Failed to tune client socket {}: {}", peer_addr, e);
                            }
                            info!("New client connected: {}", peer_addr);

                            let config = Arc::clone(&config);
                            let events = events_tx.clone();
                            let shutdown = shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, config, events, shutdown).await {
                                    error!("Error handling client {}: {}", peer_addr, e);
                                } else {
                                    info!("Client {} disconnected", peer_addr);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping server gracefully...");
                    break;
                }
            }
        }

        let _ = events_tx.send(EngineEvent::Shutdown);
        if let Err(e) = engine.await {
            error!("Engine task failed: {}", e);
        }
        info!("Server shutdown complete");
        Ok(())
    }
}

async fn run_engine(mut handler: MessageHandler, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Open { outbox, reply } => {
                let session = handler.open_session(outbox);
                if reply.send(session).is_err() {
                    handler.close_session(session);
                }
            }
            EngineEvent::Frame { session, frame } => handler.handle_frame(session, frame),
            EngineEvent::Invalid { session, error } => {
                handler.handle_frame_error(session, &error)
            }
            EngineEvent::Closed { session } => handler.close_session(session),
            EngineEvent::Shutdown => break,
        }
    }
    handler.shutdown();
}

fn optimize_client_socket(stream: &TcpStream) -> Result<()> {
    use socket2::SockRef;

    let socket_ref = SockRef::from(stream);
    // Frames are small and interactive
    socket_ref.set_nodelay(true)?;
    socket_ref.set_keepalive(true)?;
    Ok(())
}

async fn handle_client(
    stream: TcpStream,
    config: Arc<BrokerConfig>,
    events: EventSender,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, StompFrameCodec::new(config.max_frame_size));
    let writer = FramedWrite::new(write_half, StompFrameCodec::new(config.max_frame_size));

    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    events
        .send(EngineEvent::Open {
            outbox,
            reply: reply_tx,
        })
        .map_err(|_| StompmqError::Network("engine is not running".to_string()))?;
    let session = reply_rx
        .await
        .map_err(|_| StompmqError::Network("engine is not running".to_string()))?;

    let mut writer_task: JoinHandle<Result<()>> = tokio::spawn(write_loop(writer, outbox_rx));
    let mut writer_done = false;

    loop {
        tokio::select! {
            next = tokio_stream::StreamExt::next(&mut reader) => {
                match next {
                    Some(Ok(raw)) => {
                        let event = match Frame::parse(raw, config.max_header_length) {
                            Ok(frame) => EngineEvent::Frame { session, frame },
                            Err(error) => EngineEvent::Invalid { session, error },
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Session {} read failed: {}", session, e);
                        break;
                    }
                    None => break,
                }
            }
            // The engine closed the connection (ERROR or DISCONNECT).
            result = &mut writer_task => {
                writer_done = true;
                log_writer_result(session, result);
                break;
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    let _ = events.send(EngineEvent::Closed { session });
    if !writer_done {
        // Closed drops the outbox, which lets the writer drain and exit.
        log_writer_result(session, writer_task.await);
    }
    Ok(())
}

fn log_writer_result(
    session: SessionId,
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => debug!("Session {} writer finished", session),
        Ok(Err(e)) => warn!("Session {} write failed: {}", session, e),
        Err(e) => error!("Session {} writer task failed: {}", session, e),
    }
}

async fn write_loop(
    mut writer: FrameWriter,
    mut outbox: mpsc::UnboundedReceiver<Outbound>,
) -> Result<()> {
    while let Some(message) = outbox.recv().await {
        match message {
            Outbound::Frame(frame) => writer.send(frame).await?,
            Outbound::Close => {
                writer.flush().await?;
                writer.get_mut().shutdown().await?;
                return Ok(());
            }
        }
    }
    writer.flush().await?;
    Ok(())
}
