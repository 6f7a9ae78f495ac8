//! # stompmq Core Library
//!
//! stompmq is a small STOMP-style message broker with an embedded durable
//! message log. Clients connect over TCP, authenticate, subscribe to named
//! destinations and send messages that are fanned out to every current
//! subscriber.
//!
//! ## Features
//!
//! - **Text frame protocol**: `COMMAND\n(header:value\n)*\nBODY\0` frames
//!   with first-wins header semantics
//! - **Durable queues**: messages sent to any destination outside the
//!   volatile prefix are appended to an embedded SQLite key-value log with
//!   synchronous commits before they are delivered
//! - **Volatile topics**: destinations under `/topic/` are fan-out only
//! - **Receipts**: a `receipt` header on a request yields a RECEIPT frame
//!   ahead of the response
//!
//! ## Architecture Overview
//!
//! - [`protocol`] - frame parsing, serialization and the tokio codec
//! - [`storage`] - the append-only message log and its key-value backends
//! - [`destination`] - the destination registry and subscriber lists
//! - [`broker`] - sessions, command dispatch, the protocol engine and the
//!   TCP server
//! - [`config`] - broker configuration from file and environment
//! - [`metrics`] - lock-free broker counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stompmq::{BrokerConfig, BrokerServer, MessageHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig {
//!         listen_port: 61613,
//!         ..Default::default()
//!     };
//!
//!     let server = BrokerServer::bind(MessageHandler::open(config)?).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! All protocol state is owned by one engine task and requests are served
//! strictly one after another. Sequence numbers, subscriber lists and session
//! state therefore need no locking. Fan-out queues frames on unbounded
//! per-connection outboxes without backpressure.

pub mod broker;
pub mod config;
pub mod destination;
pub mod metrics;
pub mod protocol;
pub mod storage;

pub use broker::{BrokerServer, MessageHandler, SessionId};
pub use config::BrokerConfig;
pub use destination::{Destination, DestinationRegistry, RegistryError};
pub use metrics::{BrokerMetrics, MetricsSnapshot};
pub use protocol::{Command, Frame, FrameError, Headers, StompFrameCodec};
pub use storage::{MessageLog, StorageError};

use thiserror::Error;

/// stompmq error types
///
/// Errors surfaced to callers of the library and to `main`. Problems inside a
/// single client request never show up here; they become ERROR frames.
///
/// # Example
///
/// ```rust,no_run
/// use stompmq::{Result, StompmqError};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(()) => println!("Success"),
///         Err(StompmqError::Storage(e)) => println!("Storage error: {}", e),
///         Err(StompmqError::Network(msg)) => println!("Network error: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum StompmqError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration validation and parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message log failures, including failure to open the database
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Listener and connection failures
    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for stompmq operations
pub type Result<T> = std::result::Result<T, StompmqError>;
