//! # stompmq Broker Module
//!
//! Session handling, command dispatch and the TCP server.
//!
//! ## Architecture
//!
//! - [`session`] - per-connection [`Session`] state machine
//!   (`Unauthenticated -> Authenticated -> Closing -> Closed`)
//! - [`dispatch`] - the ordered [`CommandTable`], one [`CommandHandler`] per
//!   client command, and response assembly
//! - [`handler`] - [`MessageHandler`], the protocol engine that owns all
//!   broker state and serves one request at a time
//! - [`outbox`] - per-connection write queues the engine delivers frames to
//! - [`server`] - [`BrokerServer`], the tokio TCP front end
//!
//! ```text
//! reader task ──EngineEvent──▶ engine task (MessageHandler) ──Outbound──▶ writer task
//!  (per conn)                     (single owner of state)                  (per conn)
//! ```
//!
//! ## Error policy
//!
//! Every ERROR sent to a client ends its connection. A malformed frame only
//! costs that request and is logged; a partial frame that grows past
//! `maxFrameSize` closes the connection.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use stompmq::{BrokerConfig, BrokerServer, MessageHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig::default().with_credentials("guest", "guest");
//!     let handler = MessageHandler::open(config)?;
//!     let server = BrokerServer::bind(handler).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod handler;
pub mod outbox;
pub mod server;
pub mod session;

pub use dispatch::{
    assemble, Assembled, CommandHandler, CommandTable, Direction, HandlerContext, ProtocolError,
};
pub use handler::MessageHandler;
pub use outbox::{DeliveryError, Outbound, Outbox, Outboxes};
pub use server::{BrokerServer, EngineEvent};
pub use session::{Response, Session, SessionId, SessionState};
