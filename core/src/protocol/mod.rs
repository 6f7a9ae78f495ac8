//! # stompmq Protocol Module
//!
//! The text wire protocol spoken by the broker: a STOMP-style frame of a
//! command line, `name:value` header lines, a blank line, a raw body and a
//! NUL terminator.
//!
//! ## Modules
//!
//! - [`frame`] - [`Command`], ordered [`Headers`] and [`Frame`] parsing and
//!   serialization
//! - [`codec`] - [`StompFrameCodec`], the `tokio_util` codec that splits a
//!   TCP byte stream into frames and writes frames back out
//!
//! ## Limitations
//!
//! Header values are not escaped. A value may contain `:` (everything after
//! the first colon is the value) but cannot contain a newline, and bodies
//! cannot contain a NUL byte since there is no `content-length` support.

pub mod codec;
pub mod frame;
pub mod tests;

pub use codec::{StompFrameCodec, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_HEADER_LENGTH};
pub use frame::*;
