use super::frame::{Frame, FrameError, FRAME_TERMINATOR};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;
pub const DEFAULT_MAX_HEADER_LENGTH: usize = 1024;

/// Splits a byte stream on the frame terminator.
///
/// Decoding yields the raw frame bytes with the terminator removed; turning
/// them into a [`Frame`] is left to [`Frame::parse`] so that a malformed frame
/// only costs the request, not the connection. A partial frame that grows
/// past `max_frame_size` without a terminator is a connection-level error.
#[derive(Debug, Clone)]
pub struct StompFrameCodec {
    max_frame_size: usize,
    // Bytes already scanned for a terminator in the current buffer.
    next_index: usize,
}

impl StompFrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            next_index: 0,
        }
    }
}

impl Default for StompFrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for StompFrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let terminator = src[self.next_index..]
            .iter()
            .position(|b| *b == FRAME_TERMINATOR)
            .map(|offset| self.next_index + offset);

        match terminator {
            Some(index) => {
                self.next_index = 0;
                let mut frame = src.split_to(index + 1);
                frame.truncate(index);
                Ok(Some(frame.freeze()))
            }
            None if src.len() > self.max_frame_size => Err(FrameError::FrameTooLarge {
                len: src.len(),
                max: self.max_frame_size,
            }),
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.iter().any(|b| !b.is_ascii_whitespace()) {
            debug!("Dropping {} bytes of unterminated frame at EOF", src.len());
        }
        src.clear();
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<Frame> for StompFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}
