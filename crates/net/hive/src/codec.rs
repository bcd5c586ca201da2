//! Length-prefixed codec for hive protocol messages.

use bytes::{Buf, BufMut, BytesMut};

use crate::{HiveMessage, MAX_MESSAGE_SIZE};

const LENGTH_PREFIX: usize = 4;

/// Error type for hive codec operations.
#[derive(Debug, thiserror::Error)]
pub enum HiveCodecError {
    /// IO error during read/write
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Frame larger than the codec's limit
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    /// Body could not be (de)serialized
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<postcard::Error> for HiveCodecError {
    fn from(error: postcard::Error) -> Self {
        HiveCodecError::Protocol(error.to_string())
    }
}

/// Codec for [`HiveMessage`] frames: a big-endian `u32` body length
/// followed by the postcard-encoded body.
#[derive(Debug, Clone, Copy)]
pub struct HiveCodec {
    max_message_size: usize,
}

impl HiveCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for HiveCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl asynchronous_codec::Encoder for HiveCodec {
    type Item<'a> = HiveMessage;
    type Error = HiveCodecError;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = postcard::to_allocvec(&item)?;
        if body.len() > self.max_message_size {
            return Err(HiveCodecError::MessageTooLarge {
                size: body.len(),
                max: self.max_message_size,
            });
        }
        dst.reserve(LENGTH_PREFIX + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl asynchronous_codec::Decoder for HiveCodec {
    type Item = HiveMessage;
    type Error = HiveCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(prefix) = src.get(..LENGTH_PREFIX) else {
            return Ok(None);
        };
        let mut len_bytes = [0u8; LENGTH_PREFIX];
        len_bytes.copy_from_slice(prefix);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > self.max_message_size {
            return Err(HiveCodecError::MessageTooLarge { size: len, max: self.max_message_size });
        }

        let frame_len = LENGTH_PREFIX + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let body = src.split_to(len);
        Ok(Some(postcard::from_bytes(&body)?))
    }
}
