//! Length-prefixed, channel-tagged framing for TCP streams.
//!
//! Every message on the wire is a frame:
//!
//! ```text
//! +-------------------+-----------+--------------------+
//! | length (4 bytes)  | channel   |   body             |
//! | u32 little-endian | u8        |   (length-1 bytes) |
//! +-------------------+-----------+--------------------+
//! ```
//!
//! The length covers the channel byte and the body, not the prefix itself.
//! A length of 0 is a keepalive frame and is skipped by [`read_frame`].

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::transport::Channel;

/// Limits applied while reading and writing frames.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed frame length (channel byte + body). Default: 1 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576,
        }
    }
}

/// Failure to read or write one frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame length exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual frame length.
        size: u32,
        /// The limit from [`FrameConfig`].
        max: u32,
    },

    /// The channel byte does not name a known channel.
    #[error("unknown channel {0}")]
    UnknownChannel(u8),

    /// The stream ended in the middle of a frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// Underlying stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read a single frame from the stream, skipping keepalives.
///
/// Returns the channel and body. Returns [`FrameError::ConnectionClosed`] if
/// the peer closes the connection before the frame is complete.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<(Channel, Vec<u8>), FrameError> {
    loop {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await.map_err(map_eof)?;
        let frame_len = u32::from_le_bytes(len_buf);

        if frame_len > config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame_len,
                max: config.max_payload_size,
            });
        }
        if frame_len == 0 {
            continue;
        }

        let channel_byte = reader.read_u8().await.map_err(map_eof)?;
        let channel = Channel::from_byte(channel_byte).ok_or(FrameError::UnknownChannel(channel_byte))?;

        let mut body = vec![0u8; frame_len as usize - 1];
        if !body.is_empty() {
            reader.read_exact(&mut body).await.map_err(map_eof)?;
        }
        return Ok((channel, body));
    }
}

/// Write a single frame to the stream and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    channel: Channel,
    body: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = body.len() as u64 + 1;
    if len > u64::from(config.max_payload_size) {
        return Err(FrameError::PayloadTooLarge {
            size: u32::try_from(len).unwrap_or(u32::MAX),
            max: config.max_payload_size,
        });
    }

    writer.write_all(&(len as u32).to_le_bytes()).await?;
    writer.write_u8(channel as u8).await?;
    if !body.is_empty() {
        writer.write_all(body).await?;
    }
    writer.flush().await?;

    Ok(())
}
