mod codec;
mod error;
mod message;

pub use codec::{decode, encode, registered};
pub use error::Error;
pub use message::{
    Announcement, AnnouncementResponse, CreateDevice, DeviceEvent, EventName, Message,
};

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u16 = 1;

/// Upper bound for a single write; a peer that stops reading for longer is
/// considered gone.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest frame accepted in either direction.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub async fn write_frame<T>(stream: &mut T, frame: &[u8]) -> Result<(), Error>
where
    T: AsyncWrite + Unpin,
{
    if frame.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(frame.len()));
    }

    let mut data = Vec::with_capacity(4 + frame.len());
    data.extend_from_slice(&(frame.len() as u32).to_be_bytes());
    data.extend_from_slice(frame);

    stream.write_all(&data).await?;
    stream.flush().await?;

    Ok(())
}

/// Reads one length prefixed frame. An oversized length is rejected before
/// anything is allocated; the stream cannot be trusted afterwards.
pub async fn read_frame<T>(stream: &mut T) -> Result<Vec<u8>, Error>
where
    T: AsyncRead + Unpin,
{
    let length = stream.read_u32().await? as usize;
    if length > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(length));
    }

    let mut frame = vec![0; length];
    stream.read_exact(&mut frame).await?;

    Ok(frame)
}

pub async fn read_message<T>(stream: &mut T) -> Result<Message, Error>
where
    T: AsyncRead + Unpin,
{
    let frame = read_frame(stream).await?;
    decode(&frame)
}

pub async fn write_message<T>(stream: &mut T, message: &Message) -> Result<(), Error>
where
    T: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    write_frame(stream, &frame).await
}
