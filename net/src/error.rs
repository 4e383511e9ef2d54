use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The envelope names an event nobody registered a decoder for.
    #[error("unknown event {0:?}")]
    UnknownEvent(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] bincode::Error),

    #[error("frame of {0} bytes exceeds the limit of {max} bytes", max = crate::MAX_FRAME_SIZE)]
    FrameTooLarge(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the connection has to be closed. A malformed frame was still
    /// read whole, so the stream stays in sync and only the frame is lost.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedFrame(_))
    }
}
