use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The device node could not be opened at all.
    #[error("cannot open {}: {source}", path.display())]
    DeviceAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A probe query the device cannot be described without failed.
    #[error("{query} failed on {}: {source}", path.display())]
    CapabilityQuery {
        path: PathBuf,
        query: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("cannot synthesize {name:?}: {step} failed: {source}")]
    Synthesis {
        name: String,
        step: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("event type {0:#x} is listed twice")]
    DuplicateType(u16),

    #[error("code {code:#x} of event type {type_:#x} is listed twice")]
    DuplicateCode { type_: u16, code: u16 },

    #[error("virtual device {0:?} is already destroyed")]
    AlreadyDestroyed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
