//! Error types for sandboxed execution

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("output streams were already taken from the sandboxed process")]
    OutputAlreadyTaken,

    #[error("failed to wait for sandboxed process: {0}")]
    Wait(#[source] io::Error),

    #[error("event transport closed")]
    TransportClosed,
}

pub type Result<T> = std::result::Result<T, SandboxError>;
