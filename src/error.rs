use std::io;

use thiserror::Error;

/// Errors returned by [`Socket`](crate::Socket) operations.
///
/// Engine failures are carried verbatim in [`Error::Io`]; every other variant is
/// detected locally before the engine is called.
#[derive(Debug, Error)]
pub enum Error {
    #[error("engine error: {0}")]
    Io(#[from] io::Error),

    #[error("destination address required on a socket not bound to a peer")]
    MissingAddress,

    #[error("destination address given on a peer-bound socket")]
    AddressOnConnected,

    #[error("connected-mode call on a socket not bound to a peer")]
    NotPeerBound,

    #[error("socket is already bound to a peer")]
    AlreadyPeerBound,

    #[error("engine accepted {accepted} of {len} bytes")]
    PartialAccept { accepted: usize, len: usize },

    #[error("engine accepted the request without minting an identifier")]
    NoIdentifier,
}

impl Error {
    /// Return the OS error code if this error came from the engine.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Return `true` if this error was raised locally because of how the socket is bound.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::MissingAddress
                | Error::AddressOnConnected
                | Error::NotPeerBound
                | Error::AlreadyPeerBound
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
