//! Message channel adapter: one message, one or many segments, one engine call.

use std::io::IoSlice;
use std::slice;

use crate::ctrl::ControlBlock;
use crate::error::{Error, Result};
use crate::transport::{Engine, Sent};
use crate::type_alias::*;

/// Message body.
///
/// Both forms describe the same bytes: chunks are concatenated in order with
/// no padding between them.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Contiguous(&'a [u8]),
    Chunks(&'a [IoSlice<'a>]),
}

impl Payload<'_> {
    /// Total message length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Payload::Contiguous(buf) => buf.len(),
            Payload::Chunks(chunks) => chunks.iter().map(|c| c.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(buf: &'a [u8]) -> Self {
        Payload::Contiguous(buf)
    }
}

impl<'a> From<&'a [IoSlice<'a>]> for Payload<'a> {
    fn from(chunks: &'a [IoSlice<'a>]) -> Self {
        Payload::Chunks(chunks)
    }
}

/// How a socket is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Shared socket: every send names its destination.
    Unbound,

    /// Bound to exactly one peer: sends never name a destination.
    Peer(PeerAddr),
}

impl Binding {
    pub fn peer(&self) -> Option<PeerAddr> {
        match self {
            Binding::Unbound => None,
            Binding::Peer(peer) => Some(*peer),
        }
    }

    /// Check `dest` against this binding.
    pub(crate) fn check_dest(&self, dest: Option<&PeerAddr>) -> Result<()> {
        match (self, dest) {
            (Binding::Unbound, None) => Err(Error::MissingAddress),
            (Binding::Peer(_), Some(_)) => Err(Error::AddressOnConnected),
            _ => Ok(()),
        }
    }
}

/// Hand one message to the engine.
///
/// On success the whole message has been accepted and `ctrl` holds whatever
/// the engine wrote back. On failure `ctrl.id()` is meaningless.
pub(crate) fn transmit<E: Engine>(
    engine: &E,
    handle: E::Handle,
    binding: Binding,
    payload: Payload<'_>,
    ctrl: &mut ControlBlock,
    dest: Option<&PeerAddr>,
) -> Result<Sent> {
    binding.check_dest(dest)?;

    let len = payload.len();
    let single;
    let segments = match payload {
        Payload::Contiguous(buf) => {
            single = IoSlice::new(buf);
            slice::from_ref(&single)
        }
        Payload::Chunks(chunks) => chunks,
    };

    log::trace!(
        "send on {:?}: {} bytes in {} segment(s), {:?}, dest {:?}",
        handle,
        len,
        segments.len(),
        ctrl,
        dest.copied().or(binding.peer())
    );

    match engine.send_message(handle, segments, ctrl, dest)? {
        Sent::Accepted(accepted) if accepted != len => {
            log::warn!(
                "send on {:?}: engine accepted {} of {} bytes",
                handle,
                accepted,
                len
            );
            Err(Error::PartialAccept { accepted, len })
        }
        sent => Ok(sent),
    }
}
