//! The engine seam.
//!
//! The transport engine (normally the Homa kernel module) owns every RPC record,
//! mints identifiers and does the actual delivery. This library only reaches it
//! through the three primitives of [`Engine`].

pub mod kernel;
pub mod loopback;

use std::fmt::Debug;
use std::io::{self, IoSlice};

use crate::ctrl::{AbortArgs, ControlBlock};
use crate::type_alias::*;

pub use self::kernel::KernelEngine;
pub use self::loopback::LoopbackEngine;

/// Outcome of an accepted message transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    /// The whole message was accepted; carries the number of bytes.
    Accepted(usize),

    /// The response named no pending request from that peer. Nothing was sent.
    Stale,
}

/// Outcome of a control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// At least one RPC was affected (or the message was sent).
    Applied,

    /// Nothing matched. Still a success.
    NotFound,
}

/// Control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    /// Abort one client RPC (`id != 0`) or all of them (`id == 0`).
    Abort(AbortArgs),
}

/// Socket options that produce a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOpt {
    /// Peel off a socket dedicated to one peer.
    PeelOff,
}

/// Trait for the external transport engine.
///
/// Implementations must not retry, reorder arguments or cache handles; every
/// failure is reported as the engine produced it.
pub trait Engine {
    /// Socket handle type. Its lifetime is managed by the caller.
    type Handle: Copy + Debug;

    /// Transfer one message.
    ///
    /// `segments` are concatenated in order. For a request (`ctrl.is_request()`)
    /// the engine writes the minted identifier into `ctrl` before returning
    /// success. `dest` is `None` on peer-bound handles.
    fn send_message(
        &self,
        handle: Self::Handle,
        segments: &[IoSlice<'_>],
        ctrl: &mut ControlBlock,
        dest: Option<&PeerAddr>,
    ) -> io::Result<Sent>;

    /// Perform a control operation on `handle`.
    fn control(&self, handle: Self::Handle, op: ControlOp) -> io::Result<Ack>;

    /// Query a socket option that yields a new handle addressed to `addr`.
    fn query_option(
        &self,
        handle: Self::Handle,
        opt: SockOpt,
        addr: &PeerAddr,
    ) -> io::Result<Self::Handle>;
}

impl<E: Engine + ?Sized> Engine for &E {
    type Handle = E::Handle;

    #[inline]
    fn send_message(
        &self,
        handle: Self::Handle,
        segments: &[IoSlice<'_>],
        ctrl: &mut ControlBlock,
        dest: Option<&PeerAddr>,
    ) -> io::Result<Sent> {
        (**self).send_message(handle, segments, ctrl, dest)
    }

    #[inline]
    fn control(&self, handle: Self::Handle, op: ControlOp) -> io::Result<Ack> {
        (**self).control(handle, op)
    }

    #[inline]
    fn query_option(
        &self,
        handle: Self::Handle,
        opt: SockOpt,
        addr: &PeerAddr,
    ) -> io::Result<Self::Handle> {
        (**self).query_option(handle, opt, addr)
    }
}

impl<E: Engine + ?Sized> Engine for std::sync::Arc<E> {
    type Handle = E::Handle;

    #[inline]
    fn send_message(
        &self,
        handle: Self::Handle,
        segments: &[IoSlice<'_>],
        ctrl: &mut ControlBlock,
        dest: Option<&PeerAddr>,
    ) -> io::Result<Sent> {
        (**self).send_message(handle, segments, ctrl, dest)
    }

    #[inline]
    fn control(&self, handle: Self::Handle, op: ControlOp) -> io::Result<Ack> {
        (**self).control(handle, op)
    }

    #[inline]
    fn query_option(
        &self,
        handle: Self::Handle,
        opt: SockOpt,
        addr: &PeerAddr,
    ) -> io::Result<Self::Handle> {
        (**self).query_option(handle, opt, addr)
    }
}
