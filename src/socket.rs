use std::io::IoSlice;

use crate::abort::{self, AbortPolicy, AbortTarget};
use crate::ctrl::ControlBlock;
use crate::error::{Error, Result};
use crate::id::RpcId;
use crate::lifecycle::IncomingRequest;
use crate::msg::{self, Binding, Payload};
use crate::transport::{Ack, Engine, SockOpt, Sent};
use crate::type_alias::*;

/// A request accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Initiated {
    /// Identifier minted for the request. Never [`RpcId::NONE`].
    pub id: RpcId,

    /// Bytes accepted, always the full message length.
    pub bytes: usize,
}

/// A Homa socket handle together with the engine that serves it.
///
/// This type is a stateless pass-through: it holds no locks, keeps no RPC
/// table and never closes or duplicates its handle. Whether a destination
/// address is required or forbidden on sends is decided by its [`Binding`].
#[derive(Debug, Clone)]
pub struct Socket<E: Engine> {
    engine: E,
    handle: E::Handle,
    binding: Binding,
}

impl<E: Engine> Socket<E> {
    /// Wrap a shared socket that talks to any number of peers.
    pub fn new(engine: E, handle: E::Handle) -> Self {
        Self {
            engine,
            handle,
            binding: Binding::Unbound,
        }
    }

    /// Wrap a socket that the caller has already bound to `peer`.
    pub fn connect(engine: E, handle: E::Handle, peer: PeerAddr) -> Self {
        Self {
            engine,
            handle,
            binding: Binding::Peer(peer),
        }
    }

    #[inline(always)]
    pub fn handle(&self) -> E::Handle {
        self.handle
    }

    #[inline(always)]
    pub fn binding(&self) -> Binding {
        self.binding
    }

    #[inline(always)]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Return the peer this socket is bound to, if any.
    #[inline]
    pub fn peer(&self) -> Option<PeerAddr> {
        self.binding.peer()
    }

    /// Release the handle without closing it.
    pub fn into_handle(self) -> E::Handle {
        self.handle
    }
}

/// Requests and responses.
impl<E: Engine> Socket<E> {
    fn initiate(
        &self,
        payload: Payload<'_>,
        dest: Option<&PeerAddr>,
        cookie: Cookie,
    ) -> Result<Initiated> {
        let mut ctrl = ControlBlock::initiate(cookie);
        let sent = msg::transmit(
            &self.engine,
            self.handle,
            self.binding,
            payload,
            &mut ctrl,
            dest,
        )?;

        match sent {
            Sent::Accepted(bytes) if !ctrl.id().is_none() => Ok(Initiated {
                id: ctrl.id(),
                bytes,
            }),
            _ => {
                log::warn!(
                    "send on {:?}: request accepted without an identifier",
                    self.handle
                );
                Err(Error::NoIdentifier)
            }
        }
    }

    fn respond_raw(
        &self,
        payload: Payload<'_>,
        dest: Option<&PeerAddr>,
        id: RpcId,
    ) -> Result<Ack> {
        // A zero id would make the engine start a new request instead.
        if id.is_none() {
            log::debug!("send on {:?}: response with unset id dropped", self.handle);
            return Ok(Ack::NotFound);
        }

        let mut ctrl = ControlBlock::respond(id);
        let sent = msg::transmit(
            &self.engine,
            self.handle,
            self.binding,
            payload,
            &mut ctrl,
            dest,
        )?;
        match sent {
            Sent::Accepted(_) => Ok(Ack::Applied),
            Sent::Stale => {
                log::debug!(
                    "send on {:?}: no pending request {} from {:?}",
                    self.handle,
                    id,
                    dest.copied().or(self.peer())
                );
                Ok(Ack::NotFound)
            }
        }
    }

    /// Send a request to `dest`, starting a new RPC.
    ///
    /// `cookie` is returned unchanged when the RPC completes.
    pub fn initiate_request(
        &self,
        payload: &[u8],
        dest: &PeerAddr,
        cookie: Cookie,
    ) -> Result<Initiated> {
        self.initiate(Payload::Contiguous(payload), Some(dest), cookie)
    }

    /// Same as [`Socket::initiate_request`], with the message split across chunks.
    pub fn initiate_request_vectored(
        &self,
        chunks: &[IoSlice<'_>],
        dest: &PeerAddr,
        cookie: Cookie,
    ) -> Result<Initiated> {
        self.initiate(Payload::Chunks(chunks), Some(dest), cookie)
    }

    /// Send the response for request `id` received from `dest`.
    ///
    /// If there is no such pending request this does nothing and returns
    /// [`Ack::NotFound`].
    pub fn send_response(&self, payload: &[u8], dest: &PeerAddr, id: RpcId) -> Result<Ack> {
        self.respond_raw(Payload::Contiguous(payload), Some(dest), id)
    }

    /// Same as [`Socket::send_response`], with the message split across chunks.
    pub fn send_response_vectored(
        &self,
        chunks: &[IoSlice<'_>],
        dest: &PeerAddr,
        id: RpcId,
    ) -> Result<Ack> {
        self.respond_raw(Payload::Chunks(chunks), Some(dest), id)
    }

    /// Answer a delivered request, consuming its token.
    ///
    /// Works on both shared and peer-bound sockets. A token from a different
    /// peer than the one this socket is bound to is a no-op.
    pub fn respond(&self, req: IncomingRequest, payload: &[u8]) -> Result<Ack> {
        match self.binding {
            Binding::Unbound => self.send_response(payload, &req.peer(), req.id()),
            Binding::Peer(peer) if peer == req.peer() => {
                self.respond_raw(Payload::Contiguous(payload), None, req.id())
            }
            Binding::Peer(peer) => {
                log::debug!(
                    "send on {:?}: request {} came from {}, not bound peer {}",
                    self.handle,
                    req.id(),
                    req.peer(),
                    peer
                );
                Ok(Ack::NotFound)
            }
        }
    }
}

/// Control operations.
impl<E: Engine> Socket<E> {
    /// Abort one or all client RPCs on this socket.
    ///
    /// Aborting an RPC that does not exist or has already completed succeeds
    /// with [`Ack::NotFound`].
    pub fn abort(&self, target: AbortTarget, policy: AbortPolicy) -> Result<Ack> {
        abort::abort(&self.engine, self.handle, target, policy)
    }

    /// Split off a new socket dedicated to `peer`.
    ///
    /// `peer` should come from a previous delivery on this socket. Messages
    /// already queued here for other peers are left untouched.
    pub fn peel_off(&self, peer: &PeerAddr) -> Result<Socket<E>>
    where
        E: Clone,
    {
        if self.binding != Binding::Unbound {
            return Err(Error::AlreadyPeerBound);
        }

        let handle = self
            .engine
            .query_option(self.handle, SockOpt::PeelOff, peer)?;
        log::trace!("peel-off on {:?}: {:?} now serves {}", self.handle, handle, peer);
        Ok(Socket::connect(self.engine.clone(), handle, *peer))
    }
}

/// Connected-mode entry points, for peer-bound sockets only.
impl<E: Engine> Socket<E> {
    fn bound_peer(&self) -> Result<PeerAddr> {
        self.binding.peer().ok_or(Error::NotPeerBound)
    }

    /// Send a request to the bound peer, with a neutral cookie.
    pub fn connected_request(&self, payload: &[u8]) -> Result<Initiated> {
        self.bound_peer()?;
        self.initiate(Payload::Contiguous(payload), None, 0)
    }

    pub fn connected_request_vectored(&self, chunks: &[IoSlice<'_>]) -> Result<Initiated> {
        self.bound_peer()?;
        self.initiate(Payload::Chunks(chunks), None, 0)
    }

    /// Send the response for request `id` received from the bound peer.
    pub fn connected_response(&self, payload: &[u8], id: RpcId) -> Result<Ack> {
        self.bound_peer()?;
        self.respond_raw(Payload::Contiguous(payload), None, id)
    }

    pub fn connected_response_vectored(&self, chunks: &[IoSlice<'_>], id: RpcId) -> Result<Ack> {
        self.bound_peer()?;
        self.respond_raw(Payload::Chunks(chunks), None, id)
    }
}
