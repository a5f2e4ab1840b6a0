use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io::{self, IoSlice};
use std::sync::Arc;

use ahash::RandomState;
use libc::{EADDRINUSE, EBADF, EDESTADDRREQ, EINVAL, EISCONN, EMSGSIZE};
use parking_lot::{Mutex, MutexGuard};

use super::*;
use crate::config::HomaConfig;
use crate::id::RpcId;
use crate::lifecycle::{Body, Inbound, RpcEvent, RpcState, Transition};

/// Handle of a socket opened on a [`LoopbackEngine`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopbackHandle(u32);

impl fmt::Debug for LoopbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lo#{}", self.0)
    }
}

struct LoSocket {
    local: PeerAddr,
    binding: Option<PeerAddr>,
    inbox: VecDeque<Inbound>,
}

struct LoRpc {
    /// Socket deliveries for this RPC go to.
    owner: LoopbackHandle,
    peer: PeerAddr,
    cookie: Cookie,
    state: RpcState,
}

/// Everything the engine knows, behind one lock.
struct Fabric {
    next_handle: u32,
    next_id: u64,
    sockets: HashMap<LoopbackHandle, LoSocket, RandomState>,

    /// RPC records keyed by the local address of their host and the
    /// identifier as that host knows it.
    rpcs: HashMap<(PeerAddr, RpcId), LoRpc, RandomState>,

    /// (local, peer) pairs that have delivered a request. Peel-off only
    /// accepts peers from this set.
    seen: HashSet<(PeerAddr, PeerAddr), RandomState>,
}

fn os_err(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

impl Fabric {
    fn socket(&self, handle: LoopbackHandle) -> io::Result<&LoSocket> {
        self.sockets.get(&handle).ok_or_else(|| os_err(EBADF))
    }

    /// Pick the socket at `local` that should receive traffic from `from`:
    /// the one peeled off for `from` if there is one, otherwise the shared one.
    fn route(&self, local: PeerAddr, from: PeerAddr) -> Option<LoopbackHandle> {
        let mut shared = None;
        for (handle, sock) in &self.sockets {
            if sock.local != local {
                continue;
            }
            match sock.binding {
                Some(peer) if peer == from => return Some(*handle),
                None => shared = Some(*handle),
                _ => {}
            }
        }
        shared
    }

    fn deliver(&mut self, handle: LoopbackHandle, inbound: Inbound) {
        match self.sockets.get_mut(&handle) {
            Some(sock) => {
                log::trace!("loopback: deliver {:?} to {:?}", inbound.event(), handle);
                if inbound.is_request() {
                    self.seen.insert((sock.local, inbound.peer));
                }
                sock.inbox.push_back(inbound);
            }
            None => log::debug!(
                "loopback: dropping delivery for RPC {} to closed socket {:?}",
                inbound.id,
                handle
            ),
        }
    }

    fn start_request(
        &mut self,
        handle: LoopbackHandle,
        local: PeerAddr,
        target: PeerAddr,
        ctrl: &mut ControlBlock,
        payload: Vec<u8>,
    ) {
        let id = RpcId::new(self.next_id);
        self.next_id += 2;
        ctrl.set_id(id);

        self.rpcs.insert(
            (local, id),
            LoRpc {
                owner: handle,
                peer: target,
                cookie: ctrl.cookie(),
                state: RpcState::ClientSent,
            },
        );

        // Server side.
        let sid = id.peer_view();
        if self.rpcs.contains_key(&(target, sid)) {
            log::debug!("loopback: duplicate request {} from {}", sid, local);
            return;
        }
        let Some(svr) = self.route(target, local) else {
            log::debug!("loopback: no socket at {}, request {} stays pending", target, id);
            return;
        };
        self.rpcs.insert(
            (target, sid),
            LoRpc {
                owner: svr,
                peer: local,
                cookie: 0,
                state: RpcState::ServerReceived,
            },
        );
        self.deliver(
            svr,
            Inbound {
                id: sid,
                peer: local,
                cookie: 0,
                body: Body::Request(payload),
            },
        );
    }

    fn finish_response(
        &mut self,
        local: PeerAddr,
        target: PeerAddr,
        id: RpcId,
        payload: Vec<u8>,
    ) -> Sent {
        let key = (local, id);
        let replied = match self.rpcs.get(&key) {
            Some(rpc) if rpc.peer == target => rpc.state.on(RpcEvent::Replied),
            _ => Transition::Ignored,
        };
        if replied != Transition::Moved(RpcState::ServerReplied) {
            return Sent::Stale;
        }
        self.rpcs.remove(&key);

        // Client side.
        let cid = id.peer_view();
        let ckey = (target, cid);
        let Some(rpc) = self.rpcs.get(&ckey) else {
            log::debug!("loopback: response for {} has no client left", cid);
            return Sent::Accepted(payload.len());
        };
        if rpc.state.on(RpcEvent::ResponseDelivered) == Transition::Ignored {
            return Sent::Accepted(payload.len());
        }

        let len = payload.len();
        let (owner, cookie) = (rpc.owner, rpc.cookie);
        self.rpcs.remove(&ckey);
        self.deliver(
            owner,
            Inbound {
                id: cid,
                peer: local,
                cookie,
                body: Body::Response(payload),
            },
        );
        Sent::Accepted(len)
    }

    fn abort(&mut self, handle: LoopbackHandle, args: AbortArgs) -> io::Result<Ack> {
        let local = self.socket(handle)?.local;
        let event = RpcEvent::Aborted { code: args.error() };

        let mut hits: Vec<_> = self
            .rpcs
            .iter()
            .filter(|((addr, id), rpc)| {
                *addr == local
                    && rpc.owner == handle
                    && rpc.state.is_client()
                    && (args.is_wildcard() || *id == args.id())
            })
            .filter_map(|((_, id), rpc)| match rpc.state.on(event) {
                Transition::Moved(next) => Some((*id, next)),
                Transition::Ignored => None,
            })
            .collect();
        if hits.is_empty() {
            return Ok(Ack::NotFound);
        }
        hits.sort_unstable_by_key(|(id, _)| *id);

        for (id, next) in hits {
            let Some(rpc) = self.rpcs.remove(&(local, id)) else {
                continue;
            };
            if let RpcState::ClientFailed(code) = next {
                self.deliver(
                    rpc.owner,
                    Inbound {
                        id,
                        peer: rpc.peer,
                        cookie: rpc.cookie,
                        body: Body::Failed(code),
                    },
                );
            } else {
                log::trace!("loopback: RPC {} destroyed", id);
            }
        }
        Ok(Ack::Applied)
    }

    fn peel_off(&mut self, handle: LoopbackHandle, peer: PeerAddr) -> io::Result<LoopbackHandle> {
        let sock = self.socket(handle)?;
        let local = sock.local;
        if sock.binding.is_some() || !self.seen.contains(&(local, peer)) {
            return Err(os_err(EINVAL));
        }
        if self
            .sockets
            .values()
            .any(|s| s.local == local && s.binding == Some(peer))
        {
            return Err(os_err(EADDRINUSE));
        }

        // Move the requests already queued from `peer`, in order. Completions
        // of our own RPCs stay with the socket that owns them.
        let sock = self.sockets.get_mut(&handle).ok_or_else(|| os_err(EBADF))?;
        let (moved, kept): (VecDeque<_>, VecDeque<_>) = sock
            .inbox
            .drain(..)
            .partition(|m| m.peer == peer && m.is_request());
        sock.inbox = kept;

        let new = LoopbackHandle(self.next_handle);
        self.next_handle += 1;
        self.sockets.insert(
            new,
            LoSocket {
                local,
                binding: Some(peer),
                inbox: moved,
            },
        );
        Ok(new)
    }
}

/// An in-process engine.
///
/// Keeps authoritative RPC records, mints identifiers the way the kernel
/// module does, and moves messages between sockets opened on local addresses.
/// Unlike the kernel engine it also reports stale responses as [`Sent::Stale`]
/// and exposes the receive path through [`LoopbackEngine::recv`].
pub struct LoopbackEngine {
    config: HomaConfig,
    fabric: Mutex<Fabric>,
}

impl LoopbackEngine {
    /// Create a new engine with the default configuration.
    pub fn new() -> Arc<Self> {
        Self::with_config(HomaConfig::default())
    }

    pub fn with_config(config: HomaConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            fabric: Mutex::new(Fabric {
                next_handle: 3,
                next_id: 2,
                sockets: HashMap::default(),
                rpcs: HashMap::default(),
                seen: HashSet::default(),
            }),
        })
    }

    #[inline]
    fn fabric(&self) -> MutexGuard<'_, Fabric> {
        self.fabric.lock()
    }

    #[inline]
    pub fn config(&self) -> &HomaConfig {
        &self.config
    }

    /// Open a shared socket listening on `local`.
    pub fn open(&self, local: PeerAddr) -> io::Result<LoopbackHandle> {
        let mut fabric = self.fabric();
        if fabric
            .sockets
            .values()
            .any(|s| s.local == local && s.binding.is_none())
        {
            return Err(os_err(EADDRINUSE));
        }

        let handle = LoopbackHandle(fabric.next_handle);
        fabric.next_handle += 1;
        fabric.sockets.insert(
            handle,
            LoSocket {
                local,
                binding: None,
                inbox: VecDeque::new(),
            },
        );
        Ok(handle)
    }

    /// Close `handle`. Every RPC it owns is destroyed, client and server alike.
    /// Return `false` if there was no such socket.
    pub fn close(&self, handle: LoopbackHandle) -> bool {
        let mut fabric = self.fabric();
        let Some(sock) = fabric.sockets.remove(&handle) else {
            return false;
        };

        let before = fabric.rpcs.len();
        fabric.rpcs.retain(|_, rpc| rpc.owner != handle);
        log::debug!(
            "loopback: closed {:?}, {} RPCs destroyed",
            handle,
            before - fabric.rpcs.len()
        );

        // Forget the peers seen at this address once nothing listens there.
        let local = sock.local;
        if !fabric.sockets.values().any(|s| s.local == local) {
            fabric.seen.retain(|(addr, _)| *addr != local);
        }
        true
    }

    /// Take the next delivery queued on `handle`.
    pub fn recv(&self, handle: LoopbackHandle) -> Option<Inbound> {
        self.fabric()
            .sockets
            .get_mut(&handle)
            .and_then(|s| s.inbox.pop_front())
    }

    /// Number of deliveries queued on `handle`.
    pub fn pending(&self, handle: LoopbackHandle) -> usize {
        self.fabric()
            .sockets
            .get(&handle)
            .map_or(0, |s| s.inbox.len())
    }

    /// Current state of the RPC `id` as known at `local`.
    /// Retired records report `None`.
    pub fn rpc_state(&self, local: PeerAddr, id: RpcId) -> Option<RpcState> {
        self.fabric().rpcs.get(&(local, id)).map(|rpc| rpc.state)
    }
}

impl fmt::Debug for LoopbackEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fabric = self.fabric();
        f.debug_struct("LoopbackEngine")
            .field("sockets", &fabric.sockets.len())
            .field("rpcs", &fabric.rpcs.len())
            .finish()
    }
}

impl Engine for LoopbackEngine {
    type Handle = LoopbackHandle;

    fn send_message(
        &self,
        handle: LoopbackHandle,
        segments: &[IoSlice<'_>],
        ctrl: &mut ControlBlock,
        dest: Option<&PeerAddr>,
    ) -> io::Result<Sent> {
        let mut fabric = self.fabric();
        let sock = fabric.socket(handle)?;
        let local = sock.local;
        let target = match (sock.binding, dest) {
            (Some(peer), None) => peer,
            (None, Some(dest)) => *dest,
            (None, None) => return Err(os_err(EDESTADDRREQ)),
            (Some(_), Some(_)) => return Err(os_err(EISCONN)),
        };

        let len: usize = segments.iter().map(|s| s.len()).sum();
        if len > self.config.max_message_len {
            return Err(os_err(EMSGSIZE));
        }
        let payload = segments.iter().fold(Vec::with_capacity(len), |mut buf, s| {
            buf.extend_from_slice(s);
            buf
        });

        if ctrl.is_request() {
            fabric.start_request(handle, local, target, ctrl, payload);
            Ok(Sent::Accepted(len))
        } else {
            Ok(fabric.finish_response(local, target, ctrl.id(), payload))
        }
    }

    fn control(&self, handle: LoopbackHandle, op: ControlOp) -> io::Result<Ack> {
        match op {
            ControlOp::Abort(args) => self.fabric().abort(handle, args),
        }
    }

    fn query_option(
        &self,
        handle: LoopbackHandle,
        opt: SockOpt,
        addr: &PeerAddr,
    ) -> io::Result<LoopbackHandle> {
        match opt {
            SockOpt::PeelOff => self.fabric().peel_off(handle, *addr),
        }
    }
}
