//! RPC lifecycle as seen by the application.
//!
//! The engine keeps the authoritative record of every RPC. What lives here is
//! the state machine an application (or an engine implementation) can use to
//! interpret the events it observes, plus the inbound delivery type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::RpcId;
use crate::type_alias::*;

/// Application-visible state of one RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcState {
    /// Request transmitted, no completion yet.
    ClientSent,

    /// Response delivered.
    ClientCompleted,

    /// Completed with an error (abort with a nonzero code). Delivered once.
    ClientFailed(AbortCode),

    /// Aborted with the destroy policy. Never surfaces again.
    Erased,

    /// Request delivered, awaiting a reply.
    ServerReceived,

    /// Reply sent; the record is retired.
    ServerReplied,
}

/// Events that drive [`RpcState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcEvent {
    /// A request was accepted by the engine.
    Sent,

    /// An inbound request was delivered.
    RequestDelivered,

    /// The response to a client RPC was delivered.
    ResponseDelivered,

    /// An error completion was delivered for a client RPC.
    ErrorDelivered(AbortCode),

    /// A reply was sent for a server RPC.
    Replied,

    /// The client RPC was aborted.
    Aborted { code: AbortCode },
}

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved(RpcState),

    /// The event does not apply to the current state. Not an error: the engine
    /// may have retired the record concurrently.
    Ignored,
}

impl RpcState {
    /// Apply `event`.
    pub fn on(self, event: RpcEvent) -> Transition {
        use RpcEvent as Ev;
        use RpcState as St;

        let next = match (self, event) {
            (St::ClientSent, Ev::ResponseDelivered) => St::ClientCompleted,
            (St::ClientSent, Ev::ErrorDelivered(code)) => St::ClientFailed(code),
            (St::ClientSent, Ev::Aborted { code: 0 }) => St::Erased,
            (St::ClientSent, Ev::Aborted { code }) => St::ClientFailed(code),
            (St::ServerReceived, Ev::Replied) => St::ServerReplied,
            _ => return Transition::Ignored,
        };
        Transition::Moved(next)
    }

    /// Return `true` if no further event can move this state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RpcState::ClientSent | RpcState::ServerReceived)
    }

    /// Return `true` for records of RPCs this host initiated.
    pub fn is_client(self) -> bool {
        !matches!(self, RpcState::ServerReceived | RpcState::ServerReplied)
    }
}

impl fmt::Display for RpcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcState::ClientSent => f.write_str("OUTGOING"),
            RpcState::ClientCompleted => f.write_str("COMPLETED"),
            RpcState::ClientFailed(code) => write!(f, "FAILED({})", code),
            RpcState::Erased => f.write_str("DEAD"),
            RpcState::ServerReceived => f.write_str("IN_SERVICE"),
            RpcState::ServerReplied => f.write_str("REPLIED"),
        }
    }
}

/// Body of an inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// A new request from `peer`.
    Request(Vec<u8>),

    /// The response to one of our requests.
    Response(Vec<u8>),

    /// One of our requests completed with an error.
    Failed(AbortCode),
}

/// One delivery from the engine's receive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Identifier as known on this host.
    pub id: RpcId,

    /// The other end of the RPC.
    pub peer: PeerAddr,

    /// Cookie given at initiate time. Always `0` for requests.
    pub cookie: Cookie,

    pub body: Body,
}

impl Inbound {
    /// The lifecycle event this delivery represents.
    pub fn event(&self) -> RpcEvent {
        match self.body {
            Body::Request(_) => RpcEvent::RequestDelivered,
            Body::Response(_) => RpcEvent::ResponseDelivered,
            Body::Failed(code) => RpcEvent::ErrorDelivered(code),
        }
    }

    /// Return `true` if this delivery starts a new server RPC.
    pub fn is_request(&self) -> bool {
        matches!(self.body, Body::Request(_))
    }

    /// Payload bytes, if any.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Request(buf) | Body::Response(buf) => Some(buf),
            Body::Failed(_) => None,
        }
    }

    /// Split a request delivery into its reply token and payload.
    /// Return the delivery unchanged if it is not a request.
    pub fn into_request(self) -> Result<(IncomingRequest, Vec<u8>), Inbound> {
        match self.body {
            Body::Request(payload) => Ok((
                IncomingRequest {
                    id: self.id,
                    peer: self.peer,
                },
                payload,
            )),
            body => Err(Inbound { body, ..self }),
        }
    }
}

/// A request awaiting a reply.
///
/// Consumed by [`Socket::respond`](crate::Socket::respond), so one delivery can
/// be answered at most once through it.
#[derive(Debug, PartialEq, Eq)]
pub struct IncomingRequest {
    id: RpcId,
    peer: PeerAddr,
}

impl IncomingRequest {
    #[inline(always)]
    pub fn id(&self) -> RpcId {
        self.id
    }

    #[inline(always)]
    pub fn peer(&self) -> PeerAddr {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_paths() {
        let st = RpcState::ClientSent;
        assert!(st.is_client());
        assert!(!st.is_terminal());
        assert_eq!(
            st.on(RpcEvent::ResponseDelivered),
            Transition::Moved(RpcState::ClientCompleted)
        );
        assert_eq!(
            st.on(RpcEvent::Aborted { code: 0 }),
            Transition::Moved(RpcState::Erased)
        );
        assert_eq!(
            st.on(RpcEvent::Aborted { code: libc::EINTR }),
            Transition::Moved(RpcState::ClientFailed(libc::EINTR))
        );
    }

    #[test]
    fn test_stale_events_are_ignored() {
        for st in [
            RpcState::ClientCompleted,
            RpcState::Erased,
            RpcState::ServerReplied,
            RpcState::ClientFailed(libc::EIO),
        ] {
            assert!(st.is_terminal());
            assert_eq!(st.on(RpcEvent::Replied), Transition::Ignored);
            assert_eq!(st.on(RpcEvent::Aborted { code: 0 }), Transition::Ignored);
            assert_eq!(st.on(RpcEvent::ResponseDelivered), Transition::Ignored);
        }
        assert_eq!(
            RpcState::ServerReceived.on(RpcEvent::Aborted { code: 0 }),
            Transition::Ignored
        );
    }

    #[test]
    fn test_roles() {
        for st in [
            RpcState::ClientCompleted,
            RpcState::ClientFailed(libc::EIO),
            RpcState::Erased,
        ] {
            assert!(st.is_client(), "{}", st);
        }
        for st in [RpcState::ServerReceived, RpcState::ServerReplied] {
            assert!(!st.is_client(), "{}", st);
        }
        assert_eq!(
            RpcState::ServerReceived.on(RpcEvent::Replied),
            Transition::Moved(RpcState::ServerReplied)
        );
    }

    #[test]
    fn test_into_request() {
        let peer: PeerAddr = "10.0.0.2:5000".parse().unwrap();
        let inbound = Inbound {
            id: RpcId::new(3),
            peer,
            cookie: 0,
            body: Body::Request(b"ping".to_vec()),
        };
        assert_eq!(inbound.event(), RpcEvent::RequestDelivered);
        assert!(inbound.is_request());
        let (req, payload) = inbound.into_request().unwrap();
        assert_eq!(req.id(), RpcId::new(3));
        assert_eq!(req.peer(), peer);
        assert_eq!(payload, b"ping");

        let failed = Inbound {
            id: RpcId::new(2),
            peer,
            cookie: 9,
            body: Body::Failed(libc::ECANCELED),
        };
        assert!(!failed.is_request());
        assert!(failed.payload().is_none());
        assert_eq!(failed.clone().into_request().unwrap_err(), failed);
    }
}
