use std::fmt;

use serde::{Deserialize, Serialize};

/// RPC identifier.
///
/// An opaque token minted by the engine, unique within a socket's lifetime.
/// The library never indexes anything with it; it only carries it between the
/// application and the engine.
///
/// # Layout of the identifier space
///
/// Identifiers minted for outgoing requests are even. The identifier under which
/// the server side sees the same RPC has the low bit flipped, so client-role and
/// server-role identifiers never collide on one host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RpcId(u64);

impl RpcId {
    /// The "unset" sentinel. Also the abort wildcard.
    pub const NONE: RpcId = RpcId(0);

    #[inline(always)]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Return `true` if this identifier names an RPC initiated on this host.
    #[inline(always)]
    pub const fn is_client(self) -> bool {
        self.0 & 1 == 0
    }

    /// Return the identifier the other end of the RPC knows it by.
    #[inline(always)]
    pub const fn peer_view(self) -> Self {
        Self(self.0 ^ 1)
    }
}

impl From<u64> for RpcId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<RpcId> for u64 {
    fn from(id: RpcId) -> Self {
        id.0
    }
}

impl fmt::Debug for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RpcId({})", self.0)
    }
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
