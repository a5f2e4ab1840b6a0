//! Abort coordination: cancel one or all client RPCs on a socket.

use std::num::NonZeroI32;

use crate::ctrl::AbortArgs;
use crate::error::Result;
use crate::id::RpcId;
use crate::transport::{Ack, ControlOp, Engine};
use crate::type_alias::*;

/// Which client RPCs an abort applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortTarget {
    /// Exactly this RPC.
    One(RpcId),

    /// Every active client RPC on the socket.
    All,
}

impl AbortTarget {
    /// Identifier as the engine expects it: `0` is the wildcard.
    pub(crate) fn raw_id(self) -> RpcId {
        match self {
            AbortTarget::One(id) => id,
            AbortTarget::All => RpcId::NONE,
        }
    }
}

impl From<RpcId> for AbortTarget {
    fn from(id: RpcId) -> Self {
        if id.is_none() {
            AbortTarget::All
        } else {
            AbortTarget::One(id)
        }
    }
}

/// What happens to an aborted RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortPolicy {
    /// Destroy immediately. The RPC is never delivered.
    Destroy,

    /// Complete with this error. Delivered exactly once on the next receive.
    Fail(NonZeroI32),
}

impl AbortPolicy {
    pub fn from_code(code: AbortCode) -> Self {
        match NonZeroI32::new(code) {
            Some(code) => AbortPolicy::Fail(code),
            None => AbortPolicy::Destroy,
        }
    }

    pub fn code(self) -> AbortCode {
        match self {
            AbortPolicy::Destroy => 0,
            AbortPolicy::Fail(code) => code.get(),
        }
    }
}

/// Issue the abort control operation on `handle`.
///
/// This is a synchronous call with no payload. Aborting an RPC that does not
/// exist or has already completed succeeds with [`Ack::NotFound`].
pub(crate) fn abort<E: Engine>(
    engine: &E,
    handle: E::Handle,
    target: AbortTarget,
    policy: AbortPolicy,
) -> Result<Ack> {
    let args = AbortArgs::new(target, policy);
    log::trace!(
        "abort on {:?}: id {}, error {}",
        handle,
        args.id(),
        args.error()
    );

    let ack = engine.control(handle, ControlOp::Abort(args))?;
    if ack == Ack::NotFound {
        log::debug!("abort on {:?}: no active RPC matches {:?}", handle, target);
    }
    Ok(ack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_id_is_wildcard() {
        assert_eq!(AbortTarget::from(RpcId::NONE), AbortTarget::All);
        assert_eq!(AbortTarget::from(RpcId::new(4)), AbortTarget::One(RpcId::new(4)));
    }

    #[test]
    fn test_policy_codes() {
        assert_eq!(AbortPolicy::from_code(0), AbortPolicy::Destroy);
        assert_eq!(AbortPolicy::from_code(libc::ETIMEDOUT).code(), libc::ETIMEDOUT);
    }
}
