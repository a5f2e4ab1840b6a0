//! Per-call control structures handed to the engine.

use std::{fmt, mem};

use crate::abort::{AbortPolicy, AbortTarget};
use crate::id::RpcId;
use crate::type_alias::*;

/// Control structure attached to every message transfer, 16 bytes.
///
/// # Layout
///
/// | Offset | Size |       Name        |
/// | -----: | ---: | ----------------- |
/// |      0 |    8 | id                |
/// |      8 |    8 | completion_cookie |
///
/// For an outgoing request `id` is zero on input and the engine overwrites it
/// with the minted identifier once the request is accepted. For a response it
/// is supplied by the caller and never rewritten.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct ControlBlock {
    id: u64,
    completion_cookie: u64,
}

impl ControlBlock {
    /// Control structure for a new outgoing request.
    #[inline]
    pub fn initiate(cookie: Cookie) -> Self {
        Self {
            id: 0,
            completion_cookie: cookie,
        }
    }

    /// Control structure for the response to a previously received request.
    /// Responses carry no cookie: nothing is ever delivered for them locally.
    #[inline]
    pub fn respond(id: RpcId) -> Self {
        Self {
            id: id.get(),
            completion_cookie: 0,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> RpcId {
        RpcId::new(self.id)
    }

    /// Overwrite the identifier. Only engines call this, when minting.
    #[inline(always)]
    pub fn set_id(&mut self, id: RpcId) {
        self.id = id.get();
    }

    #[inline(always)]
    pub fn cookie(&self) -> Cookie {
        self.completion_cookie
    }

    /// Return `true` if this block starts a new RPC rather than answering one.
    #[inline(always)]
    pub fn is_request(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("id", &self.id)
            .field("completion_cookie", &self.completion_cookie)
            .finish()
    }
}

/// Argument block of the abort control operation, 32 bytes.
///
/// # Layout
///
/// | Offset | Size |  Name  |
/// | -----: | ---: | ------ |
/// |      0 |    8 | id     |
/// |      8 |    4 | error  |
/// |     12 |   20 | (pad)  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct AbortArgs {
    id: u64,
    error: i32,
    _pad1: i32,
    _pad2: [u64; 2],
}

impl AbortArgs {
    pub fn new(target: AbortTarget, policy: AbortPolicy) -> Self {
        Self {
            id: target.raw_id().get(),
            error: policy.code(),
            ..Default::default()
        }
    }

    #[inline(always)]
    pub fn id(&self) -> RpcId {
        RpcId::new(self.id)
    }

    #[inline(always)]
    pub fn error(&self) -> AbortCode {
        self.error
    }

    #[inline(always)]
    pub fn is_wildcard(&self) -> bool {
        self.id == 0
    }

    pub fn target(&self) -> AbortTarget {
        AbortTarget::from(self.id())
    }

    pub fn policy(&self) -> AbortPolicy {
        AbortPolicy::from_code(self.error)
    }
}

const _: () = assert!(mem::size_of::<ControlBlock>() == 16);
const _: () = assert!(mem::size_of::<AbortArgs>() == 32);

#[cfg(test)]
mod tests {
    use std::num::NonZeroI32;

    use super::*;

    #[test]
    fn test_initiate_leaves_id_unset() {
        let ctrl = ControlBlock::initiate(42);
        assert!(ctrl.is_request());
        assert_eq!(ctrl.id(), RpcId::NONE);
        assert_eq!(ctrl.cookie(), 42);
    }

    #[test]
    fn test_respond_has_no_cookie() {
        let ctrl = ControlBlock::respond(RpcId::new(7));
        assert!(!ctrl.is_request());
        assert_eq!(ctrl.id().get(), 7);
        assert_eq!(ctrl.cookie(), 0);
    }

    #[test]
    fn test_abort_args() {
        let all = AbortArgs::new(AbortTarget::All, AbortPolicy::Destroy);
        assert!(all.is_wildcard());
        assert_eq!(all.error(), 0);

        let code = NonZeroI32::new(libc::ECANCELED).unwrap();
        let one = AbortArgs::new(AbortTarget::One(RpcId::new(10)), AbortPolicy::Fail(code));
        assert_eq!(one.target(), AbortTarget::One(RpcId::new(10)));
        assert_eq!(one.policy(), AbortPolicy::Fail(code));
    }
}
