use std::mem;

use serde::{Deserialize, Serialize};

use crate::ctrl::AbortArgs;

/// `_IOWR(type, nr, T)` from `<asm-generic/ioctl.h>`.
const fn iowr(ty: u64, nr: u64, size: usize) -> u64 {
    const IOC_READ_WRITE: u64 = 3;
    (IOC_READ_WRITE << 30) | ((size as u64) << 16) | (ty << 8) | nr
}

/// Engine parameters.
///
/// The defaults match the Homa kernel module. They only need changing for
/// out-of-tree builds of the module that renumber its protocol or options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomaConfig {
    /// IP protocol number the engine is registered under.
    pub protocol: i32,

    /// Socket option level-`protocol` option number for peel-off.
    pub peeloff_option: i32,

    /// ioctl request number for abort.
    pub abort_request: u64,

    /// Largest message the engine accepts, in bytes.
    pub max_message_len: usize,
}

impl HomaConfig {
    pub const IPPROTO_HOMA: i32 = 146;
    pub const SO_HOMA_PEELOFF: i32 = 12;
    pub const HOMAIOCABORT: u64 = iowr(0x89, 0xe3, mem::size_of::<AbortArgs>());
    pub const HOMA_MAX_MESSAGE_LENGTH: usize = 1_000_000;
}

impl Default for HomaConfig {
    fn default() -> Self {
        Self {
            protocol: Self::IPPROTO_HOMA,
            peeloff_option: Self::SO_HOMA_PEELOFF,
            abort_request: Self::HOMAIOCABORT,
            max_message_len: Self::HOMA_MAX_MESSAGE_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_request_number() {
        assert_eq!(HomaConfig::HOMAIOCABORT, 0xc020_89e3);
    }
}
