//! Type aliases used in this library.

/// [`u64`]: Completion cookie.
/// Opaque to the library and to the engine; echoed back unchanged when the RPC completes.
pub type Cookie = u64;

/// [`i32`]: Abort error code, in errno space.
/// `0` means "destroy without notification".
pub type AbortCode = i32;

/// Remote or local transport address.
pub type PeerAddr = std::net::SocketAddr;
