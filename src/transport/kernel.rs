use std::io::{self, IoSlice};
use std::mem;
use std::os::fd::RawFd;

use libc::*;

use super::*;
use crate::config::HomaConfig;

/// Raw socket address buffer, large enough for both address families.
struct RawAddr {
    storage: sockaddr_storage,
    len: socklen_t,
}

impl RawAddr {
    fn new(addr: &PeerAddr) -> Self {
        // SAFETY: `sockaddr_storage` is plain old data.
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let len = match addr {
            PeerAddr::V4(a) => {
                // SAFETY: `sockaddr_storage` is large enough and suitably aligned for `sockaddr_in`.
                let sin = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
                sin.sin_family = AF_INET as sa_family_t;
                sin.sin_port = a.port().to_be();
                sin.sin_addr = in_addr {
                    s_addr: u32::from_ne_bytes(a.ip().octets()),
                };
                mem::size_of::<sockaddr_in>()
            }
            PeerAddr::V6(a) => {
                // SAFETY: `sockaddr_storage` is large enough and suitably aligned for `sockaddr_in6`.
                let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
                sin6.sin6_family = AF_INET6 as sa_family_t;
                sin6.sin6_port = a.port().to_be();
                sin6.sin6_flowinfo = a.flowinfo();
                sin6.sin6_addr = in6_addr {
                    s6_addr: a.ip().octets(),
                };
                sin6.sin6_scope_id = a.scope_id();
                mem::size_of::<sockaddr_in6>()
            }
        };
        Self {
            storage,
            len: len as socklen_t,
        }
    }

    #[inline(always)]
    fn as_mut_ptr(&mut self) -> *mut c_void {
        &mut self.storage as *mut _ as *mut c_void
    }
}

/// The Homa kernel module, reached through `sendmsg(2)`, `ioctl(2)` and `getsockopt(2)`.
///
/// Handles are raw file descriptors of sockets opened with the Homa protocol
/// number. This type never opens or closes them.
#[derive(Debug, Clone, Default)]
pub struct KernelEngine {
    config: HomaConfig,
}

impl KernelEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HomaConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &HomaConfig {
        &self.config
    }
}

impl Engine for KernelEngine {
    type Handle = RawFd;

    fn send_message(
        &self,
        handle: RawFd,
        segments: &[IoSlice<'_>],
        ctrl: &mut ControlBlock,
        dest: Option<&PeerAddr>,
    ) -> io::Result<Sent> {
        let len = segments.iter().map(|s| s.len()).sum();
        let mut addr = dest.map(RawAddr::new);

        // SAFETY: `msghdr` is plain old data; some libcs have private padding
        // fields, so it cannot be built with a struct literal.
        let mut hdr: msghdr = unsafe { mem::zeroed() };
        if let Some(addr) = addr.as_mut() {
            hdr.msg_name = addr.as_mut_ptr();
            hdr.msg_namelen = addr.len;
        }
        // `IoSlice` is ABI-compatible with `iovec`. The engine only reads it.
        hdr.msg_iov = segments.as_ptr() as *mut iovec;
        hdr.msg_iovlen = segments.len() as _;

        // The engine reads and writes the control block through `msg_control`
        // directly. `msg_controllen` must stay 0, or the kernel copies the block
        // into its own buffer and the minted identifier never reaches us.
        hdr.msg_control = ctrl as *mut ControlBlock as *mut c_void;
        hdr.msg_controllen = 0;

        // SAFETY: FFI. Every pointer in `hdr` outlives the call.
        let ret = unsafe { sendmsg(handle, &hdr, 0) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Sent::Accepted(len))
    }

    fn control(&self, handle: RawFd, op: ControlOp) -> io::Result<Ack> {
        match op {
            ControlOp::Abort(mut args) => {
                // SAFETY: FFI. `args` has the layout the engine expects.
                let ret = unsafe {
                    ioctl(
                        handle,
                        self.config.abort_request as _,
                        &mut args as *mut AbortArgs as *mut c_void,
                    )
                };
                if ret == 0 {
                    return Ok(Ack::Applied);
                }

                // The engine answers EINVAL when no client RPC has the given id.
                let err = io::Error::last_os_error();
                if !args.is_wildcard() && err.raw_os_error() == Some(EINVAL) {
                    Ok(Ack::NotFound)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn query_option(&self, handle: RawFd, opt: SockOpt, addr: &PeerAddr) -> io::Result<RawFd> {
        let optname = match opt {
            SockOpt::PeelOff => self.config.peeloff_option,
        };

        let mut raw = RawAddr::new(addr);
        let mut len = raw.len;

        // SAFETY: FFI. The address buffer is valid for `len` bytes.
        let ret = unsafe {
            getsockopt(
                handle,
                self.config.protocol,
                optname,
                raw.as_mut_ptr(),
                &mut len,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret)
    }
}
