mod abort;

use std::io::{self, IoSlice};
use std::sync::Arc;

use parking_lot::Mutex;

use super::transport::{ControlOp, LoopbackEngine, Sent, SockOpt};
use super::{type_alias::*, *};

/// Address of the `n`-th test host.
fn host(n: u8) -> PeerAddr {
    PeerAddr::from(([10, 0, 0, n], 4000))
}

/// A client socket and a server socket on a fresh loopback engine.
fn pair() -> (
    Arc<LoopbackEngine>,
    Socket<Arc<LoopbackEngine>>,
    Socket<Arc<LoopbackEngine>>,
) {
    let engine = LoopbackEngine::new();
    let cli = Socket::new(engine.clone(), engine.open(host(1)).unwrap());
    let svr = Socket::new(engine.clone(), engine.open(host(2)).unwrap());
    (engine, cli, svr)
}

/// One call observed by [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Send {
        payload: Vec<u8>,
        ctrl: ControlBlock,
        dest: Option<PeerAddr>,
    },
    Control(ControlOp),
    Query(SockOpt, PeerAddr),
}

/// Engine that records every call and answers with a fixed reply.
struct Recorder {
    calls: Mutex<Vec<Call>>,
    mint: RpcId,
    reply: fn(usize) -> io::Result<Sent>,
}

impl Recorder {
    fn new(reply: fn(usize) -> io::Result<Sent>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            mint: RpcId::new(1000),
            reply,
        }
    }

    fn accepting() -> Self {
        Self::new(|len| Ok(Sent::Accepted(len)))
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl Engine for Recorder {
    type Handle = i32;

    fn send_message(
        &self,
        _handle: i32,
        segments: &[IoSlice<'_>],
        ctrl: &mut ControlBlock,
        dest: Option<&PeerAddr>,
    ) -> io::Result<Sent> {
        let payload: Vec<u8> = segments.iter().flat_map(|s| s.iter().copied()).collect();
        self.calls.lock().push(Call::Send {
            payload: payload.clone(),
            ctrl: *ctrl,
            dest: dest.copied(),
        });
        let sent = (self.reply)(payload.len())?;
        if ctrl.is_request() {
            ctrl.set_id(self.mint);
        }
        Ok(sent)
    }

    fn control(&self, _handle: i32, op: ControlOp) -> io::Result<Ack> {
        self.calls.lock().push(Call::Control(op));
        Ok(Ack::Applied)
    }

    fn query_option(&self, _handle: i32, opt: SockOpt, addr: &PeerAddr) -> io::Result<i32> {
        self.calls.lock().push(Call::Query(opt, *addr));
        Ok(99)
    }
}
