//! Abort: destroy vs error-completion, single vs wildcard.

use std::num::NonZeroI32;

use super::*;

fn fail(code: i32) -> AbortPolicy {
    AbortPolicy::Fail(NonZeroI32::new(code).unwrap())
}

/// Test that a destroyed RPC never surfaces, even if the server answers later.
#[test]
fn destroy_vanishes() {
    let (engine, cli, svr) = pair();

    let sent = cli.initiate_request(b"ping", &host(2), 42).unwrap();
    assert_eq!(
        cli.abort(AbortTarget::One(sent.id), AbortPolicy::Destroy).unwrap(),
        Ack::Applied
    );
    assert_eq!(engine.rpc_state(host(1), sent.id), None);
    assert!(engine.recv(cli.handle()).is_none());

    // The server never heard of the abort; its reply is accepted and dropped.
    let req = engine.recv(svr.handle()).unwrap();
    assert_eq!(svr.send_response(b"pong", &host(1), req.id).unwrap(), Ack::Applied);
    assert!(engine.recv(cli.handle()).is_none());
}

/// Test that an error abort is delivered exactly once, with its code and cookie.
#[test]
fn error_delivered_once() {
    let (engine, cli, svr) = pair();

    let sent = cli.initiate_request(b"ping", &host(2), 9).unwrap();
    assert_eq!(
        cli.abort(AbortTarget::One(sent.id), fail(libc::ECANCELED)).unwrap(),
        Ack::Applied
    );

    let inbound = engine.recv(cli.handle()).unwrap();
    assert_eq!(inbound.id, sent.id);
    assert_eq!(inbound.cookie, 9);
    assert_eq!(inbound.body, Body::Failed(libc::ECANCELED));
    assert_eq!(inbound.event(), RpcEvent::ErrorDelivered(libc::ECANCELED));
    assert!(engine.recv(cli.handle()).is_none());

    // Neither a second abort nor a late reply produces another completion.
    assert_eq!(
        cli.abort(AbortTarget::One(sent.id), fail(libc::ECANCELED)).unwrap(),
        Ack::NotFound
    );
    let req = engine.recv(svr.handle()).unwrap();
    svr.send_response(b"pong", &host(1), req.id).unwrap();
    assert!(engine.recv(cli.handle()).is_none());
}

/// Test that the wildcard aborts every outstanding client RPC on the socket, and only those.
#[test]
fn wildcard_aborts_all() {
    let (engine, cli, svr) = pair();
    let other = Socket::new(engine.clone(), engine.open(host(3)).unwrap());

    let mine = (0..5)
        .map(|i| cli.initiate_request(b"ping", &host(2), i).unwrap().id)
        .collect::<Vec<_>>();
    let theirs = other.initiate_request(b"ping", &host(2), 0).unwrap().id;

    assert_eq!(
        cli.abort(AbortTarget::All, fail(libc::ETIMEDOUT)).unwrap(),
        Ack::Applied
    );
    let mut failed = std::iter::from_fn(|| engine.recv(cli.handle()))
        .map(|m| {
            assert_eq!(m.body, Body::Failed(libc::ETIMEDOUT));
            m.id
        })
        .collect::<Vec<_>>();
    failed.sort_unstable();
    assert_eq!(failed, mine);

    assert_eq!(engine.rpc_state(host(3), theirs), Some(RpcState::ClientSent));
    assert_eq!(engine.pending(svr.handle()), 6);

    // Nothing left to abort.
    assert_eq!(
        cli.abort(AbortTarget::All, AbortPolicy::Destroy).unwrap(),
        Ack::NotFound
    );
}

/// Test that aborting one RPC leaves its siblings alone.
#[test]
fn abort_one_leaves_others() {
    let (engine, cli, _svr) = pair();

    let a = cli.initiate_request(b"a", &host(2), 1).unwrap().id;
    let b = cli.initiate_request(b"b", &host(2), 2).unwrap().id;

    cli.abort(AbortTarget::One(a), AbortPolicy::Destroy).unwrap();
    assert_eq!(engine.rpc_state(host(1), a), None);
    assert_eq!(engine.rpc_state(host(1), b), Some(RpcState::ClientSent));
}

/// Test that aborting unknown or completed RPCs is a silent success.
#[test]
fn abort_is_idempotent() {
    let (engine, cli, svr) = pair();

    assert_eq!(
        cli.abort(AbortTarget::One(RpcId::new(424242)), AbortPolicy::Destroy)
            .unwrap(),
        Ack::NotFound
    );

    let sent = cli.initiate_request(b"ping", &host(2), 0).unwrap();
    let (req, _) = engine.recv(svr.handle()).unwrap().into_request().unwrap();
    svr.respond(req, b"pong").unwrap();
    assert_eq!(
        cli.abort(AbortTarget::One(sent.id), fail(libc::EIO)).unwrap(),
        Ack::NotFound
    );

    // The completed response is still there, and only it.
    assert_eq!(engine.recv(cli.handle()).unwrap().body, Body::Response(b"pong".to_vec()));
    assert!(engine.recv(cli.handle()).is_none());
}

/// Test that abort does not touch server RPCs.
#[test]
fn abort_ignores_server_rpcs() {
    let (engine, cli, svr) = pair();

    cli.initiate_request(b"ping", &host(2), 0).unwrap();
    let req = engine.recv(svr.handle()).unwrap();

    assert_eq!(
        svr.abort(AbortTarget::One(req.id), AbortPolicy::Destroy).unwrap(),
        Ack::NotFound
    );
    assert_eq!(
        svr.abort(AbortTarget::All, AbortPolicy::Destroy).unwrap(),
        Ack::NotFound
    );
    assert_eq!(svr.send_response(b"pong", &host(1), req.id).unwrap(), Ack::Applied);
}

/// Test that abort on a closed handle fails with the engine's error.
#[test]
fn abort_bad_handle() {
    let (engine, cli, _svr) = pair();
    assert!(engine.close(cli.handle()));

    let err = cli.abort(AbortTarget::All, AbortPolicy::Destroy).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EBADF));
}

/// Test that the abort block reaches the engine as given.
#[test]
fn abort_args_reach_engine() {
    let rec = Recorder::accepting();
    let sock = Socket::new(&rec, 3);

    sock.abort(AbortTarget::from(RpcId::NONE), fail(libc::EINTR))
        .unwrap();
    sock.abort(AbortTarget::One(RpcId::new(8)), AbortPolicy::Destroy)
        .unwrap();

    let calls = rec.calls();
    assert_eq!(calls.len(), 2);
    match (&calls[0], &calls[1]) {
        (Call::Control(ControlOp::Abort(all)), Call::Control(ControlOp::Abort(one))) => {
            assert!(all.is_wildcard());
            assert_eq!(all.error(), libc::EINTR);
            assert_eq!(one.id(), RpcId::new(8));
            assert_eq!(one.error(), 0);
        }
        other => panic!("unexpected calls: {:?}", other),
    }
}
