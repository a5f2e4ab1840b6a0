use std::sync::mpsc;
use std::thread;

use homa_api::transport::LoopbackEngine;
use homa_api::{type_alias::PeerAddr, *};

fn main() {
    const HELLO_WORLD: &str = "Hello, world!";
    const COOKIE: u64 = 42;

    let cli_addr = PeerAddr::from(([127, 0, 0, 1], 31850));
    let svr_addr = PeerAddr::from(([127, 0, 0, 1], 31851));

    let engine = LoopbackEngine::new();
    let (finish_tx, finish_rx) = mpsc::channel();

    // Server thread: answer every request with the same greeting.
    let svr = Socket::new(engine.clone(), engine.open(svr_addr).unwrap());
    let handle = thread::spawn(move || {
        let engine = svr.engine().clone();
        while finish_rx.try_recv().is_err() {
            let Some(inbound) = engine.recv(svr.handle()) else {
                thread::yield_now();
                continue;
            };
            if let Ok((req, payload)) = inbound.into_request() {
                println!(
                    "server: request {} from {}: {:?}",
                    req.id(),
                    req.peer(),
                    String::from_utf8_lossy(&payload)
                );
                svr.respond(req, HELLO_WORLD.as_bytes()).unwrap();
            }
        }
    });

    // Client thread.
    let cli = Socket::new(engine.clone(), engine.open(cli_addr).unwrap());
    let sent = cli.initiate_request(b"hi", &svr_addr, COOKIE).unwrap();
    println!("client: request {} accepted ({} bytes)", sent.id, sent.bytes);

    let resp = loop {
        match engine.recv(cli.handle()) {
            Some(resp) => break resp,
            None => thread::yield_now(),
        }
    };
    assert_eq!(resp.id, sent.id);
    assert_eq!(resp.cookie, COOKIE);
    assert_eq!(resp.payload(), Some(HELLO_WORLD.as_bytes()));
    println!(
        "client: response {}: {:?}",
        resp.id,
        String::from_utf8_lossy(resp.payload().unwrap_or_default())
    );

    finish_tx.send(()).unwrap();
    handle.join().unwrap();
}
