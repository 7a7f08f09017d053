//! Two in-process peers handshake over localhost and exchange keepalives.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use meridian_chain::block::Height;
use meridian_chain::parameters::Network;
use meridian_network::connection::{Connection, LocalIdentity, PeerEvent};
use meridian_network::{Message, Nonce, PeerServices, PeerState};

fn identity(nonce: u64) -> LocalIdentity {
    LocalIdentity {
        network: Network::Testnet,
        services: PeerServices::NODE_NETWORK,
        best_height: Height(0),
        nonce: Nonce(nonce),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        now: 1_700_000_000,
    }
}

#[tokio::test]
async fn handshake_then_ping_pong() {
    meridian_test::init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listen_addr = listener.local_addr().unwrap();

    // Side B accepts and runs its pump; its auto-pong answers pings.
    let server = tokio::spawn(async move {
        let (stream, addr) = listener.accept().await.unwrap();
        let connection = Connection::accept(stream, addr, identity(2)).await.unwrap();
        assert_eq!(connection.peer().state, PeerState::Active);
        assert!(connection.peer().version.is_some());

        let (events_tx, events_rx) = mpsc::channel(16);
        let (_commands_tx, commands_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(connection.run(events_tx, commands_rx, shutdown_rx));
        // Keep the channels alive for the duration of the test.
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(events_rx);
        drop(_commands_tx);
        drop(_shutdown_tx);
    });

    // Side A dials out.
    let connection = Connection::connect(listen_addr, identity(1)).await.unwrap();
    assert_eq!(connection.peer().state, PeerState::Active);
    let their_version = connection.peer().version.clone().unwrap();
    assert_eq!(their_version.start_height, Height(0));
    assert!(their_version.services.serves_network());

    let (events_tx, mut events_rx) = mpsc::channel(16);
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(connection.run(events_tx, commands_rx, shutdown_rx));

    // A manual ping is answered by B's pump.
    commands_tx
        .send(Message::Ping(Nonce(0xBEEF)))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .expect("pong should arrive within the timeout")
        .expect("event channel open");
    match event {
        PeerEvent::Pong { nonce, .. } => assert_eq!(nonce, Nonce(0xBEEF)),
        other => panic!("expected a pong event, got {:?}", other),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn self_connection_is_detected() {
    meridian_test::init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listen_addr = listener.local_addr().unwrap();

    // Both ends share a nonce, as when a node dials its own listener.
    let server = tokio::spawn(async move {
        let (stream, addr) = listener.accept().await.unwrap();
        Connection::accept(stream, addr, identity(7)).await
    });

    let client = Connection::connect(listen_addr, identity(7)).await;
    assert!(client.is_err() || server.await.unwrap().is_err());
}
