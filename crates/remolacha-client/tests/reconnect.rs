//! Frames sent while the socket is down survive the reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use remolacha_client::{Backend, ChannelConnector, Transport, TransportConfig};
use remolacha_protocol::{ConnectionEvent, ConnectionId, Frame, PhysicalSocket};
use remolacha_server::{ServiceRegistry, Session};
use serde_json::{Value, json};

fn quick_reconnect() -> TransportConfig {
    TransportConfig::default().with_reconnect_delay(Duration::from_millis(10))
}

async fn wait_disconnected(transport: &Transport) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while transport.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transport should notice the dropped socket");
}

#[tokio::test]
async fn queued_frames_are_flushed_in_order() {
    let (sockets, connector) = ChannelConnector::new();
    let transport = Transport::with_connector(connector, quick_reconnect());
    let backend = Backend::new(transport.clone());

    let (client, server) = PhysicalSocket::pair();
    sockets.send(client).unwrap();
    transport.wait_connected().await;
    drop(server);
    wait_disconnected(&transport).await;

    let stream = backend
        .open_stream("remolacha.Terminal", "openShell", json!({"cols": 80}))
        .unwrap();
    stream.open().unwrap();
    for line in ["ls", "pwd", "exit"] {
        stream.send(json!(line)).unwrap();
    }
    assert_eq!(transport.pending_len(), 4);

    let (client, server) = PhysicalSocket::pair();
    sockets.send(client).unwrap();
    let (_sink, mut inbound) = server.split();

    let mut frames = Vec::new();
    for _ in 0..4 {
        frames.push(inbound.next().await.unwrap().unwrap());
    }

    let id = stream.id().clone();
    assert_eq!(
        frames,
        vec![
            Frame::open(id.clone(), "remolacha.Terminal", "openShell", json!({"cols": 80})),
            Frame::data(id.clone(), json!("ls")),
            Frame::data(id.clone(), json!("pwd")),
            Frame::data(id, json!("exit")),
        ]
    );
    assert_eq!(transport.pending_len(), 0);
    transport.shutdown();
}

#[tokio::test]
async fn connections_survive_socket_loss_on_the_client() {
    let (sockets, connector) = ChannelConnector::new();
    let transport = Transport::with_connector(connector, quick_reconnect());
    let backend = Backend::new(transport.clone());

    let (client, server) = PhysicalSocket::pair();
    sockets.send(client).unwrap();
    transport.wait_connected().await;

    let stream = backend.open_stream("remolacha.Test", "watch", ()).unwrap();
    let mut events = stream.subscribe();
    stream.open().unwrap();

    drop(server);
    wait_disconnected(&transport).await;
    assert!(!stream.is_closed());

    let (client, server) = PhysicalSocket::pair();
    sockets.send(client).unwrap();
    transport.wait_connected().await;

    let (mut sink, _inbound) = server.split();
    sink.send(Frame::data(ConnectionId::from(0), json!("still here")))
        .await
        .unwrap();

    assert_eq!(
        events.recv().await,
        Some(ConnectionEvent::Data(json!("still here")))
    );
    transport.shutdown();
}

#[tokio::test]
async fn call_issued_while_offline_completes_after_reconnect() {
    let mut registry = ServiceRegistry::new();
    registry
        .register("remolacha.Test", "echo", |params: Value, connection| async move {
            connection.send(params)?;
            Ok(())
        })
        .unwrap();
    let registry = Arc::new(registry);

    let (sockets, connector) = ChannelConnector::new();
    let transport = Transport::with_connector(connector, quick_reconnect());
    let backend = Backend::new(transport.clone());

    let pending_call = tokio::spawn({
        let backend = backend.clone();
        async move { backend.call("remolacha.Test", "echo", json!({"n": 7})).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!transport.is_connected());

    let (client, server) = PhysicalSocket::pair();
    tokio::spawn(Session::new(registry).run(server));
    sockets.send(client).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), pending_call)
        .await
        .expect("call should complete once connected")
        .unwrap()
        .unwrap();
    assert_eq!(result, json!({"n": 7}));
    transport.shutdown();
}

#[tokio::test]
async fn shutdown_closes_live_connections() {
    let (_sockets, connector) = ChannelConnector::new();
    let transport = Transport::with_connector(connector, quick_reconnect());
    let backend = Backend::new(transport.clone());

    let stream = backend.open_stream("remolacha.Test", "watch", ()).unwrap();
    let mut events = stream.subscribe();
    stream.open().unwrap();

    transport.shutdown();
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap(),
        Some(ConnectionEvent::Close)
    );
    assert!(stream.is_closed());
}
