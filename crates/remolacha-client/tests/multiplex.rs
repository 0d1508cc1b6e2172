//! Client transport against a real server session over an in-memory socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use remolacha_client::{Backend, ChannelConnector, ClientError, Transport, TransportConfig};
use remolacha_protocol::{ConnectionEvent, ConnectionState, PhysicalSocket};
use remolacha_server::{ServerConnection, ServiceError, ServiceRegistry, Session};
use serde_json::{Value, json};
use tokio::sync::oneshot;

struct Harness {
    backend: Backend,
    sends: Arc<AtomicUsize>,
    monitor_exit: Option<oneshot::Receiver<()>>,
}

fn registry(sends: Arc<AtomicUsize>, monitor_exit: oneshot::Sender<()>) -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();

    registry
        .register("remolacha.Files", "readDirectory", |params: Value, connection| async move {
            let path = params["path"].as_str().unwrap_or("/").to_string();
            connection.send(json!({
                "path": path,
                "elements": [{"name": "a.txt", "size": 3}],
            }))?;
            connection.send(json!("ignored by call"))?;
            Ok(())
        })
        .unwrap();

    let monitor_exit = std::sync::Mutex::new(Some(monitor_exit));
    let monitor_exit = Arc::new(monitor_exit);
    registry
        .register("remolacha.Monitor", "getProcesses", move |_params, connection: ServerConnection| {
            let sends = sends.clone();
            let monitor_exit = monitor_exit.clone();
            async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                let mut n = 0u64;
                loop {
                    tokio::select! {
                        _ = connection.closed() => break,
                        _ = ticker.tick() => {
                            if connection.is_closed() {
                                break;
                            }
                            connection.send(json!({"tick": n}))?;
                            sends.fetch_add(1, Ordering::SeqCst);
                            n += 1;
                        }
                    }
                }
                if let Some(tx) = monitor_exit.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                Ok(())
            }
        })
        .unwrap();

    registry
        .register("remolacha.Test", "count", |params: Value, connection| async move {
            let upto = params.as_u64().unwrap_or(0);
            for n in 0..upto {
                connection.send(n)?;
            }
            Ok(())
        })
        .unwrap();

    registry
        .register("remolacha.Test", "broken", |_params, _connection| async move {
            Err(ServiceError::failed("disk on fire"))
        })
        .unwrap();

    registry
}

async fn harness() -> Harness {
    let sends = Arc::new(AtomicUsize::new(0));
    let (exit_tx, exit_rx) = oneshot::channel();
    let registry = Arc::new(registry(sends.clone(), exit_tx));

    let (sockets, connector) = ChannelConnector::new();
    let (client, server) = PhysicalSocket::pair();
    tokio::spawn(Session::new(registry).run(server));
    sockets.send(client).unwrap();

    let transport = Transport::with_connector(connector, TransportConfig::default());
    transport.wait_connected().await;

    Harness {
        backend: Backend::new(transport),
        sends,
        monitor_exit: Some(exit_rx),
    }
}

#[tokio::test]
async fn call_resolves_with_first_data_and_closes_both_sides() {
    let harness = harness().await;

    let result = harness
        .backend
        .call("remolacha.Files", "readDirectory", json!({"path": "/tmp"}))
        .await
        .unwrap();

    assert_eq!(
        result,
        json!({"path": "/tmp", "elements": [{"name": "a.txt", "size": 3}]})
    );
    assert_eq!(harness.backend.transport().connection_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn closing_a_stream_stops_the_handler() {
    let mut harness = harness().await;

    let stream = harness
        .backend
        .open_stream("remolacha.Monitor", "getProcesses", ())
        .unwrap();
    let mut events = stream.subscribe();
    stream.open().unwrap();

    for expected in 0..2u64 {
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Data(json!({"tick": expected})))
        );
    }
    stream.close();
    assert_eq!(events.recv().await, Some(ConnectionEvent::Close));
    assert_eq!(events.recv().await, None);

    let exited = harness.monitor_exit.take().unwrap();
    tokio::time::timeout(Duration::from_secs(2), exited)
        .await
        .expect("handler should notice the close")
        .unwrap();
    assert_eq!(harness.sends.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.sends.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_app_yields_one_error_then_close() {
    let harness = harness().await;

    let stream = harness
        .backend
        .open_stream("remolacha.X", "missing", ())
        .unwrap();
    let mut events = stream.subscribe();
    stream.open().unwrap();

    assert_eq!(
        events.recv().await,
        Some(ConnectionEvent::Error("App \"remolacha.X\" not found.".into()))
    );
    assert_eq!(events.recv().await, Some(ConnectionEvent::Close));
    assert_eq!(events.recv().await, None);
    assert_eq!(stream.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn stream_sees_every_data_event_in_order_then_close() {
    let harness = harness().await;

    let stream = harness
        .backend
        .open_stream("remolacha.Test", "count", 25)
        .unwrap();
    let mut events = stream.subscribe();
    stream.open().unwrap();

    let mut received = Vec::new();
    loop {
        match events.recv().await {
            Some(ConnectionEvent::Data(value)) => received.push(value.as_u64().unwrap()),
            Some(ConnectionEvent::Close) => break,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(received, (0..25).collect::<Vec<_>>());
    assert_eq!(events.recv().await, None);
    stream.close();
}

#[tokio::test]
async fn handler_error_reaches_call() {
    let harness = harness().await;

    let error = harness
        .backend
        .call("remolacha.Test", "broken", ())
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::Remote(message) if message == "disk on fire"));
}

#[tokio::test]
async fn concurrent_calls_do_not_interfere() {
    let harness = harness().await;

    let calls = (0..10u64).map(|n| {
        let backend = harness.backend.clone();
        tokio::spawn(async move { backend.call("remolacha.Test", "count", n + 1).await })
    });

    for call in calls.collect::<Vec<_>>() {
        assert_eq!(call.await.unwrap().unwrap(), json!(0));
    }
    assert_eq!(harness.backend.transport().connection_count(), 0);
}
