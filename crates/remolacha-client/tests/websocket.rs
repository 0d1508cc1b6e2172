//! End to end over a real WebSocket listener.

use std::sync::Arc;
use std::time::Duration;

use remolacha_client::{AppInstances, AppManifest, Backend, Transport, TransportConfig};
use remolacha_protocol::ConnectionEvent;
use remolacha_server::{ServerConfig, SignalHandler, SocketServer, services};

async fn start_server() -> (String, SignalHandler) {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
    let server = SocketServer::bind(config).await.unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());

    let signals = SignalHandler::new();
    let shutdown = signals.shutdown();
    let registry = Arc::new(services::builtin_registry().unwrap());
    tokio::spawn(async move { server.run_until_shutdown(registry, shutdown.wait()).await });

    (url, signals)
}

#[tokio::test]
async fn clock_stream_over_websocket() {
    let (url, signals) = start_server().await;
    let transport = Transport::connect(
        TransportConfig::new(url).with_reconnect_delay(Duration::from_millis(20)),
    );
    let backend = Backend::new(transport.clone());

    let stream = backend
        .open_stream(services::TASKBAR_APP_ID, "getCurrentTime", ())
        .unwrap();
    let mut events = stream.subscribe();
    stream.open().unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    let Some(ConnectionEvent::Data(reading)) = event else {
        panic!("expected a clock reading, got {event:?}");
    };
    assert!(reading["timestamp"].as_i64().unwrap() > 0);
    assert!(reading["utcOffset"].is_i64());

    stream.close();
    transport.shutdown();
    signals.trigger_shutdown();
}

#[tokio::test]
async fn app_instance_calls_are_scoped_to_their_app() {
    let (url, signals) = start_server().await;
    let transport = Transport::connect(TransportConfig::new(url));
    let mut apps = AppInstances::new(Backend::new(transport.clone()));
    apps.register_app(AppManifest::new(services::TASKBAR_APP_ID, "Taskbar").singleton());

    let taskbar = apps.open_app(services::TASKBAR_APP_ID).unwrap();
    let stream = taskbar.open_stream("getCurrentTime", ()).unwrap();
    assert_eq!(stream.app_id(), services::TASKBAR_APP_ID);

    let error = tokio::time::timeout(Duration::from_secs(5), taskbar.call("nope", ()))
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "server error: Service \"nope\" not found on app \"remolacha.Taskbar\"."
    );

    taskbar.exit();
    assert!(stream.is_closed());
    transport.shutdown();
    signals.trigger_shutdown();
}
