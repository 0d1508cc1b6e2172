//! Call and stream commands.

use std::time::Duration;

use remolacha_protocol::ConnectionEvent;
use serde_json::Value;
use tracing::debug;

use crate::backend::Backend;
use crate::commands::parse_params;
use crate::error::{ClientError, ClientResult};
use crate::transport::{Transport, TransportConfig};

/// Calls a service once and prints the JSON answer.
pub async fn call(
    transport_config: TransportConfig,
    timeout: Duration,
    app_id: &str,
    service: &str,
    params: Option<&str>,
) -> ClientResult<()> {
    let params = parse_params(params)?;
    let transport = Transport::connect(transport_config);
    let backend = Backend::new(transport.clone());

    let result = tokio::time::timeout(timeout, backend.call(app_id, service, params)).await;
    transport.shutdown();

    let value = result.map_err(|_| {
        ClientError::Timeout(format!("no answer from {app_id}/{service} after {timeout:?}"))
    })??;
    print_json(&value)
}

/// Opens a stream and prints each data event on its own line.
///
/// Stops after `count` events, when the server closes the stream, or on
/// Ctrl+C. Server `error` events are reported on stderr.
pub async fn stream(
    transport_config: TransportConfig,
    app_id: &str,
    service: &str,
    params: Option<&str>,
    count: Option<usize>,
) -> ClientResult<()> {
    let params = parse_params(params)?;
    let transport = Transport::connect(transport_config);
    let backend = Backend::new(transport.clone());

    let connection = backend.open_stream(app_id, service, params)?;
    let mut events = connection.subscribe();
    connection.open()?;

    let mut received = 0usize;
    let mut failure = None;
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        };

        match event {
            Some(ConnectionEvent::Data(data)) => {
                print_json(&data)?;
                received += 1;
                if count.is_some_and(|count| received >= count) {
                    break;
                }
            }
            Some(ConnectionEvent::Error(message)) => {
                eprintln!("error: {}", message);
                failure = Some(message);
            }
            Some(ConnectionEvent::Close) | None => break,
        }
    }

    connection.close();
    transport.shutdown();

    match failure {
        Some(message) => Err(ClientError::Remote(message)),
        None => Ok(()),
    }
}

fn print_json(value: &Value) -> ClientResult<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
