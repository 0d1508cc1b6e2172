//! Built-in services.
//!
//! Only the taskbar clock lives here; it is what `remolacha serve` exposes
//! out of the box and doubles as the reference streaming handler.

use std::time::Duration;

use chrono::{Local, Offset};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::connection::ServerConnection;
use crate::error::{ServerResult, ServiceResult};
use crate::registry::ServiceRegistry;

pub const TASKBAR_APP_ID: &str = "remolacha.Taskbar";

/// How often the clock checks the wall clock.
pub const TIME_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Drift beyond the expected tick that counts as a clock jump.
pub const TIME_ERROR_MARGIN: Duration = Duration::from_secs(5);

/// Registry holding every built-in service.
pub fn builtin_registry() -> ServerResult<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    register_builtin(&mut registry)?;
    Ok(registry)
}

/// Adds the built-in services to an existing registry.
pub fn register_builtin(registry: &mut ServiceRegistry) -> ServerResult<()> {
    registry.register(TASKBAR_APP_ID, "getCurrentTime", get_current_time)
}

/// One clock sample, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockReading {
    pub timestamp: i64,
    pub utc_offset: i64,
}

impl ClockReading {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            timestamp: now.timestamp_millis(),
            utc_offset: i64::from(now.offset().fix().local_minus_utc()) * 1000,
        }
    }

    /// True when the client has to be told about `self`, given the reading
    /// sent on the previous tick.
    pub fn differs_from(&self, previous: Option<&ClockReading>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        let expected = previous.timestamp + TIME_UPDATE_INTERVAL.as_millis() as i64;
        let drift = (expected - self.timestamp).unsigned_abs();
        drift > TIME_ERROR_MARGIN.as_millis() as u64 || previous.utc_offset != self.utc_offset
    }
}

/// Streams the wall clock until the client closes the connection.
///
/// A reading is sent on the first tick, then only when the clock jumped or
/// the UTC offset changed; the client interpolates in between.
pub async fn get_current_time(_params: Value, connection: ServerConnection) -> ServiceResult {
    let mut ticker = tokio::time::interval(TIME_UPDATE_INTERVAL);
    let mut last: Option<ClockReading> = None;

    loop {
        tokio::select! {
            _ = connection.closed() => break,
            _ = ticker.tick() => {
                let reading = ClockReading::now();
                if reading.differs_from(last.as_ref()) {
                    debug!(timestamp = reading.timestamp, utc_offset = reading.utc_offset, "clock update");
                    connection.send(reading)?;
                }
                last = Some(reading);
            }
        }
    }

    Ok(())
}
