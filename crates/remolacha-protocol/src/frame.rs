//! Frame and connection ID types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies one logical connection on a physical socket.
///
/// On the wire this is always a string. Clients generate decimal counters,
/// but the server treats the value as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a connection ID from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the ID back into the numeric form clients allocate from.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accepts both `"12"` and `12`; older peers sent bare numbers.
impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        struct StringOrNumber;

        impl de::Visitor<'_> for StringOrNumber {
            type Value = ConnectionId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a connection ID string or integer")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ConnectionId, E> {
                Ok(ConnectionId::new(value))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<ConnectionId, E> {
                Ok(ConnectionId(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<ConnectionId, E> {
                Ok(ConnectionId::from(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<ConnectionId, E> {
                Ok(ConnectionId(value.to_string()))
            }
        }

        deserializer.deserialize_any(StringOrNumber)
    }
}

/// One message on the physical socket.
///
/// ```text
/// {"action":"open","connectionId":"0","appId":"remolacha.Files","service":"readDirectory","params":{...}}
/// {"action":"data","connectionId":"0","data":{...}}
/// {"action":"error","connectionId":"0","error":"..."}
/// {"action":"close","connectionId":"0"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Frame {
    /// Client asks the server to start a service on a new connection.
    Open {
        connection_id: ConnectionId,
        app_id: String,
        service: String,
        #[serde(default)]
        params: Value,
    },

    /// Payload travelling in either direction.
    Data {
        connection_id: ConnectionId,
        #[serde(default)]
        data: Value,
    },

    /// Either side ends the connection.
    Close { connection_id: ConnectionId },

    /// Server reports a failure; does not close by itself.
    Error {
        connection_id: ConnectionId,
        error: String,
    },
}

impl Frame {
    /// Creates an `open` frame.
    pub fn open(
        connection_id: ConnectionId,
        app_id: impl Into<String>,
        service: impl Into<String>,
        params: Value,
    ) -> Self {
        Self::Open {
            connection_id,
            app_id: app_id.into(),
            service: service.into(),
            params,
        }
    }

    /// Creates a `data` frame.
    pub fn data(connection_id: ConnectionId, data: Value) -> Self {
        Self::Data {
            connection_id,
            data,
        }
    }

    /// Creates a `close` frame.
    pub fn close(connection_id: ConnectionId) -> Self {
        Self::Close { connection_id }
    }

    /// Creates an `error` frame.
    pub fn error(connection_id: ConnectionId, error: impl Into<String>) -> Self {
        Self::Error {
            connection_id,
            error: error.into(),
        }
    }

    /// The connection this frame belongs to.
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            Self::Open { connection_id, .. }
            | Self::Data { connection_id, .. }
            | Self::Close { connection_id }
            | Self::Error { connection_id, .. } => connection_id,
        }
    }

    /// The wire name of this frame's action.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Data { .. } => "data",
            Self::Close { .. } => "close",
            Self::Error { .. } => "error",
        }
    }
}
