//! Subcommand implementations.

pub mod call;
pub mod config;
pub mod serve;

use serde_json::Value;

use crate::error::{ClientError, ClientResult};

/// Parses a command-line JSON argument; absent means `null`.
pub(crate) fn parse_params(raw: Option<&str>) -> ClientResult<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ClientError::Config(format!("params are not valid JSON: {}", e))),
    }
}
