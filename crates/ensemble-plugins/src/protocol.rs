//! Wire types of the plugin stdio protocol.
//!
//! The host writes exactly one JSON request line to a plugin entry process
//! and reads exactly one JSON response line back. Two operations exist:
//! `describe` (capability handshake) and `invoke` (one function call).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol tag carried in every request.
pub const PROTOCOL_VERSION: &str = "ensemble.plugin.v1";

#[derive(Debug, Serialize)]
pub struct DescribeRequest {
    protocol: &'static str,
    op: &'static str,
}

impl DescribeRequest {
    pub fn new() -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            op: "describe",
        }
    }
}

impl Default for DescribeRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct InvokeRequest<'a> {
    protocol: &'static str,
    op: &'static str,
    pub function: &'a str,
    pub params: &'a Value,
}

impl<'a> InvokeRequest<'a> {
    pub fn new(function: &'a str, params: &'a Value) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            op: "invoke",
            function,
            params,
        }
    }
}

/// `describe` answer: every service the plugin exports.
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeResponse {
    #[serde(default)]
    pub services: Vec<RawServiceExport>,
}

/// One exported service before normalization.
///
/// All three capability members are optional at the wire level; the loader
/// decides what constitutes a usable service.
#[derive(Debug, Clone, Deserialize)]
pub struct RawServiceExport {
    #[serde(default)]
    pub name: Option<String>,
    /// Must be a JSON mapping; anything else is dropped with a warning.
    #[serde(default)]
    pub config: Option<Value>,
    /// Function catalog: a JSON array, or a serialized JSON array string.
    #[serde(default)]
    pub functions: Option<Value>,
}

/// `invoke` answer: a result value or an error message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InvokeResponse {
    Ok { ok: Value },
    Error { error: String },
}
