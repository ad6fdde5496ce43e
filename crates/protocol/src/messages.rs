use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ProtocolError;
use crate::types::SessionId;

// ---------------------------------------------------------------------------
// Negotiation replies
// ---------------------------------------------------------------------------

/// Reply to `upload`: the service is listening for the file.
///
/// Sent on the wire as a two-element array `[fetch_id, port]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "UploadTicketWire")]
pub struct UploadTicket {
    pub session_id: SessionId,
    pub port: u16,
}

#[derive(Deserialize)]
struct UploadTicketWire(SessionId, #[serde(deserialize_with = "lenient_port")] u16);

impl From<UploadTicketWire> for UploadTicket {
    fn from(wire: UploadTicketWire) -> Self {
        Self {
            session_id: wire.0,
            port: wire.1,
        }
    }
}

/// Reply to `download`: the service is ready to stream the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTicket {
    #[serde(rename = "fetch_id")]
    pub session_id: SessionId,
    #[serde(rename = "server_port", deserialize_with = "lenient_port")]
    pub port: u16,
    #[serde(deserialize_with = "lenient_size")]
    pub file_size: u64,
}

// ---------------------------------------------------------------------------
// Confirmation replies
// ---------------------------------------------------------------------------

/// Definite outcome of the service's integrity check.
///
/// Sent on the wire as `[ok, detail]`; `detail` is usually a message but
/// may be any value, in which case its JSON rendering is kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "VerdictWire")]
pub struct TransferVerdict {
    pub ok: bool,
    pub detail: String,
}

#[derive(Deserialize)]
struct VerdictWire(
    #[serde(deserialize_with = "lenient_bool")] bool,
    #[serde(default)] serde_json::Value,
);

impl From<VerdictWire> for TransferVerdict {
    fn from(wire: VerdictWire) -> Self {
        let detail = match wire.1 {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Self { ok: wire.0, detail }
    }
}

// ---------------------------------------------------------------------------
// Server info
// ---------------------------------------------------------------------------

/// Reply to `get_server_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server_version: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns true for the values the service uses to mean "nothing".
pub fn is_falsy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Decodes a reply that may be empty.
///
/// Falsy values decode to `None`; anything else must match `T`.
pub fn decode_optional<T: DeserializeOwned>(
    value: serde_json::Value,
) -> Result<Option<T>, ProtocolError> {
    if is_falsy(&value) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {s:?}"))),
    }
}

fn lenient_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let n = lenient_size(deserializer)?;
    u16::try_from(n).map_err(|_| serde::de::Error::custom(format!("port out of range: {n}")))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_f64() != Some(0.0)),
        other => Err(serde::de::Error::custom(format!(
            "expected boolean status, got {other}"
        ))),
    }
}
