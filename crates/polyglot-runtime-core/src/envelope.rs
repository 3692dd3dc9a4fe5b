//! Guest wire format.
//!
//! The guest reads one JSON object from standard input and writes one JSON
//! object to standard output. Byte fields are standard padded base64 strings.
//!
//! Input: `{"currentState": .., "payload": .., "actor": ..}`
//!
//! Output: `{"result": .., "success": bool, "endState": .., "error": ".."}`.
//! Only `success` is required; absent or `null` byte fields read as empty.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use polyglot_runtime_common::RuntimeError;

/// Call arguments written to the guest's standard input.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope<'a> {
    #[serde(serialize_with = "serialize_base64")]
    pub current_state: &'a [u8],
    #[serde(serialize_with = "serialize_base64")]
    pub payload: &'a [u8],
    #[serde(serialize_with = "serialize_base64")]
    pub actor: &'a [u8],
}

impl CallEnvelope<'_> {
    /// Serialize the envelope to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RuntimeError> {
        serde_json::to_vec(self).map_err(|e| RuntimeError::Protocol {
            reason: format!("Failed to encode call envelope: {e}"),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

/// Outcome read from the guest's standard output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    #[serde(default, deserialize_with = "deserialize_base64")]
    pub result: Vec<u8>,
    pub success: bool,
    #[serde(default, deserialize_with = "deserialize_base64")]
    pub end_state: Vec<u8>,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub error: String,
}

impl ResultEnvelope {
    /// Parse the guest's standard output.
    ///
    /// Surrounding whitespace is ignored. Any other deviation from the
    /// envelope shape is a protocol error carrying the raw output.
    pub fn parse(stdout: &[u8], stderr: &[u8]) -> Result<Self, RuntimeError> {
        serde_json::from_slice(stdout).map_err(|e| RuntimeError::Protocol {
            reason: format!("Malformed result envelope: {e}"),
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
        })
    }
}

fn serialize_base64<S: Serializer>(bytes: &&[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(encoded) => STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom),
        None => Ok(Vec::new()),
    }
}

fn deserialize_nullable_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
