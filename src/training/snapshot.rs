//! Versioned, checksummed JSON envelope around persisted pipeline state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::common::error::{CoreError, CoreResult};
use crate::common::ids::SimpleHash;
use crate::common::time;

/// Bumped whenever the payload layout changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// On-disk wrapper. The payload is kept as a JSON string so the checksum
/// covers exactly the bytes that were written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub format_version: u32,
    pub kind: String,
    pub checksum: String,
    pub saved_ms: u64,
    pub payload: String,
}

/// Serialize `value` into envelope bytes.
pub fn seal<T: Serialize>(kind: &str, value: &T) -> CoreResult<Vec<u8>> {
    let payload = serde_json::to_string(value)?;
    let envelope = SnapshotEnvelope {
        format_version: SNAPSHOT_FORMAT_VERSION,
        kind: kind.to_string(),
        checksum: SimpleHash::digest_hex(payload.as_bytes()),
        saved_ms: u64::try_from(time::now_ms()).unwrap_or(u64::MAX),
        payload,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

/// Parse envelope bytes, checking version, kind and checksum before decoding.
pub fn open<T: DeserializeOwned>(kind: &str, bytes: &[u8]) -> CoreResult<T> {
    let envelope: SnapshotEnvelope = serde_json::from_slice(bytes)?;
    if envelope.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(CoreError::Codec(format!(
            "snapshot format {} is not supported (expected {})",
            envelope.format_version, SNAPSHOT_FORMAT_VERSION
        )));
    }
    if envelope.kind != kind {
        return Err(CoreError::Codec(format!(
            "snapshot holds {:?}, expected {kind:?}",
            envelope.kind
        )));
    }
    let actual = SimpleHash::digest_hex(envelope.payload.as_bytes());
    if actual != envelope.checksum {
        return Err(CoreError::Codec(format!(
            "checksum mismatch: stored {}, computed {actual}",
            envelope.checksum
        )));
    }
    Ok(serde_json::from_str(&envelope.payload)?)
}
