use std::time::{SystemTime, UNIX_EPOCH};

use types::Replica;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ACastStep {
    Msg,
    Echo,
    Ready,
}

/// One step of a Bracha broadcast instance. The uuid identifies the
/// instance; ECHO and READY votes are counted per (uuid, value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ACastMsg<V> {
    pub step: ACastStep,
    pub uuid: String,
    pub value: V,
    pub from: Replica,
}

impl<V: Serialize> ACastMsg<V> {
    /// Initial MSG of a new broadcast instance with a content-derived uuid.
    /// The timestamp component carries no meaning; it keeps uuids unique
    /// across retries with identical content.
    pub fn initial(value: V, from: Replica) -> ACastMsg<V> {
        let uuid = content_uuid(&value, from);
        ACastMsg {
            step: ACastStep::Msg,
            uuid,
            value,
            from,
        }
    }

    /// Initial MSG under a caller-chosen uuid. IVSS payloads use structured
    /// uuids so each of their broadcast instances is addressable.
    pub fn with_uuid(uuid: String, value: V, from: Replica) -> ACastMsg<V> {
        ACastMsg {
            step: ACastStep::Msg,
            uuid,
            value,
            from,
        }
    }
}

fn content_uuid<V: Serialize>(value: &V, from: Replica) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(bincode::serialize(value).expect("payload serialization failed"));
    hasher.update(from.to_be_bytes());
    hasher.update(nanos.to_be_bytes());
    hex::encode(hasher.finalize())
}
