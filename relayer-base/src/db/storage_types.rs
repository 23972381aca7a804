use relayer_core::vaa::VaaId;
use relayer_core::UnixMillis;
use serde::{Deserialize, Serialize};

/// Lifecycle of a job in the durable queue.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    /// Due now or scheduled for a later attempt
    Waiting,
    /// Claimed by a worker
    Active,
    /// Relayed, or found to be redeemed already
    Completed,
    /// Out of attempts, or failed with an error that is never retried
    Failed,
}

/// A unit of relay work: one VAA, keyed by its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Stable job id, the rendered `VaaId`
    pub id: String,
    /// Identity of the VAA
    pub vaa_id: VaaId,
    /// The signed VAA as received
    #[serde(with = "hex_bytes")]
    pub vaa_bytes: Vec<u8>,
    /// Current state
    pub state: JobState,
    /// Attempts made so far
    pub attempts: u32,
    /// Attempts allowed before the job is failed
    pub max_attempts: u32,
    /// When the job was first queued
    pub created_at: UnixMillis,
    /// Earliest time of the next attempt
    pub run_at: UnixMillis,
    /// When the job reached `Completed` or `Failed`
    pub finished_at: Option<UnixMillis>,
    /// Error of the latest failed attempt
    pub last_error: Option<String>,
    /// Hash or id of the redeeming transaction
    pub tx_id: Option<String>,
}

impl Job {
    /// A job that is due immediately.
    pub fn new(vaa_id: VaaId, vaa_bytes: Vec<u8>, max_attempts: u32, now: UnixMillis) -> Self {
        Self {
            id: vaa_id.to_string(),
            vaa_id,
            vaa_bytes,
            state: JobState::Waiting,
            attempts: 0,
            max_attempts,
            created_at: now,
            run_at: now,
            finished_at: None,
            last_error: None,
            tx_id: None,
        }
    }

    /// Whether another attempt is allowed after the current one failed.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
