use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Builder, Uuid};

use crate::error::TypeError;

/// Identifier of a blob metadata row.
///
/// Uses the UUIDv7 layout: the leading 48 bits are the creation time in
/// Unix milliseconds, so ids sort by creation time and a time bound can be
/// turned into an id bound with [`BlobInfoId::floor`]. The remaining bits
/// hold a per-generator node tag and a strictly increasing counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobInfoId(Uuid);

impl BlobInfoId {
    /// The smallest possible id. Used as the initial import cursor.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// The smallest id that can be generated at or after `time`.
    ///
    /// Every id generated before `time` compares strictly less than the
    /// result, every id generated at or after it compares greater or equal.
    pub fn floor(time: DateTime<Utc>) -> Self {
        let millis = time.timestamp_millis().max(0) as u64;
        Self(Builder::from_unix_timestamp_millis(millis, &[0u8; 10]).into_uuid())
    }

    fn build(millis: u64, node: u16, counter: u64) -> Self {
        let mut tail = [0u8; 10];
        tail[..2].copy_from_slice(&node.to_be_bytes());
        tail[2..].copy_from_slice(&counter.to_be_bytes());
        Self(Builder::from_unix_timestamp_millis(millis, &tail).into_uuid())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Creation time in Unix milliseconds.
    pub fn timestamp_millis(&self) -> u64 {
        let bytes = self.0.as_bytes();
        let mut millis = [0u8; 8];
        millis[2..].copy_from_slice(&bytes[..6]);
        u64::from_be_bytes(millis)
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_millis() as i64)
            .single()
            .unwrap_or_default()
    }

    /// Lowercase hex without dashes, suitable for paths.
    pub fn to_simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Debug for BlobInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobInfoId({})", self.to_simple())
    }
}

impl fmt::Display for BlobInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_simple())
    }
}

impl FromStr for BlobInfoId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidId(e.to_string()))
    }
}

/// Generates strictly increasing [`BlobInfoId`]s.
///
/// Ids generated by one generator are monotonic even if the supplied time
/// goes backwards: the generator keeps issuing ids in the last seen
/// millisecond with an incremented counter. Each generator carries a random
/// node tag so that service instances sharing a metadata store do not
/// collide within the same millisecond.
#[derive(Debug)]
pub struct BlobInfoIdGenerator {
    node: u16,
    state: Mutex<GeneratorState>,
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_millis: u64,
    counter: u64,
}

impl BlobInfoIdGenerator {
    /// The version nibble overwrites the top four bits of the node tag.
    const NODE_MASK: u16 = 0x0fff;
    /// The variant bits overwrite the top two bits of the counter.
    const COUNTER_LIMIT: u64 = 1 << 62;

    pub fn new() -> Self {
        Self::with_node(rand::random::<u16>())
    }

    /// Create a generator with a fixed node tag (tests).
    pub fn with_node(node: u16) -> Self {
        Self {
            node: node & Self::NODE_MASK,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// Next id for the given wall-clock time.
    pub fn next(&self, now: DateTime<Utc>) -> BlobInfoId {
        let millis = now.timestamp_millis().max(0) as u64;
        let mut state = self.state.lock().expect("lock poisoned");
        if millis > state.last_millis {
            state.last_millis = millis;
            state.counter = 1;
        } else {
            state.counter += 1;
            if state.counter >= Self::COUNTER_LIMIT {
                state.last_millis += 1;
                state.counter = 1;
            }
        }
        BlobInfoId::build(state.last_millis, self.node, state.counter)
    }
}

impl Default for BlobInfoIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
