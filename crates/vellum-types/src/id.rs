use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::TypeError;

/// Custom epoch for canonical ids: 2023-01-01T00:00:00Z.
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_672_531_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_BITS: u32 = 41;

const MAX_WORKER: u16 = (1 << WORKER_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;
const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Longest decimal rendering of a `u64`.
const MAX_DIGITS: usize = 20;

/// Globally unique, time-ordered identifier minted by the engine.
///
/// Layout (most significant first): 41 bits of milliseconds since
/// [`SNOWFLAKE_EPOCH_MS`], 10 worker bits, 12 sequence bits. Canonical ids
/// are exchanged as decimal strings so that every layer sees one
/// representation, regardless of whether the client sent a number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalId(u64);

impl CanonicalId {
    /// Wrap a raw value. Zero is never a canonical id.
    pub fn new(raw: u64) -> Result<Self, TypeError> {
        if raw == 0 {
            return Err(TypeError::InvalidId("0".into()));
        }
        Ok(Self(raw))
    }

    /// Compose an id from its parts. Out-of-range parts are masked.
    pub fn from_parts(elapsed_ms: u64, worker: u16, sequence: u16) -> Self {
        let raw = ((elapsed_ms & MAX_TIMESTAMP) << (WORKER_BITS + SEQUENCE_BITS))
            | (u64::from(worker & MAX_WORKER) << SEQUENCE_BITS)
            | u64::from(sequence & MAX_SEQUENCE);
        Self(raw.max(1))
    }

    /// Parse a decimal string. Returns an error for anything that is not a
    /// non-zero `u64`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() || s.len() > MAX_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidId(s.to_string()));
        }
        let raw: u64 = s.parse().map_err(|_| TypeError::InvalidId(s.to_string()))?;
        Self::new(raw)
    }

    /// Returns `true` if `s` is already a valid canonical identifier.
    pub fn is_canonical(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Extract a canonical id from a JSON string or unsigned integer.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s).ok(),
            Value::Number(n) => n.as_u64().and_then(|raw| Self::new(raw).ok()),
            _ => None,
        }
    }

    /// The id as a JSON string value.
    pub fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }

    /// Raw 64-bit value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Milliseconds since the UNIX epoch at which this id was minted.
    pub fn timestamp_ms(&self) -> u64 {
        (self.0 >> (WORKER_BITS + SEQUENCE_BITS)) + SNOWFLAKE_EPOCH_MS
    }

    /// Worker that minted this id.
    pub fn worker(&self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) & u64::from(MAX_WORKER)) as u16
    }

    /// Per-millisecond sequence number.
    pub fn sequence(&self) -> u16 {
        (self.0 & u64::from(MAX_SEQUENCE)) as u16
    }
}

impl fmt::Debug for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalId({})", self.0)
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CanonicalId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CanonicalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CanonicalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = CanonicalId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a canonical id as a decimal string or unsigned integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                CanonicalId::parse(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                CanonicalId::new(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                let raw = u64::try_from(v).map_err(|_| E::custom(TypeError::InvalidId(v.to_string())))?;
                CanonicalId::new(raw).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

struct SnowflakeState {
    /// Last elapsed-millisecond value handed out.
    elapsed_ms: u64,
    /// Sequence within `elapsed_ms`.
    sequence: u16,
}

/// Snowflake id generator.
///
/// Ids from one generator are strictly increasing. When the sequence space
/// of a millisecond is exhausted, or the wall clock steps backwards, the
/// generator keeps counting from its own last timestamp instead of waiting
/// for the clock, like a hybrid logical clock does.
pub struct IdGenerator {
    worker: u16,
    state: Mutex<SnowflakeState>,
}

impl IdGenerator {
    /// Create a generator for the given worker (0..=1023).
    pub fn new(worker: u16) -> Result<Self, TypeError> {
        if worker > MAX_WORKER {
            return Err(TypeError::WorkerOutOfRange(worker));
        }
        Ok(Self {
            worker,
            state: Mutex::new(SnowflakeState {
                elapsed_ms: 0,
                sequence: 0,
            }),
        })
    }

    /// Create a generator with a random worker id, for single-process use.
    pub fn with_random_worker() -> Self {
        let worker = rand::Rng::gen_range(&mut rand::thread_rng(), 0..=MAX_WORKER);
        Self {
            worker,
            state: Mutex::new(SnowflakeState {
                elapsed_ms: 0,
                sequence: 0,
            }),
        }
    }

    /// The worker bits this generator stamps into every id.
    pub fn worker(&self) -> u16 {
        self.worker
    }

    /// Mint the next id.
    pub fn next_id(&self) -> CanonicalId {
        let wall = Self::elapsed_wall_ms();
        // The state is two plain integers; a panic elsewhere cannot leave it
        // half-written, so a poisoned lock is safe to reuse.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if wall > state.elapsed_ms {
            state.elapsed_ms = wall;
            state.sequence = 0;
        } else if state.sequence >= MAX_SEQUENCE {
            state.elapsed_ms += 1;
            state.sequence = 0;
        } else {
            state.sequence += 1;
        }

        CanonicalId::from_parts(state.elapsed_ms, self.worker, state.sequence)
    }

    fn elapsed_wall_ms() -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        now.saturating_sub(SNOWFLAKE_EPOCH_MS)
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("worker", &self.worker)
            .finish()
    }
}
