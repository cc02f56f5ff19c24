//! Wire types exchanged between a master and its workers.
//!
//! Every value pushed to or popped from the store is one of the types below,
//! encoded as JSON. `Blob` wraps opaque bytes (a serialized user expression,
//! a combine function body, a task argument) so the dispatcher never needs
//! to understand their contents — it only moves them around.

use serde::de::{self, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque, base64-on-the-wire bytes. The core never inspects what's inside.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Blob {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use base64::Engine;
        let raw = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.as_bytes())
            .map_err(de::Error::custom)?;
        Ok(Blob(bytes))
    }
}

/// How the job's combine step is sourced — spec §4.2 / §9's tagged variant,
/// replacing the R side's nullable-or-"defer" sentinel.
#[derive(Debug, Clone, Default)]
pub enum ReduceSpec {
    /// No two-level reduction; results fold directly at the master.
    #[default]
    None,
    /// Use the same combine function supplied as `.combine` at submission time.
    Same,
    /// Use this explicit combine function for the worker-side local reduction.
    Explicit(Blob),
}

/// Per-job envelope stored under `Q.env.J` — spec §3 / §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The opaque, pre-serialized user expression.
    pub expr: Blob,
    /// Auto-discovered and explicitly exported bindings, by name.
    pub bindings: BTreeMap<String, Blob>,
    /// External packages/modules the worker must load before executing.
    pub packages: Vec<String>,
    /// The combine function body, present only when two-level reduction is
    /// enabled. Always environment-stripped by construction (§4.3 step 5) —
    /// the builder never has master-side state to capture in the first
    /// place, since `expr`/`combine` arrive as opaque blobs.
    pub combine: Option<Blob>,
}

/// One task's argument tuple, with the reserved RNG stream seed appended —
/// spec §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgsTuple {
    pub args: Vec<Blob>,
    /// Reserved key: the per-task RNG stream seed, so execution is
    /// reproducible independent of worker count.
    pub stream: Blob,
}

/// A chunk of tasks pushed to `Q` — spec §3.
///
/// `args_list` keys are task indices under single-level reduction, or the
/// shared output slot number under two-level reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChunk {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "argsList")]
    pub args_list: BTreeMap<u64, ArgsTuple>,
    /// The shared output slot every index in this chunk folds into, under
    /// two-level reduction. `None` under single-level reduction, where each
    /// task index is its own output slot (spec §4.4).
    #[serde(default)]
    pub slot: Option<u64>,
}

/// A result chunk popped from `Q.out.J` — spec §3: a single-entry map
/// `{ n -> value }` where `n` is the slot number.
#[derive(Debug, Clone)]
pub struct ResultChunk {
    pub slot: u64,
    pub value: Blob,
}

impl Serialize for ResultChunk {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.slot.to_string(), &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultChunk {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ResultChunkVisitor;

        impl<'de> Visitor<'de> for ResultChunkVisitor {
            type Value = ResultChunk;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a single-entry map of slot number to value")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let (key, value): (String, Blob) = map
                    .next_entry()?
                    .ok_or_else(|| de::Error::custom("result chunk map was empty"))?;
                if map.next_entry::<String, Blob>()?.is_some() {
                    return Err(de::Error::custom("result chunk map had more than one entry"));
                }
                let slot: u64 = key
                    .parse()
                    .map_err(|_| de::Error::custom(format!("invalid slot key: {key:?}")))?;
                Ok(ResultChunk { slot, value })
            }
        }

        deserializer.deserialize_map(ResultChunkVisitor)
    }
}
