//! Environment signals and their deterministic representation
//!
//! Everything the fingerprint is built from passes through this module:
//! the `SignalValue` union that every probe produces, the `ParameterSet`
//! assembled from a loaded snapshot, and the canonical string / 128-bit
//! hash the fingerprint is derived from.

pub mod aggregate;
pub mod canonical;
pub mod hash;
pub mod probes;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use aggregate::{AggregateResult, SignalAggregator, SignalOutcome};
pub use canonical::canonicalize;
pub use hash::hash128;
pub use probes::SignalProbe;

/// A collected environment attribute.
///
/// Maps (both here and in `ParameterSet`) are `BTreeMap` so value
/// identity depends on content, never on construction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// The attribute exists but carries no value (distinct from a probe
    /// failure, which is tracked as `SignalOutcome::Unavailable`).
    Absent,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<SignalValue>),
    Map(BTreeMap<String, SignalValue>),
}

/// Named attributes assembled for one fingerprint computation.
///
/// Built fresh from the current snapshot on every request; never
/// persisted.
pub type ParameterSet = BTreeMap<String, SignalValue>;

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Number(v)
    }
}

impl From<u32> for SignalValue {
    fn from(v: u32) -> Self {
        SignalValue::Number(v as f64)
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::Text(v.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(v: String) -> Self {
        SignalValue::Text(v)
    }
}

impl From<Vec<SignalValue>> for SignalValue {
    fn from(v: Vec<SignalValue>) -> Self {
        SignalValue::List(v)
    }
}

impl SignalValue {
    /// Build a map value from an iterator of named entries.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SignalValue>,
    {
        SignalValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
