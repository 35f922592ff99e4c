//! Concurrent signal aggregation
//!
//! Runs every registered probe concurrently, isolates per-probe
//! failures, and memoizes the aggregate for the lifetime of the owning
//! identity instance. The aggregator itself never fails: a degraded
//! environment degrades the quality of the result, not its
//! availability.

use std::collections::BTreeMap;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::signal::{ParameterSet, SignalProbe, SignalValue};

/// Outcome slot for one named signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalOutcome {
    /// The probe resolved.
    Available(SignalValue),
    /// The probe failed, timed out, or reported an unsupported
    /// capability. An explicit marker, not a missing entry: the slot is
    /// still present in the aggregate.
    Unavailable,
}

impl SignalOutcome {
    /// Collapse into a signal value for parameter-set assembly.
    pub fn to_signal_value(&self) -> SignalValue {
        match self {
            SignalOutcome::Available(value) => value.clone(),
            SignalOutcome::Unavailable => SignalValue::Absent,
        }
    }
}

/// One entry per registered probe, keyed by probe name. Published
/// atomically: callers only ever observe the fully-settled map.
pub type AggregateResult = BTreeMap<String, SignalOutcome>;

/// Single-flight collector over a set of named probes.
///
/// The first `collect` call starts every probe concurrently and stores
/// the in-flight work; every other call — including calls made before
/// the first one resolves — awaits and shares that same execution.
pub struct SignalAggregator {
    probes: Vec<Box<dyn SignalProbe>>,
    result: OnceCell<AggregateResult>,
}

impl SignalAggregator {
    pub fn new(probes: Vec<Box<dyn SignalProbe>>) -> Self {
        Self {
            probes,
            result: OnceCell::new(),
        }
    }

    /// Collect all signals, or return the already-collected aggregate.
    ///
    /// Never fails. Each probe error is logged and recorded as
    /// [`SignalOutcome::Unavailable`] without disturbing sibling probes.
    pub async fn collect(&self) -> &AggregateResult {
        self.result
            .get_or_init(|| async {
                let readings = self.probes.iter().map(|probe| async move {
                    match probe.read().await {
                        Ok(value) => (probe.name().to_string(), SignalOutcome::Available(value)),
                        Err(e) => {
                            log::warn!("signal '{}' unavailable: {}", probe.name(), e);
                            (probe.name().to_string(), SignalOutcome::Unavailable)
                        }
                    }
                });
                join_all(readings).await.into_iter().collect()
            })
            .await
    }

    /// The aggregate, if collection has already completed.
    pub fn collected(&self) -> Option<&AggregateResult> {
        self.result.get()
    }
}

/// Assemble a parameter set from a settled aggregate. Unavailable slots
/// become `Absent` so they still contribute a stable fragment to the
/// canonical string.
pub fn params_from_signals(signals: &AggregateResult) -> ParameterSet {
    signals
        .iter()
        .map(|(name, outcome)| (name.clone(), outcome.to_signal_value()))
        .collect()
}
