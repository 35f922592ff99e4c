//! Signal probe seam and the standard environment signals
//!
//! Individual probes read screen, font, codec, permission and similar
//! state from the host environment. They are collaborators of this
//! crate: anything implementing [`SignalProbe`] can feed the aggregator,
//! and each probe is independently fallible.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::ProbeError;
use crate::signal::{ParameterSet, SignalValue};

/// One named, asynchronous, independently-fallible environment reading.
#[async_trait]
pub trait SignalProbe: Send + Sync {
    /// Attribute name this probe fills in the aggregate result.
    fn name(&self) -> &str;

    /// Read the signal. May suspend, fail, or report an unsupported
    /// capability; the aggregator isolates whatever happens here.
    async fn read(&self) -> Result<SignalValue, ProbeError>;
}

/// Probe backed by a closure, for wiring host-specific readers without
/// a dedicated type.
pub struct FnProbe<F> {
    name: String,
    read: F,
}

impl<F> FnProbe<F>
where
    F: Fn() -> BoxFuture<'static, Result<SignalValue, ProbeError>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, read: F) -> Self {
        Self {
            name: name.into(),
            read,
        }
    }
}

#[async_trait]
impl<F> SignalProbe for FnProbe<F>
where
    F: Fn() -> BoxFuture<'static, Result<SignalValue, ProbeError>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<SignalValue, ProbeError> {
        (self.read)().await
    }
}

/// Boxed closure probe, the common currency of the aggregator registry.
pub fn probe_fn<F>(name: impl Into<String>, read: F) -> Box<dyn SignalProbe>
where
    F: Fn() -> BoxFuture<'static, Result<SignalValue, ProbeError>> + Send + Sync + 'static,
{
    Box::new(FnProbe::new(name, read))
}

/// Version of the capability-flag enumeration below. Bump when the list
/// changes so stored fingerprints remain comparable within a version.
pub const CAPABILITY_FLAGS_VERSION: u32 = 1;

/// Explicit enumeration of the host capabilities that feed the
/// capability signal. An explicit versioned list keeps the signal
/// portable; walking an object graph to count properties does not.
pub const CAPABILITY_FLAGS_V1: &[&str] = &[
    "audio-render",
    "canvas-2d",
    "codec-probe",
    "gamepad",
    "geolocation",
    "indexed-store",
    "media-devices",
    "notifications",
    "offscreen-canvas",
    "permissions-query",
    "pointer-events",
    "touch-input",
    "webgl",
    "worker-threads",
];

/// Build the capability signal from a host-supplied support predicate.
///
/// Emits both the per-flag map and the total count, so the signal stays
/// comparable if the flag list is revised under a new version.
pub fn capability_signal(supported: impl Fn(&str) -> bool) -> SignalValue {
    let mut flags = std::collections::BTreeMap::new();
    let mut count = 0u32;
    for &flag in CAPABILITY_FLAGS_V1 {
        let present = supported(flag);
        if present {
            count += 1;
        }
        flags.insert(flag.to_string(), SignalValue::Bool(present));
    }
    SignalValue::map([
        ("version", SignalValue::from(CAPABILITY_FLAGS_VERSION)),
        ("count", SignalValue::from(count)),
        ("flags", SignalValue::Map(flags)),
    ])
}

/// Normalize a screen resolution pair for fingerprinting.
///
/// The two components are always reported in descending order
/// (landscape-major), regardless of the device's current orientation.
/// This deliberately discards orientation: a device rotated between
/// sessions keeps the same fingerprint. Invariant, not an accident —
/// do not "fix" this to preserve width/height order.
pub fn normalized_resolution(width: f64, height: f64) -> SignalValue {
    let (major, minor) = if width >= height {
        (width, height)
    } else {
        (height, width)
    };
    SignalValue::List(vec![SignalValue::Number(major), SignalValue::Number(minor)])
}

/// Fixed marker set used when no host environment is attached.
///
/// Keeps `create_fingerprint_hash` total: a headless or non-browser-like
/// host still produces a well-formed (if low-entropy) parameter set.
pub fn non_host_markers() -> ParameterSet {
    let mut params = ParameterSet::new();
    params.insert("environment".to_string(), SignalValue::from("non-host"));
    params.insert("platform".to_string(), SignalValue::from("unknown"));
    params.insert(
        "capabilities".to_string(),
        capability_signal(|_| false),
    );
    params
}
