//! Device identity façade
//!
//! Composes signal aggregation, the audio machine, and the key identity
//! manager into the externally consumed surface: `load`,
//! `create_fingerprint_hash`, `synchronize_device`, `send_event`.
//!
//! `load()` resolves to an immutable snapshot of everything the session
//! learned; the façade itself holds only the minimal mutable caches
//! (the computed fingerprint and the two in-flight cells), so nothing
//! here depends on call order.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::api::{ApiClient, KnownDeviceData, NewDeviceRequest, PayloadEncryptor};
use crate::audio::{AudioProbe, RenderingEngine};
use crate::error::{ApiError, ConfigError, ImprintError};
use crate::keys::{KeyIdentityManager, MemoryPrimaryStore, MemorySecondaryStore};
use crate::keys::{PrimaryKeyStore, SecondaryKeyStore};
use crate::signal::aggregate::{params_from_signals, AggregateResult};
use crate::signal::probes::non_host_markers;
use crate::signal::{canonicalize, hash128, ParameterSet, SignalAggregator, SignalProbe};

/// Everything one `load()` resolved: the settled signal aggregate and
/// the identity public key. Immutable once published.
#[derive(Debug, Clone)]
pub struct ImprintSnapshot {
    pub signals: AggregateResult,
    /// The crypto cookie. `None` only when key generation itself failed;
    /// storage trouble alone never empties this.
    pub public_key: Option<String>,
}

/// The device identity façade.
pub struct DeviceImprint {
    aggregator: SignalAggregator,
    keys: KeyIdentityManager,
    api: Option<Arc<dyn ApiClient>>,
    encryptor: Option<Arc<dyn PayloadEncryptor>>,
    snapshot: OnceCell<ImprintSnapshot>,
    fingerprint: OnceCell<String>,
}

impl DeviceImprint {
    pub fn builder() -> ImprintBuilder {
        ImprintBuilder::default()
    }

    /// Collect signals and initialize the key identity, concurrently,
    /// exactly once. Concurrent callers share the same in-flight work.
    ///
    /// When an API client is configured, device synchronization runs as
    /// part of the first load; its errors are logged, never surfaced.
    /// `load` itself never fails — a degraded environment degrades the
    /// snapshot's contents, not its availability.
    pub async fn load(&self) -> &ImprintSnapshot {
        self.snapshot
            .get_or_init(|| async {
                let (signals, key_result) =
                    tokio::join!(self.aggregator.collect(), self.keys.init_identity());

                let public_key = match key_result {
                    Ok(key) => Some(key),
                    Err(e) => {
                        log::warn!("identity key initialization failed: {}", e);
                        None
                    }
                };

                let params = params_from_signals(signals);
                let digest = hash128(&canonicalize(&params));
                let _ = self.fingerprint.set(digest.clone());

                if let Some(api) = &self.api {
                    let result = synchronize(
                        api.as_ref(),
                        &params,
                        &digest,
                        public_key.as_deref().unwrap_or(""),
                    )
                    .await;
                    if let Err(e) = result {
                        log::warn!("device synchronization failed: {}", e);
                    }
                }

                ImprintSnapshot {
                    signals: signals.clone(),
                    public_key,
                }
            })
            .await
    }

    /// The parameter set a fingerprint would be computed from right now:
    /// the loaded signals, or the fixed non-host marker set before any
    /// environment has been attached and loaded.
    pub fn fingerprint_params(&self) -> ParameterSet {
        match self.snapshot.get() {
            Some(snapshot) => params_from_signals(&snapshot.signals),
            None => non_host_markers(),
        }
    }

    /// Compute (or return the cached) fingerprint hash.
    ///
    /// Once computed from a loaded snapshot the value is cached for the
    /// lifetime of this instance and never recomputed. A hash computed
    /// from the marker fallback is a placeholder and is deliberately
    /// not cached, so a later load still yields the real fingerprint.
    pub fn create_fingerprint_hash(&self) -> String {
        if let Some(cached) = self.fingerprint.get() {
            return cached.clone();
        }

        let loaded = self.snapshot.get().is_some();
        let digest = hash128(&canonicalize(&self.fingerprint_params()));
        if loaded {
            let _ = self.fingerprint.set(digest.clone());
        }
        digest
    }

    /// The fingerprint, if one has been computed and cached.
    pub fn cached_fingerprint(&self) -> Option<&String> {
        self.fingerprint.get()
    }

    /// Explicitly synchronize this device with the backend: query what
    /// it knows about the fingerprint, registering the device first if
    /// it is unknown.
    ///
    /// Invoking this without a configured API client is misuse and
    /// fails hard; transport trouble surfaces as an `Api` error.
    pub async fn synchronize_device(&self) -> Result<KnownDeviceData, ImprintError> {
        let api = self
            .api
            .clone()
            .ok_or(ConfigError::MissingApiClient)?;

        let snapshot = self.load().await;
        let cookie = snapshot.public_key.clone().unwrap_or_default();
        let device_hash = self.create_fingerprint_hash();

        let known = api.get_known_device_data(&device_hash, &cookie).await?;
        if known.result {
            return Ok(known);
        }

        let params = params_from_signals(&snapshot.signals);
        api.add_new_device(NewDeviceRequest {
            device_params: serde_json::to_value(&params).unwrap_or(serde_json::Value::Null),
            device_hash: device_hash.clone(),
            cryptocookie: cookie.clone(),
        })
        .await?;

        Ok(api.get_known_device_data(&device_hash, &cookie).await?)
    }

    /// Encrypt an event description and post it to the backend.
    ///
    /// Requires both the API client and the payload encryptor; missing
    /// either is a configuration error.
    pub async fn send_event(&self, description: &str) -> Result<serde_json::Value, ImprintError> {
        let api = self
            .api
            .clone()
            .ok_or(ConfigError::MissingApiClient)?;
        let encryptor = self
            .encryptor
            .clone()
            .ok_or(ConfigError::MissingEncryptor)?;

        let snapshot = self.load().await;
        let cookie = snapshot.public_key.clone().unwrap_or_default();
        let device_hash = self.create_fingerprint_hash();

        let envelope = encryptor.encrypt(description, &device_hash, &cookie)?;
        Ok(api.create_event(envelope).await?)
    }
}

/// Best-effort sync used by `load`: register the device when the
/// backend does not know it yet.
async fn synchronize(
    api: &dyn ApiClient,
    params: &ParameterSet,
    device_hash: &str,
    cookie: &str,
) -> Result<(), ApiError> {
    let known = api.get_known_device_data(device_hash, cookie).await?;
    if !known.result {
        api.add_new_device(NewDeviceRequest {
            device_params: serde_json::to_value(params).unwrap_or(serde_json::Value::Null),
            device_hash: device_hash.to_string(),
            cryptocookie: cookie.to_string(),
        })
        .await?;
    }
    Ok(())
}

/// Assembles a [`DeviceImprint`] from its collaborators. Stores default
/// to the in-memory tier when none are wired.
#[derive(Default)]
pub struct ImprintBuilder {
    probes: Vec<Box<dyn SignalProbe>>,
    audio_engine: Option<Arc<dyn RenderingEngine>>,
    document_hidden: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    primary: Option<Arc<dyn PrimaryKeyStore>>,
    secondary: Option<Arc<dyn SecondaryKeyStore>>,
    api: Option<Arc<dyn ApiClient>>,
    encryptor: Option<Arc<dyn PayloadEncryptor>>,
}

impl ImprintBuilder {
    pub fn probe(mut self, probe: Box<dyn SignalProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn probes(mut self, probes: impl IntoIterator<Item = Box<dyn SignalProbe>>) -> Self {
        self.probes.extend(probes);
        self
    }

    /// Wire the host's offline audio engine; its signal joins the
    /// aggregate under the name `audio`.
    pub fn audio_engine(mut self, engine: Arc<dyn RenderingEngine>) -> Self {
        self.audio_engine = Some(engine);
        self
    }

    /// Host visibility query consulted by the audio retry policy.
    pub fn visibility(mut self, document_hidden: Arc<dyn Fn() -> bool + Send + Sync>) -> Self {
        self.document_hidden = Some(document_hidden);
        self
    }

    pub fn primary_store(mut self, store: Arc<dyn PrimaryKeyStore>) -> Self {
        self.primary = Some(store);
        self
    }

    pub fn secondary_store(mut self, store: Arc<dyn SecondaryKeyStore>) -> Self {
        self.secondary = Some(store);
        self
    }

    pub fn api_client(mut self, api: Arc<dyn ApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn encryptor(mut self, encryptor: Arc<dyn PayloadEncryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn build(self) -> DeviceImprint {
        let mut probes = self.probes;
        if let Some(engine) = self.audio_engine {
            let probe = match self.document_hidden {
                Some(hidden) => AudioProbe::with_visibility(engine, hidden),
                None => AudioProbe::new(engine),
            };
            probes.push(Box::new(probe));
        }

        let primary = self
            .primary
            .unwrap_or_else(|| Arc::new(MemoryPrimaryStore::new()));
        let secondary = self
            .secondary
            .unwrap_or_else(|| Arc::new(MemorySecondaryStore::new()));

        DeviceImprint {
            aggregator: SignalAggregator::new(probes),
            keys: KeyIdentityManager::new(primary, secondary),
            api: self.api,
            encryptor: self.encryptor,
            snapshot: OnceCell::new(),
            fingerprint: OnceCell::new(),
        }
    }
}
