// Imprint - Device identity and crypto cookie for session authentication

pub mod api;
pub mod audio;
pub mod error;
pub mod identity;
pub mod keys;
pub mod signal;

pub use api::{
    ApiClient, DeviceResponse, EncryptedEnvelope, KnownDeviceData, NewDeviceRequest,
    PayloadEncryptor,
};
pub use audio::{AudioOutcome, AudioProbe, EngineState, RenderingEngine};
pub use error::{
    ApiError, AudioError, ConfigError, ImprintError, KeyError, ProbeError, StoreError,
};
pub use identity::{DeviceImprint, ImprintBuilder, ImprintSnapshot};
pub use keys::{
    derive_public_from_private, FilePrimaryStore, FileSecondaryStore, KeyIdentityManager,
    KeyMaterial, MemoryPrimaryStore, MemorySecondaryStore, PrimaryKeyStore, SecondaryKeyStore,
    StoreLifecycle, StoredIdentity, IDENTITY_KEY_ID,
};
pub use signal::{
    canonicalize, hash128, AggregateResult, ParameterSet, SignalAggregator, SignalOutcome,
    SignalProbe, SignalValue,
};
