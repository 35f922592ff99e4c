use thiserror::Error;

/// A signal probe could not produce a value.
///
/// Probe failures are absorbed at the aggregation boundary: the probe's
/// slot becomes `SignalOutcome::Unavailable` and the error is logged,
/// never surfaced to the caller.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Capability not supported: {0}")]
    Unsupported(String),

    #[error("Probe failed: {0}")]
    Failed(String),
}

/// The audio rendering pipeline failed outright.
///
/// Stalls and suspensions are not errors; they resolve to sentinel
/// outcomes. Only a synchronous refusal from the engine itself lands here.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio rendering not supported: {0}")]
    Unsupported(String),

    #[error("Rendering failed: {0}")]
    RenderFailed(String),
}

/// A key store tier misbehaved.
///
/// `Unavailable` is a normal, expected condition in restricted
/// environments and triggers fallback to the next tier, never a hard
/// failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Key material could not be produced.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Malformed key material: {0}")]
    MalformedKey(String),

    #[error("Key store error: {0}")]
    Store(#[from] StoreError),
}

/// The backend collaborator rejected or failed a request.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// The caller invoked an operation without wiring the collaborator it
/// needs. This is misuse rather than environment variability, so it is
/// the one failure class that propagates as a hard error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No API client configured")]
    MissingApiClient,

    #[error("No payload encryptor configured")]
    MissingEncryptor,
}

/// Errors surfaced by the identity façade's explicit operations.
#[derive(Error, Debug)]
pub enum ImprintError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
