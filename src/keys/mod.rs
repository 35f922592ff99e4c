//! Persistent key identity ("crypto cookie")
//!
//! The durable anchor of a device identity is an ECDH P-256 key pair:
//! the private key is persisted across sessions, the public key is what
//! the backend sees. Persistence spans two storage tiers with graceful
//! degradation when one (or both) is unavailable.

pub mod manager;
pub mod material;
pub mod store;

pub use manager::KeyIdentityManager;
pub use material::{derive_public_from_private, KeyMaterial};
pub use store::{
    FilePrimaryStore, FileSecondaryStore, MemoryPrimaryStore, MemorySecondaryStore,
    PrimaryKeyStore, SecondaryKeyStore, StoreLifecycle, StoredIdentity, IDENTITY_KEY_ID,
};
