//! Key identity lifecycle orchestration
//!
//! Looks up a persisted private key across both tiers, re-derives its
//! public half, and only generates a fresh pair when nothing usable is
//! cached. The clear-then-write discipline is the one cross-tier
//! invariant: both tiers are wiped before a new key is ever written, so
//! a stale key and a fresh one never coexist.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::KeyError;
use crate::keys::material::{derive_public_from_private, KeyMaterial};
use crate::keys::store::{PrimaryKeyStore, SecondaryKeyStore, StoredIdentity, IDENTITY_KEY_ID};

/// Orchestrates generation, persistence, and recovery of the identity
/// key pair.
///
/// `init_identity` is single-flight memoized: concurrent callers share
/// one execution and one resulting public key, so duplicate generation
/// races cannot occur.
pub struct KeyIdentityManager {
    primary: Arc<dyn PrimaryKeyStore>,
    secondary: Arc<dyn SecondaryKeyStore>,
    public_key: OnceCell<String>,
}

impl KeyIdentityManager {
    pub fn new(primary: Arc<dyn PrimaryKeyStore>, secondary: Arc<dyn SecondaryKeyStore>) -> Self {
        Self {
            primary,
            secondary,
            public_key: OnceCell::new(),
        }
    }

    /// Initialize (or recover) the identity and return the public key.
    ///
    /// A cached private key found in either tier is reused — persistence
    /// across sessions is the point. Regeneration happens only when no
    /// tier holds a usable key, and is always preceded by clearing both
    /// tiers. Storage unavailability degrades the operation (the key may
    /// persist in one tier, or not at all) but never fails it; the only
    /// hard failure is key generation itself.
    pub async fn init_identity(&self) -> Result<String, KeyError> {
        self.public_key
            .get_or_try_init(|| self.init_identity_inner())
            .await
            .map(|key| key.clone())
    }

    async fn init_identity_inner(&self) -> Result<String, KeyError> {
        if let Some(cached) = self.lookup_cached_private_key().await {
            match derive_public_from_private(&cached) {
                Some(public_key) => return Ok(public_key),
                None => log::warn!("cached identity key is malformed, regenerating"),
            }
        }

        self.clear_identity().await;

        let material = KeyMaterial::generate()?;
        let record = StoredIdentity {
            id: IDENTITY_KEY_ID.to_string(),
            private_key: material.private_key.clone(),
        };

        match self.primary.put_record(record).await {
            Ok(()) => {}
            Err(e) => {
                log::warn!("primary key store unavailable ({}), using secondary tier", e);
                if let Err(e) = self.secondary.set(IDENTITY_KEY_ID, &material.private_key).await {
                    log::warn!(
                        "secondary key store unavailable ({}), identity will not persist",
                        e
                    );
                }
            }
        }

        Ok(material.public_key.clone())
    }

    async fn lookup_cached_private_key(&self) -> Option<String> {
        match self.primary.get_record(IDENTITY_KEY_ID).await {
            Ok(Some(record)) => return Some(record.private_key),
            Ok(None) => {}
            Err(e) => log::debug!("primary key store lookup failed: {}", e),
        }

        match self.secondary.get(IDENTITY_KEY_ID).await {
            Ok(value) => value,
            Err(e) => {
                log::debug!("secondary key store lookup failed: {}", e);
                None
            }
        }
    }

    /// Best-effort clear of both tiers: the secondary wholesale, the
    /// primary only for the identity record. Failures are logged, never
    /// propagated — a clear is a precursor to regeneration, not a
    /// guaranteed operation of its own.
    pub async fn clear_identity(&self) {
        if let Err(e) = self.secondary.clear_all().await {
            log::warn!("failed to clear secondary key store: {}", e);
        }
        if let Err(e) = self.primary.delete_record(IDENTITY_KEY_ID).await {
            log::warn!("failed to clear identity record from primary store: {}", e);
        }
    }
}
