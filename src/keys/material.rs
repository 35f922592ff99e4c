//! ECDH P-256 key material
//!
//! Private keys are exported as PKCS#8 DER, public keys as SPKI DER,
//! both base64-encoded. The public key is never persisted standalone:
//! it is always re-derivable from the private key, and
//! `derive_public_from_private` is the only sanctioned way to do so.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use p256::SecretKey;
use rand::rngs::OsRng;
use zeroize::{Zeroize, Zeroizing};

use crate::error::KeyError;

/// A freshly generated or reimported key pair, encoded for persistence.
///
/// Invariant: `derive_public_from_private(&m.private_key)` returns
/// `Some(m.public_key)` for every value this module produces. The
/// private field is wiped on drop.
#[derive(Clone)]
pub struct KeyMaterial {
    /// Base64 of the PKCS#8 DER private key. The durable identity anchor.
    pub private_key: String,
    /// Base64 of the SPKI DER public key. The "crypto cookie" sent to
    /// the backend.
    pub public_key: String,
}

impl KeyMaterial {
    /// Generate a fresh ECDH P-256 pair.
    pub fn generate() -> Result<Self, KeyError> {
        let secret = SecretKey::random(&mut OsRng);

        let private_der = secret
            .to_pkcs8_der()
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let private_key = BASE64.encode(private_der.as_bytes());

        let public_der = secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let public_key = BASE64.encode(public_der.as_bytes());

        Ok(Self {
            private_key,
            public_key,
        })
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &"[redacted]")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Re-derive the public key from an encoded private key.
///
/// Reimports the PKCS#8 document, discards the private scalar's
/// serialized form, and exports the SPKI public half. Returns `None` on
/// any malformed input; never panics and never errors out to the
/// caller — a bad cached key simply triggers regeneration upstream.
pub fn derive_public_from_private(private_key: &str) -> Option<String> {
    let der = Zeroizing::new(BASE64.decode(private_key).ok()?);
    let secret = SecretKey::from_pkcs8_der(&der).ok()?;
    let public_der = secret.public_key().to_public_key_der().ok()?;
    Some(BASE64.encode(public_der.as_bytes()))
}
