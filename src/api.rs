//! Backend collaborator seams
//!
//! The network client and the payload encryptor are external
//! collaborators: this module fixes only the request/response shapes
//! the identity façade exchanges with them. Transport failures are the
//! façade's to catch; nothing here assumes they were handled upstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Registration payload for a device the backend has not seen before.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeviceRequest {
    /// The resolved signal values, as collected.
    pub device_params: serde_json::Value,
    /// The device fingerprint hash.
    pub device_hash: String,
    /// The device's public key.
    pub cryptocookie: String,
}

/// Backend acknowledgement of a device registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub data: serde_json::Value,
}

/// Output of the payload encryptor: ciphertext plus the ephemeral
/// material the backend needs to decrypt it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub ciphertext: String,
    pub ephemeral_public_key: String,
    pub iv: String,
    pub salt: String,
}

/// What the backend knows about a device hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownDeviceData {
    /// Whether the device is already known.
    pub result: bool,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Backend API client seam. All calls are plain request/response.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn add_new_device(&self, request: NewDeviceRequest) -> Result<DeviceResponse, ApiError>;

    async fn create_event(
        &self,
        envelope: EncryptedEnvelope,
    ) -> Result<serde_json::Value, ApiError>;

    async fn get_known_device_data(
        &self,
        device_hash: &str,
        cryptocookie: &str,
    ) -> Result<KnownDeviceData, ApiError>;
}

/// Payload encryptor seam: turns an event description into an encrypted
/// envelope bound to this device's hash and cookie.
pub trait PayloadEncryptor: Send + Sync {
    fn encrypt(
        &self,
        event_description: &str,
        device_hash: &str,
        cookie: &str,
    ) -> Result<EncryptedEnvelope, ApiError>;
}
