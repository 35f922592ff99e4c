//! End-to-end identity lifecycle
//!
//! Drives the full surface the way an embedding host would: file-backed
//! key stores, a probe set, an audio engine, and a recording backend
//! client, across two sessions over the same storage.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::FutureExt;

use imprint::signal::probes::{capability_signal, normalized_resolution, probe_fn};
use imprint::{
    ApiClient, ApiError, AudioError, DeviceImprint, DeviceResponse, EncryptedEnvelope,
    EngineState, FilePrimaryStore, FileSecondaryStore, KnownDeviceData, NewDeviceRequest,
    RenderingEngine, SignalOutcome, SignalProbe, SignalValue,
};

struct OfflineEngine;

#[async_trait]
impl RenderingEngine for OfflineEngine {
    async fn request_render(&self) -> Result<(), AudioError> {
        Ok(())
    }

    fn state(&self) -> EngineState {
        EngineState::Running
    }

    fn rendered_buffer(&self) -> Option<Vec<f32>> {
        let mut samples = vec![0.0f32; 5000];
        for (i, sample) in samples.iter_mut().enumerate() {
            *sample = ((i % 7) as f32 - 3.0) * 0.01;
        }
        Some(samples)
    }
}

#[derive(Default)]
struct RecordingBackend {
    lookups: AtomicUsize,
    registrations: Mutex<Vec<NewDeviceRequest>>,
}

#[async_trait]
impl ApiClient for RecordingBackend {
    async fn add_new_device(&self, request: NewDeviceRequest) -> Result<DeviceResponse, ApiError> {
        self.registrations.lock().unwrap().push(request);
        Ok(DeviceResponse {
            data: serde_json::json!({"ok": true}),
        })
    }

    async fn create_event(
        &self,
        _envelope: EncryptedEnvelope,
    ) -> Result<serde_json::Value, ApiError> {
        Ok(serde_json::Value::Null)
    }

    async fn get_known_device_data(
        &self,
        device_hash: &str,
        _cryptocookie: &str,
    ) -> Result<KnownDeviceData, ApiError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let known = self
            .registrations
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.device_hash == device_hash);
        Ok(KnownDeviceData {
            result: known,
            data: serde_json::Value::Null,
            error: None,
        })
    }
}

fn host_probes() -> Vec<Box<dyn SignalProbe>> {
    vec![
        probe_fn("platform", || async { Ok(SignalValue::from("linux")) }.boxed()),
        probe_fn("screens", || {
            async { Ok(normalized_resolution(1080.0, 1920.0)) }.boxed()
        }),
        probe_fn("capabilities", || {
            async { Ok(capability_signal(|flag| flag == "canvas-2d")) }.boxed()
        }),
        probe_fn("languages", || {
            async {
                Ok(SignalValue::List(vec![
                    SignalValue::from("en-US"),
                    SignalValue::from("en"),
                ]))
            }
            .boxed()
        }),
    ]
}

fn session(dir: &Path, backend: Arc<RecordingBackend>) -> DeviceImprint {
    DeviceImprint::builder()
        .probes(host_probes())
        .audio_engine(Arc::new(OfflineEngine))
        .primary_store(Arc::new(FilePrimaryStore::new(dir.join("primary"))))
        .secondary_store(Arc::new(FileSecondaryStore::new(dir.join("secondary.json"))))
        .api_client(backend)
        .build()
}

#[tokio::test]
async fn test_two_sessions_share_one_identity() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());

    // First session: collects, generates a key, registers the device
    let first = session(dir.path(), backend.clone());
    let snapshot = first.load().await.clone();

    assert!(snapshot.public_key.is_some());
    assert_eq!(snapshot.signals.len(), 5);
    assert!(snapshot
        .signals
        .values()
        .all(|o| matches!(o, SignalOutcome::Available(_))));

    let fingerprint = first.create_fingerprint_hash();
    assert_eq!(fingerprint.len(), 32);
    assert_eq!(backend.registrations.lock().unwrap().len(), 1);

    // Second session over the same stores: same key, same fingerprint,
    // no re-registration
    let second = session(dir.path(), backend.clone());
    let snapshot2 = second.load().await.clone();

    assert_eq!(snapshot2.public_key, snapshot.public_key);
    assert_eq!(second.create_fingerprint_hash(), fingerprint);
    assert_eq!(backend.registrations.lock().unwrap().len(), 1);
    assert_eq!(backend.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lost_primary_recovers_from_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());

    // Seed an identity, then copy its private key into the secondary
    // tier and destroy the primary, simulating an evicted primary store.
    let first = session(dir.path(), backend.clone());
    let original_key = first.load().await.public_key.clone().unwrap();

    let raw = std::fs::read_to_string(dir.path().join("primary/crypto-key.json")).unwrap();
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let private_key = record["privateKey"].as_str().unwrap().to_string();

    let secondary = FileSecondaryStore::new(dir.path().join("secondary.json"));
    {
        use imprint::SecondaryKeyStore;
        secondary.set(imprint::IDENTITY_KEY_ID, &private_key).await.unwrap();
    }
    std::fs::remove_dir_all(dir.path().join("primary")).unwrap();

    let second = session(dir.path(), backend);
    let recovered = second.load().await.public_key.clone().unwrap();
    assert_eq!(recovered, original_key);
}
