//! Audio rendering signal
//!
//! Extracts a single numeric signal from an offline audio rendering
//! pipeline. Some engines begin in, or fall into, a suspended state and
//! never complete on their own; this module's retry/timeout machine
//! guarantees a terminal outcome within a bounded time, so signal
//! collection can never hang on the audio path.
//!
//! Terminal outcomes other than an engine error are non-fatal: they map
//! to fixed sentinel values that feed the fingerprint like any other
//! signal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AudioError, ProbeError};
use crate::signal::{SignalProbe, SignalValue};

/// Engine is known to always suspend rendering; the machine is skipped.
pub const KNOWN_TO_SUSPEND_SIGNAL: f64 = -1.0;
/// Host exposes no offline rendering engine.
pub const NOT_SUPPORTED_SIGNAL: f64 = -2.0;
/// The retry/deadline budget ran out before a buffer was produced.
pub const TIMED_OUT_SIGNAL: f64 = -3.0;
/// Value the aggregation boundary falls back to on a caught engine error.
pub const FALLBACK_SIGNAL: f64 = 0.0;

/// Resume attempts granted to a suspended engine before giving up.
pub const MAX_RESUME_ATTEMPTS: u32 = 3;
/// Delay before each re-request after an observed suspension.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);
/// Grace window after the engine is first observed running.
pub const RUNNING_GRACE: Duration = Duration::from_millis(500);
/// Hard wall-clock ceiling on the whole procedure.
pub const ABSOLUTE_DEADLINE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Rendered-sample index window reduced into the scalar signal.
pub const SAMPLE_WINDOW_START: usize = 4500;
pub const SAMPLE_WINDOW_END: usize = 5000;

/// Engine state as reported by a state query (not an event — suspension
/// in particular is only ever observed by polling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Suspended,
    Running,
    Closed,
}

/// Offline rendering engine seam.
///
/// The real implementation wraps the host's audio pipeline; tests use
/// simulated engines with injected state sequences.
#[async_trait]
pub trait RenderingEngine: Send + Sync {
    /// Whether the host exposes offline rendering at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Whether capability fingerprinting marks this engine as reliably
    /// suspending. Such engines skip the machine entirely rather than
    /// wasting the retry budget on a hopeless case.
    fn suspends_reliably(&self) -> bool {
        false
    }

    /// Request (or re-request) rendering. A synchronous refusal is the
    /// one hard error in this module.
    async fn request_render(&self) -> Result<(), AudioError>;

    /// Current engine state.
    fn state(&self) -> EngineState;

    /// The rendered sample buffer, once rendering has completed.
    fn rendered_buffer(&self) -> Option<Vec<f32>>;
}

/// Terminal outcome of one measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioOutcome {
    /// Rendering completed; carries the reduced scalar.
    Completed(f64),
    KnownToSuspend,
    NotSupported,
    TimedOut,
}

impl AudioOutcome {
    /// Numeric encoding fed into the fingerprint.
    pub fn signal(&self) -> f64 {
        match self {
            AudioOutcome::Completed(value) => *value,
            AudioOutcome::KnownToSuspend => KNOWN_TO_SUSPEND_SIGNAL,
            AudioOutcome::NotSupported => NOT_SUPPORTED_SIGNAL,
            AudioOutcome::TimedOut => TIMED_OUT_SIGNAL,
        }
    }
}

/// Reduce a rendered buffer to the scalar signal: the sum of absolute
/// sample magnitudes over the fixed index window.
pub fn reduce_buffer(samples: &[f32]) -> f64 {
    let end = SAMPLE_WINDOW_END.min(samples.len());
    let start = SAMPLE_WINDOW_START.min(end);
    samples[start..end].iter().map(|s| s.abs() as f64).sum()
}

/// Drive the engine to a terminal outcome.
///
/// Rendering → Completed when a buffer appears. An observed suspension
/// while the document is visible costs one resume attempt and a
/// [`RETRY_DELAY`] wait; exhausting [`MAX_RESUME_ATTEMPTS`] is a
/// timeout. Independently, a race of two deadlines bounds the run:
/// [`RUNNING_GRACE`] after the engine is first observed running, and
/// [`ABSOLUTE_DEADLINE`] from the start — whichever fires first wins.
/// Only a synchronous engine refusal propagates as an error.
pub async fn measure(
    engine: &dyn RenderingEngine,
    document_hidden: impl Fn() -> bool,
) -> Result<AudioOutcome, AudioError> {
    if !engine.is_supported() {
        return Ok(AudioOutcome::NotSupported);
    }
    if engine.suspends_reliably() {
        return Ok(AudioOutcome::KnownToSuspend);
    }

    let started = Instant::now();
    let mut running_since: Option<Instant> = None;
    let mut resume_attempts = 0u32;

    engine.request_render().await?;

    loop {
        if let Some(buffer) = engine.rendered_buffer() {
            return Ok(AudioOutcome::Completed(reduce_buffer(&buffer)));
        }

        match engine.state() {
            EngineState::Suspended => {
                // A hidden document legitimately suspends rendering;
                // only burn the retry budget while visible.
                if !document_hidden() {
                    resume_attempts += 1;
                    if resume_attempts > MAX_RESUME_ATTEMPTS {
                        return Ok(AudioOutcome::TimedOut);
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                    engine.request_render().await?;
                    continue;
                }
            }
            EngineState::Running => {
                running_since.get_or_insert_with(Instant::now);
            }
            EngineState::Closed => {}
        }

        if let Some(since) = running_since {
            if since.elapsed() >= RUNNING_GRACE {
                return Ok(AudioOutcome::TimedOut);
            }
        }
        if started.elapsed() >= ABSOLUTE_DEADLINE {
            return Ok(AudioOutcome::TimedOut);
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Probe adapter: feeds the audio signal into the aggregator.
///
/// Any caught engine error degrades to [`FALLBACK_SIGNAL`]; the probe
/// itself only reports `Unsupported` when the host has no engine wired
/// at all (the aggregator then records the slot as unavailable).
pub struct AudioProbe {
    engine: Arc<dyn RenderingEngine>,
    document_hidden: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl AudioProbe {
    pub fn new(engine: Arc<dyn RenderingEngine>) -> Self {
        Self {
            engine,
            document_hidden: Arc::new(|| false),
        }
    }

    /// Attach a host visibility query; a hidden document pauses the
    /// resume budget rather than consuming it.
    pub fn with_visibility(
        engine: Arc<dyn RenderingEngine>,
        document_hidden: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Self {
        Self {
            engine,
            document_hidden,
        }
    }
}

#[async_trait]
impl SignalProbe for AudioProbe {
    fn name(&self) -> &str {
        "audio"
    }

    async fn read(&self) -> Result<SignalValue, ProbeError> {
        let hidden = self.document_hidden.clone();
        match measure(self.engine.as_ref(), move || hidden()).await {
            Ok(outcome) => Ok(SignalValue::Number(outcome.signal())),
            Err(e) => {
                log::warn!("audio rendering failed: {}", e);
                Ok(SignalValue::Number(FALLBACK_SIGNAL))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Engine that renders a fixed buffer after one state poll.
    struct CompletingEngine {
        buffer: Mutex<Option<Vec<f32>>>,
        requested: AtomicU32,
    }

    impl CompletingEngine {
        fn new() -> Self {
            let mut samples = vec![0.0f32; 5000];
            for (i, sample) in samples.iter_mut().enumerate() {
                *sample = if i % 2 == 0 { 0.25 } else { -0.25 };
            }
            Self {
                buffer: Mutex::new(Some(samples)),
                requested: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RenderingEngine for CompletingEngine {
        async fn request_render(&self) -> Result<(), AudioError> {
            self.requested.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn state(&self) -> EngineState {
            EngineState::Running
        }

        fn rendered_buffer(&self) -> Option<Vec<f32>> {
            self.buffer.lock().unwrap().clone()
        }
    }

    /// Engine that reports "suspended" forever, no matter how often
    /// rendering is re-requested.
    struct AlwaysSuspendedEngine {
        requests: AtomicU32,
    }

    #[async_trait]
    impl RenderingEngine for AlwaysSuspendedEngine {
        async fn request_render(&self) -> Result<(), AudioError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn state(&self) -> EngineState {
            EngineState::Suspended
        }

        fn rendered_buffer(&self) -> Option<Vec<f32>> {
            None
        }
    }

    /// Engine that runs forever without producing a buffer.
    struct StallingEngine;

    #[async_trait]
    impl RenderingEngine for StallingEngine {
        async fn request_render(&self) -> Result<(), AudioError> {
            Ok(())
        }

        fn state(&self) -> EngineState {
            EngineState::Running
        }

        fn rendered_buffer(&self) -> Option<Vec<f32>> {
            None
        }
    }

    struct UnsupportedEngine;

    #[async_trait]
    impl RenderingEngine for UnsupportedEngine {
        fn is_supported(&self) -> bool {
            false
        }

        async fn request_render(&self) -> Result<(), AudioError> {
            Err(AudioError::Unsupported("no engine".into()))
        }

        fn state(&self) -> EngineState {
            EngineState::Closed
        }

        fn rendered_buffer(&self) -> Option<Vec<f32>> {
            None
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl RenderingEngine for FailingEngine {
        async fn request_render(&self) -> Result<(), AudioError> {
            Err(AudioError::RenderFailed("engine exploded".into()))
        }

        fn state(&self) -> EngineState {
            EngineState::Suspended
        }

        fn rendered_buffer(&self) -> Option<Vec<f32>> {
            None
        }
    }

    #[tokio::test]
    async fn test_completed_rendering_reduces_the_window() {
        let engine = CompletingEngine::new();
        let outcome = measure(&engine, || false).await.unwrap();
        // 500 samples of magnitude 0.25 in the window
        assert_eq!(outcome, AudioOutcome::Completed(125.0));
        assert_eq!(outcome.signal(), 125.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_suspended_times_out_within_budget() {
        let engine = AlwaysSuspendedEngine {
            requests: AtomicU32::new(0),
        };
        let before = Instant::now();
        let outcome = measure(&engine, || false).await.unwrap();
        let elapsed = before.elapsed();

        assert_eq!(outcome, AudioOutcome::TimedOut);
        // Initial request plus one per granted resume attempt
        assert_eq!(engine.requests.load(Ordering::SeqCst), 1 + MAX_RESUME_ATTEMPTS);
        let budget = RETRY_DELAY * MAX_RESUME_ATTEMPTS + Duration::from_millis(100);
        assert!(elapsed <= budget, "took {:?}, budget {:?}", elapsed, budget);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_document_does_not_burn_retries() {
        let engine = AlwaysSuspendedEngine {
            requests: AtomicU32::new(0),
        };
        let outcome = measure(&engine, || true).await.unwrap();

        // With the document hidden the machine waits out the absolute
        // deadline instead of retrying.
        assert_eq!(outcome, AudioOutcome::TimedOut);
        assert_eq!(engine.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_running_engine_hits_the_grace_window() {
        let before = Instant::now();
        let outcome = measure(&StallingEngine, || false).await.unwrap();
        let elapsed = before.elapsed();

        assert_eq!(outcome, AudioOutcome::TimedOut);
        assert!(elapsed < ABSOLUTE_DEADLINE);
        assert!(elapsed >= RUNNING_GRACE);
    }

    #[tokio::test]
    async fn test_unsupported_engine_short_circuits() {
        let outcome = measure(&UnsupportedEngine, || false).await.unwrap();
        assert_eq!(outcome, AudioOutcome::NotSupported);
        assert_eq!(outcome.signal(), NOT_SUPPORTED_SIGNAL);
    }

    #[tokio::test]
    async fn test_reliably_suspending_engine_skips_the_machine() {
        struct Hopeless;

        #[async_trait]
        impl RenderingEngine for Hopeless {
            fn suspends_reliably(&self) -> bool {
                true
            }

            async fn request_render(&self) -> Result<(), AudioError> {
                panic!("must not be called for a reliably-suspending engine");
            }

            fn state(&self) -> EngineState {
                EngineState::Suspended
            }

            fn rendered_buffer(&self) -> Option<Vec<f32>> {
                None
            }
        }

        let outcome = measure(&Hopeless, || false).await.unwrap();
        assert_eq!(outcome, AudioOutcome::KnownToSuspend);
        assert_eq!(outcome.signal(), KNOWN_TO_SUSPEND_SIGNAL);
    }

    #[tokio::test]
    async fn test_engine_error_propagates_from_measure() {
        let result = measure(&FailingEngine, || false).await;
        assert!(matches!(result, Err(AudioError::RenderFailed(_))));
    }

    #[tokio::test]
    async fn test_probe_maps_engine_error_to_fallback() {
        let probe = AudioProbe::new(Arc::new(FailingEngine));
        let value = probe.read().await.unwrap();
        assert_eq!(value, SignalValue::Number(FALLBACK_SIGNAL));
    }

    #[test]
    fn test_reduce_buffer_handles_short_buffers() {
        assert_eq!(reduce_buffer(&[]), 0.0);
        assert_eq!(reduce_buffer(&[1.0; 100]), 0.0);
        // Exactly reaching into the window
        let mut samples = vec![0.0f32; 4501];
        samples[4500] = -2.0;
        assert_eq!(reduce_buffer(&samples), 2.0);
    }
}
