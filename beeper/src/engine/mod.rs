//! Tone streaming engine
//!
//! Keeps a speaker tone audible by rotating a small pool of backend buffers:
//! - the caller polls once per emulated frame with the frequency it wants
//! - a changed frequency stops the source, drains it and restarts with a fresh chunk
//! - an unchanged frequency refills one buffer only after the backend reports a
//!   buffer as processed, restarting playback if the source ran dry
//! - frequency 0 stops and drains; silence is an empty queue
//!
//! At most one chunk is synthesized and enqueued per poll. Nothing here blocks
//! or spawns threads; the engine is driven entirely by its single caller.

mod state;


use tracing::{debug, trace, warn};

pub use state::{LifecycleState, ToneState, Transition};

use crate::backend::{
    AudioBackend, BackendError, BufferHandle, ContextHandle, DeviceHandle, LISTENER_PARAMS,
    PcmFormat, SOURCE_PARAMS, SourceHandle,
};
use crate::config::ToneConfig;
use crate::synth::{self, CHUNK_SAMPLES, SAMPLE_RATE, Waveform};

/// Buffer pool size of the reference design
pub const DEFAULT_BUFFER_COUNT: usize = 2;

/// Frequency of the diagnostic burst fired by [`ToneEngine::test`]
pub const DIAGNOSTIC_FREQUENCY: u32 = 1000;

/// Init step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    OpenDevice,
    CreateContext,
    ActivateContext,
    AllocateBuffers,
    AllocateSource,
}

impl std::fmt::Display for InitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InitStep::OpenDevice => "open device",
            InitStep::CreateContext => "create context",
            InitStep::ActivateContext => "activate context",
            InitStep::AllocateBuffers => "allocate buffers",
            InitStep::AllocateSource => "allocate source",
        };
        f.write_str(name)
    }
}

/// Backend resource acquisition failed; everything acquired so far was released
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("audio init failed at '{step}': {source}")]
pub struct InitError {
    pub step: InitStep,
    #[source]
    pub source: BackendError,
}

fn init_error(step: InitStep) -> impl FnOnce(BackendError) -> InitError {
    move |source| InitError { step, source }
}

/// Counters for work the engine has issued since construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Chunks synthesized
    pub chunks_synthesized: u64,
    /// Buffers enqueued on the source
    pub buffers_enqueued: u64,
    /// Frequency changes to a new non-zero tone
    pub tone_changes: u64,
    /// Stop requests (frequency 0)
    pub stops: u64,
    /// Play reissued after the source ran dry while sustaining
    pub underrun_recoveries: u64,
}

/// Backend resources, each tracked independently so teardown releases only
/// what was actually acquired
#[derive(Debug, Default)]
struct Resources {
    device: Option<DeviceHandle>,
    context: Option<ContextHandle>,
    context_current: bool,
    buffers: Vec<BufferHandle>,
    source: Option<SourceHandle>,
}

impl Resources {
    fn is_empty(&self) -> bool {
        self.device.is_none()
            && self.context.is_none()
            && !self.context_current
            && self.buffers.is_empty()
            && self.source.is_none()
    }
}

/// Single-channel tone generator driving an [`AudioBackend`]
///
/// Dropping the engine shuts it down.
pub struct ToneEngine<B: AudioBackend> {
    backend: B,
    lifecycle: LifecycleState,
    /// Stored across init/shutdown cycles; applied to the listener while Ready
    master_gain: f32,
    waveform: Waveform,
    buffer_count: usize,
    tone: ToneState,
    resources: Resources,
    /// Slot that was filled most recently
    active_buffer: usize,
    /// Reused synthesis buffer
    scratch: Vec<u8>,
    stats: EngineStats,
}

impl<B: AudioBackend> ToneEngine<B> {
    /// Create an engine with default settings (sine, gain 1.0, two buffers)
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, &ToneConfig::default())
    }

    /// Create an engine from a configuration
    pub fn with_config(backend: B, config: &ToneConfig) -> Self {
        debug_assert!(config.buffer_count >= 1, "buffer pool must not be empty");
        debug_assert!(
            config.master_gain >= 0.0,
            "master gain must be non-negative, got {}",
            config.master_gain
        );
        Self {
            backend,
            lifecycle: LifecycleState::Uninitialized,
            master_gain: config.master_gain,
            waveform: config.waveform,
            buffer_count: config.buffer_count.max(1),
            tone: ToneState::Stopped,
            resources: Resources::default(),
            active_buffer: 0,
            scratch: Vec::with_capacity(CHUNK_SAMPLES),
            stats: EngineStats::default(),
        }
    }

    /// Acquire device, context, buffer pool and source
    ///
    /// On failure every resource acquired so far is released and the engine
    /// stays Uninitialized. Calling this while already Ready does nothing.
    pub fn init(&mut self) -> Result<(), InitError> {
        if self.lifecycle == LifecycleState::Ready {
            debug!("Audio engine already initialized");
            return Ok(());
        }

        if let Err(e) = self.acquire() {
            warn!("Audio init failed: {}", e);
            self.shutdown();
            return Err(e);
        }

        self.active_buffer = 0;
        self.tone = ToneState::Stopped;
        self.lifecycle = LifecycleState::Ready;
        self.apply_master_gain();

        debug!(
            "Audio engine ready ({} buffers, {} synthesis, gain {:.2})",
            self.resources.buffers.len(),
            self.waveform,
            self.master_gain
        );
        Ok(())
    }

    fn acquire(&mut self) -> Result<(), InitError> {
        let device = self
            .backend
            .open_device()
            .map_err(init_error(InitStep::OpenDevice))?;
        self.resources.device = Some(device);

        let context = self
            .backend
            .create_context(device)
            .map_err(init_error(InitStep::CreateContext))?;
        self.resources.context = Some(context);

        self.backend
            .make_context_current(Some(context))
            .map_err(init_error(InitStep::ActivateContext))?;
        self.resources.context_current = true;

        let buffers = self
            .backend
            .generate_buffers(self.buffer_count)
            .map_err(init_error(InitStep::AllocateBuffers))?;
        let allocated = buffers.len();
        self.resources.buffers = buffers;
        if allocated != self.buffer_count {
            return Err(InitError {
                step: InitStep::AllocateBuffers,
                source: BackendError::BufferAllocation(format!(
                    "requested {} buffers, got {}",
                    self.buffer_count, allocated
                )),
            });
        }

        let source = self
            .backend
            .generate_source()
            .map_err(init_error(InitStep::AllocateSource))?;
        self.resources.source = Some(source);

        if let Err(e) = self.backend.configure_source(source, &SOURCE_PARAMS) {
            warn!("Failed to configure source: {}", e);
        }
        if let Err(e) = self.backend.configure_listener(&LISTENER_PARAMS) {
            warn!("Failed to configure listener: {}", e);
        }

        Ok(())
    }

    /// Release source, buffers, context and device, in that order
    ///
    /// Each resource is released at most once; backend errors are logged and
    /// ignored. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.resources.is_empty() && self.lifecycle == LifecycleState::Uninitialized {
            return;
        }
        self.lifecycle = LifecycleState::ShuttingDown;

        if let Some(source) = self.resources.source.take() {
            if let Err(e) = self.backend.stop(source) {
                debug!("Ignoring stop error during shutdown: {}", e);
            }
            let processed = self.backend.buffers_processed(source);
            if processed > 0
                && let Err(e) = self.backend.unqueue_buffers(source, processed)
            {
                debug!("Ignoring unqueue error during shutdown: {}", e);
            }
            if let Err(e) = self.backend.delete_source(source) {
                debug!("Ignoring source release error: {}", e);
            }
        }

        if !self.resources.buffers.is_empty() {
            let buffers = std::mem::take(&mut self.resources.buffers);
            if let Err(e) = self.backend.delete_buffers(&buffers) {
                debug!("Ignoring buffer release error: {}", e);
            }
        }

        if self.resources.context_current {
            self.resources.context_current = false;
            if let Err(e) = self.backend.make_context_current(None) {
                debug!("Ignoring context release error: {}", e);
            }
        }

        if let Some(context) = self.resources.context.take()
            && let Err(e) = self.backend.destroy_context(context)
        {
            debug!("Ignoring context destroy error: {}", e);
        }

        if let Some(device) = self.resources.device.take()
            && let Err(e) = self.backend.close_device(device)
        {
            debug!("Ignoring device close error: {}", e);
        }

        self.tone = ToneState::Stopped;
        self.active_buffer = 0;
        self.lifecycle = LifecycleState::Uninitialized;
        debug!("Audio backend closed");
    }

    /// Poll with the frequency wanted for this cycle (0 = silence)
    ///
    /// No-op unless Ready. If a chunk cannot be uploaded or enqueued while
    /// nothing else is queued, the engine drops back to Stopped and the next
    /// non-zero request starts the tone again.
    pub fn set_tone(&mut self, frequency: u32) {
        let Some(source) = self.ready_source() else {
            return;
        };

        let transition = self.tone.transition(frequency);
        let fed = match transition {
            Transition::Sustain { frequency } => self.sustain(source, frequency),
            Transition::Retune { from, to } => {
                debug!("Tone change {} Hz -> {} Hz", from, to);
                self.stats.tone_changes += 1;
                self.stop_and_drain(source);
                let fed = self.rotate_and_enqueue(source, to, self.waveform);
                if fed {
                    self.play(source);
                }
                fed
            }
            Transition::Silence => {
                if self.tone.is_playing() {
                    debug!("Tone stopped");
                }
                self.stats.stops += 1;
                self.stop_and_drain(source);
                true
            }
        };

        // Nothing left queued: fall back to Stopped so the next request retunes
        self.tone = if fed {
            transition.target()
        } else {
            ToneState::Stopped
        };
    }

    /// Keep the current tone fed without changing it
    ///
    /// Same as `set_tone(current_frequency())`, except that it does nothing
    /// at all while stopped.
    pub fn update(&mut self) {
        let Some(source) = self.ready_source() else {
            return;
        };
        if let ToneState::Playing { frequency } = self.tone
            && !self.sustain(source, frequency)
        {
            self.tone = ToneState::Stopped;
        }
    }

    /// Queue and play one square-wave burst at [`DIAGNOSTIC_FREQUENCY`]
    ///
    /// Bypasses the tone state machine; for bring-up only.
    pub fn test(&mut self) {
        let Some(source) = self.ready_source() else {
            return;
        };
        debug!("Diagnostic tone at {} Hz", DIAGNOSTIC_FREQUENCY);
        if self.rotate_and_enqueue(source, DIAGNOSTIC_FREQUENCY, Waveform::Square) {
            self.play(source);
        }
    }

    /// Set the master gain
    ///
    /// `gain` must be non-negative. The value is always stored and is pushed
    /// to the backend listener only while Ready.
    pub fn set_master_gain(&mut self, gain: f32) {
        debug_assert!(gain >= 0.0, "master gain must be non-negative, got {gain}");
        self.master_gain = gain;
        if self.lifecycle == LifecycleState::Ready {
            self.apply_master_gain();
        }
    }

    /// Stored master gain
    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Current frequency in Hz (0 when stopped)
    pub fn current_frequency(&self) -> u32 {
        self.tone.frequency()
    }

    pub fn tone_state(&self) -> ToneState {
        self.tone
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == LifecycleState::Ready
    }

    /// Index of the most recently filled buffer slot
    pub fn active_buffer_index(&self) -> usize {
        self.active_buffer
    }

    /// Buffer pool handles (empty unless Ready)
    pub fn buffers(&self) -> &[BufferHandle] {
        &self.resources.buffers
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Change the waveform used for subsequent resynthesis
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn ready_source(&self) -> Option<SourceHandle> {
        if self.lifecycle == LifecycleState::Ready {
            self.resources.source
        } else {
            None
        }
    }

    fn apply_master_gain(&mut self) {
        if let Err(e) = self.backend.set_listener_gain(self.master_gain) {
            warn!("Failed to apply master gain: {}", e);
        }
    }

    /// Refill one buffer once the backend has consumed one
    ///
    /// Returns false when the refill failed and the source has run dry.
    fn sustain(&mut self, source: SourceHandle, frequency: u32) -> bool {
        let processed = self.backend.buffers_processed(source);
        if processed == 0 {
            return true;
        }

        self.drain(source, processed);
        let fed = self.rotate_and_enqueue(source, frequency, self.waveform);

        if self.backend.is_playing(source) {
            return true;
        }
        if !fed {
            debug!("Refill at {} Hz failed with the source dry, stopping", frequency);
            self.stop_and_drain(source);
            return false;
        }
        debug!("Audio underrun at {} Hz, restarting source", frequency);
        self.stats.underrun_recoveries += 1;
        self.play(source);
        true
    }

    fn stop_and_drain(&mut self, source: SourceHandle) {
        if let Err(e) = self.backend.stop(source) {
            warn!("Failed to stop source: {}", e);
        }
        let processed = self.backend.buffers_processed(source);
        self.drain(source, processed);
    }

    fn drain(&mut self, source: SourceHandle, processed: usize) {
        if processed == 0 {
            return;
        }
        if let Err(e) = self.backend.unqueue_buffers(source, processed) {
            warn!("Failed to unqueue {} processed buffers: {}", processed, e);
        }
    }

    /// Synthesize into the next slot and enqueue it
    ///
    /// The slot only becomes active once the buffer is queued; returns
    /// whether it was.
    fn rotate_and_enqueue(
        &mut self,
        source: SourceHandle,
        frequency: u32,
        waveform: Waveform,
    ) -> bool {
        let pool = self.resources.buffers.len();
        if pool == 0 {
            return false;
        }
        let slot = (self.active_buffer + 1) % pool;
        let buffer = self.resources.buffers[slot];

        synth::synthesize(frequency, waveform, &mut self.scratch);
        if let Err(e) =
            self.backend
                .buffer_data(buffer, PcmFormat::Mono8, &self.scratch, SAMPLE_RATE)
        {
            warn!("Failed to upload chunk to buffer {:?}: {}", buffer, e);
            return false;
        }
        self.stats.chunks_synthesized += 1;
        trace!(
            "Synthesized {} Hz {} chunk into slot {}",
            frequency, waveform, slot
        );

        if let Err(e) = self.backend.queue_buffers(source, &[buffer]) {
            warn!("Failed to enqueue buffer {:?}: {}", buffer, e);
            return false;
        }
        self.active_buffer = slot;
        self.stats.buffers_enqueued += 1;
        true
    }

    fn play(&mut self, source: SourceHandle) {
        if let Err(e) = self.backend.play(source) {
            warn!("Failed to start source: {}", e);
        }
    }
}

impl<B: AudioBackend> Drop for ToneEngine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
