//! Beeper: tone generation for an emulated PC speaker
//!
//! The emulated machine decides *what* frequency its speaker should sound;
//! this crate turns that decision into gapless PCM playback on a buffer-queue
//! audio backend, using polling only.
//!
//! # Architecture
//!
//! - [`synth`] - Pure synthesis of fixed 250 ms chunks (8-bit unsigned mono, 44.1 kHz)
//! - [`ToneEngine`] - Lifecycle, buffer pool rotation and the tone state machine
//! - [`AudioBackend`] - The playback service the engine drives
//! - [`CpalBackend`] - Real device playback (feature `device`)
//!
//! # Usage
//!
//! ```ignore
//! let mut engine = ToneEngine::new(CpalBackend::new());
//! engine.init()?;
//! engine.set_tone(440);
//! loop {
//!     // once per emulated frame
//!     engine.update();
//! }
//! ```

pub mod backend;
pub mod config;
pub mod engine;
#[cfg(feature = "device")]
pub mod output;
pub mod queue;
pub mod synth;
#[cfg(test)]
pub mod test_utils;

pub use backend::{AudioBackend, BackendError};
pub use config::{ConfigError, ToneConfig};
pub use engine::{
    DEFAULT_BUFFER_COUNT, DIAGNOSTIC_FREQUENCY, EngineStats, InitError, InitStep, LifecycleState,
    ToneEngine, ToneState, Transition,
};
#[cfg(feature = "device")]
pub use output::CpalBackend;
pub use queue::PlaybackQueue;
pub use synth::{CHUNK_SAMPLES, NYQUIST, SAMPLE_RATE, Waveform};
