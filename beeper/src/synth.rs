//! Waveform synthesis for fixed-length PCM chunks
//!
//! Every chunk is 11,025 samples of 8-bit unsigned mono PCM at 44,100 Hz
//! (250 ms). Synthesis is a pure function of frequency and waveform, so two
//! calls with the same inputs always produce identical bytes.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Playback sample rate in Hz
pub const SAMPLE_RATE: u32 = 44_100;

/// Samples per synthesized chunk (250 ms at 44.1 kHz)
pub const CHUNK_SAMPLES: usize = 11_025;

/// Highest representable frequency at [`SAMPLE_RATE`]
pub const NYQUIST: u32 = SAMPLE_RATE / 2;

/// Odd harmonics tried, in order, by the square approximation
pub const HARMONIC_CANDIDATES: [u32; 6] = [3, 5, 7, 9, 11, 13];

/// Unsigned 8-bit PCM midpoint (silence)
pub const SILENCE: u8 = 128;

/// Peak deviation from [`SILENCE`] for a full-scale signal
const AMPLITUDE: f64 = 127.0;

/// Waveform kind produced by the synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    /// Pure sine at the requested frequency
    #[default]
    Sine,
    /// Fundamental plus at most one odd harmonic below Nyquist
    Square,
}

impl Waveform {
    /// Lowercase name, matching the config/CLI spelling
    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
        }
    }
}

impl std::fmt::Display for Waveform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            other => Err(format!("unknown waveform '{other}' (expected sine or square)")),
        }
    }
}

/// Pick the single odd harmonic added by the square approximation
///
/// Returns the first candidate `h` in [`HARMONIC_CANDIDATES`] with
/// `frequency * h < NYQUIST`, or `None` when the fundamental is already too
/// close to Nyquist. Exactly one harmonic is ever selected; the partials are
/// not summed.
pub fn select_harmonic(frequency: u32) -> Option<u32> {
    HARMONIC_CANDIDATES
        .iter()
        .copied()
        .find(|&h| u64::from(frequency) * u64::from(h) < u64::from(NYQUIST))
}

/// Encode a normalized signal value as an unsigned 8-bit sample
///
/// `round(128 + 127 * value)`, clamped to the byte range.
pub fn encode_sample(value: f64) -> u8 {
    (f64::from(SILENCE) + AMPLITUDE * value)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Synthesize one chunk into `output`
///
/// `output` is cleared and refilled with exactly [`CHUNK_SAMPLES`] bytes, so a
/// single buffer can be reused across calls. A frequency of 0 yields a flat
/// chunk of [`SILENCE`]; callers model silence by not enqueueing at all.
pub fn synthesize(frequency: u32, waveform: Waveform, output: &mut Vec<u8>) {
    output.clear();
    output.reserve(CHUNK_SAMPLES);

    let omega = TAU * f64::from(frequency);
    let dt = 1.0 / f64::from(SAMPLE_RATE);

    match waveform {
        Waveform::Sine => {
            output.extend((0..CHUNK_SAMPLES).map(|i| {
                let t = i as f64 * dt;
                encode_sample((omega * t).sin())
            }));
        }
        Waveform::Square => {
            let harmonic = select_harmonic(frequency).map(f64::from);
            output.extend((0..CHUNK_SAMPLES).map(|i| {
                let t = i as f64 * dt;
                let mut out = (omega * t).sin();
                if let Some(h) = harmonic {
                    out += (omega * h * t).sin() / h;
                }
                encode_sample(out)
            }));
        }
    }
}

/// Synthesize one chunk into a freshly allocated buffer
pub fn synthesize_chunk(frequency: u32, waveform: Waveform) -> Vec<u8> {
    let mut output = Vec::with_capacity(CHUNK_SAMPLES);
    synthesize(frequency, waveform, &mut output);
    output
}
