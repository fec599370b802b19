//! Device playback commands: play, sweep, test
//!
//! Each command drives the engine the way an emulator would: one poll per
//! 60 Hz frame, with `set_tone` whenever the speaker frequency changes and
//! `update` otherwise.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use beeper::{CpalBackend, SAMPLE_RATE, ToneConfig, ToneEngine, Waveform};

/// Poll interval (one emulated frame at ~60 Hz)
const FRAME: Duration = Duration::from_millis(16);

/// Overrides shared by the device commands
#[derive(Args, Debug, Clone, Default)]
pub struct ToneArgs {
    /// Waveform (sine or square)
    #[arg(long, short = 'w')]
    pub waveform: Option<Waveform>,

    /// Master gain (>= 0)
    #[arg(long, short = 'g')]
    pub gain: Option<f32>,
}

impl ToneArgs {
    /// Apply overrides on top of the loaded configuration
    pub fn apply(&self, mut config: ToneConfig) -> Result<ToneConfig> {
        if let Some(waveform) = self.waveform {
            config.waveform = waveform;
        }
        if let Some(gain) = self.gain {
            config.master_gain = gain;
        }
        config.validate().context("Invalid tone settings")?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Tone frequency in Hz
    #[arg(long, short = 'f')]
    pub frequency: u32,

    /// How long to keep the tone going
    #[arg(long, short = 's', default_value = "2.0")]
    pub seconds: f32,

    #[command(flatten)]
    pub tone: ToneArgs,
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Start frequency in Hz
    #[arg(long)]
    pub from: u32,

    /// End frequency in Hz (may be below --from)
    #[arg(long)]
    pub to: u32,

    /// Frequency increment per step in Hz
    #[arg(long, default_value = "50")]
    pub step: u32,

    /// Time spent on each step in milliseconds
    #[arg(long, default_value = "100")]
    pub step_ms: u64,

    #[command(flatten)]
    pub tone: ToneArgs,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    #[command(flatten)]
    pub tone: ToneArgs,
}

fn open_engine(config: &ToneConfig) -> Result<ToneEngine<CpalBackend>> {
    let mut engine = ToneEngine::with_config(CpalBackend::new(), config);
    engine
        .init()
        .context("Failed to initialize audio output")?;
    info!(
        "Audio output ready at {} Hz ({} synthesis)",
        engine.backend().sample_rate(),
        engine.waveform()
    );
    Ok(engine)
}

/// Poll `update` once per frame for `duration`
fn run_for(engine: &mut ToneEngine<CpalBackend>, duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        engine.update();
        thread::sleep(FRAME);
    }
}

/// Frequencies visited by a sweep, inclusive of both ends
pub fn sweep_steps(from: u32, to: u32, step: u32) -> impl Iterator<Item = u32> {
    let step = step.max(1);
    std::iter::successors(Some(from), move |&freq| {
        if freq == to {
            None
        } else if from < to {
            Some(freq.saturating_add(step).min(to))
        } else {
            Some(freq.saturating_sub(step).max(to))
        }
    })
}

pub fn execute_play(args: PlayArgs, config: ToneConfig) -> Result<()> {
    if args.frequency == 0 {
        bail!("Frequency must be above 0 Hz");
    }
    let duration = match Duration::try_from_secs_f32(args.seconds) {
        Ok(duration) => duration,
        Err(e) => bail!("Invalid duration {}s: {}", args.seconds, e),
    };
    let config = args.tone.apply(config)?;
    let mut engine = open_engine(&config)?;

    info!("Playing {} Hz for {:.1}s", args.frequency, args.seconds);
    engine.set_tone(args.frequency);
    run_for(&mut engine, duration);
    engine.set_tone(0);

    let stats = engine.stats();
    info!(
        "Done: {} chunks synthesized, {} underrun recoveries",
        stats.chunks_synthesized, stats.underrun_recoveries
    );
    Ok(())
}

pub fn execute_sweep(args: SweepArgs, config: ToneConfig) -> Result<()> {
    if args.from == 0 || args.to == 0 {
        bail!("Sweep bounds must be above 0 Hz");
    }
    let config = args.tone.apply(config)?;
    let mut engine = open_engine(&config)?;

    info!(
        "Sweeping {} Hz -> {} Hz in {} Hz steps",
        args.from,
        args.to,
        args.step.max(1)
    );
    for freq in sweep_steps(args.from, args.to, args.step) {
        engine.set_tone(freq);
        run_for(&mut engine, Duration::from_millis(args.step_ms));
    }
    engine.set_tone(0);

    info!("Done: {} tone changes", engine.stats().tone_changes);
    Ok(())
}

pub fn execute_test(args: TestArgs, config: ToneConfig) -> Result<()> {
    let config = args.tone.apply(config)?;
    let mut engine = open_engine(&config)?;

    info!("Diagnostic burst at {} Hz", beeper::DIAGNOSTIC_FREQUENCY);
    engine.test();

    // Let the whole chunk play out before shutting down
    let chunk = Duration::from_secs_f64(beeper::CHUNK_SAMPLES as f64 / f64::from(SAMPLE_RATE));
    thread::sleep(chunk + FRAME * 4);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(from: u32, to: u32, step: u32) -> Vec<u32> {
        sweep_steps(from, to, step).collect()
    }

    #[test]
    fn test_sweep_steps_upward() {
        assert_eq!(steps(100, 300, 100), vec![100, 200, 300]);
        assert_eq!(steps(100, 250, 100), vec![100, 200, 250]);
    }

    #[test]
    fn test_sweep_steps_downward() {
        assert_eq!(steps(300, 100, 100), vec![300, 200, 100]);
        assert_eq!(steps(300, 50, 100), vec![300, 200, 100, 50]);
    }

    #[test]
    fn test_sweep_steps_single_and_zero_step() {
        assert_eq!(steps(440, 440, 10), vec![440]);
        assert_eq!(steps(1, 3, 0), vec![1, 2, 3]);
    }

    #[test]
    fn test_sweep_steps_full_range_is_lazy() {
        let mut sweep = sweep_steps(1, u32::MAX, 1);
        assert_eq!(sweep.next(), Some(1));
        assert_eq!(sweep.nth(2), Some(4));

        assert_eq!(
            steps(1, u32::MAX, 1 << 31),
            vec![1, (1 << 31) + 1, u32::MAX]
        );
    }

    #[test]
    fn test_overflowing_duration_is_rejected() {
        let args = PlayArgs {
            frequency: 440,
            seconds: 1e20,
            tone: ToneArgs::default(),
        };
        let err = execute_play(args, ToneConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid duration"));
    }

    #[test]
    fn test_tone_args_override_config() {
        let args = ToneArgs {
            waveform: Some(Waveform::Square),
            gain: Some(0.4),
        };
        let config = args.apply(ToneConfig::default()).unwrap();
        assert_eq!(config.waveform, Waveform::Square);
        assert!((config.master_gain - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tone_args_reject_negative_gain() {
        let args = ToneArgs {
            waveform: None,
            gain: Some(-1.0),
        };
        assert!(args.apply(ToneConfig::default()).is_err());
    }
}
