//! Offline rendering of synthesized chunks to WAV

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use beeper::synth::{SILENCE, synthesize_chunk};
use beeper::{SAMPLE_RATE, ToneConfig, Waveform};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Tone frequency in Hz
    #[arg(long, short = 'f')]
    pub frequency: u32,

    /// Waveform (defaults to the configured one)
    #[arg(long, short = 'w')]
    pub waveform: Option<Waveform>,

    /// Number of consecutive chunks to write
    #[arg(long, default_value = "1")]
    pub chunks: usize,

    /// Output WAV file
    #[arg(long, short = 'o')]
    pub out: PathBuf,
}

pub fn execute(args: RenderArgs, config: ToneConfig) -> Result<()> {
    if args.frequency == 0 {
        bail!("Frequency must be above 0 Hz");
    }
    let waveform = args.waveform.unwrap_or(config.waveform);
    let chunk = synthesize_chunk(args.frequency, waveform);

    write_wav(&args.out, &chunk, args.chunks)?;
    info!(
        "Wrote {} x {} Hz {} chunk(s) to {}",
        args.chunks,
        args.frequency,
        waveform,
        args.out.display()
    );
    Ok(())
}

/// Write `chunk` repeated `repeat` times as 8-bit mono PCM
pub fn write_wav(path: &Path, chunk: &[u8], repeat: usize) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 8,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for _ in 0..repeat {
        for &sample in chunk {
            // hound takes 8-bit samples as signed and stores them unsigned
            let signed = (i16::from(sample) - i16::from(SILENCE)) as i8;
            writer
                .write_sample(signed)
                .context("Failed to write WAV sample")?;
        }
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beeper::CHUNK_SAMPLES;

    #[test]
    fn test_write_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let chunk = synthesize_chunk(440, Waveform::Sine);

        write_wav(&path, &chunk, 2).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 8);

        let samples: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), CHUNK_SAMPLES * 2);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], (i16::from(chunk[1]) - 128) as i8);
        assert_eq!(&samples[..CHUNK_SAMPLES], &samples[CHUNK_SAMPLES..]);
    }
}
