//! Beeper CLI - bring-up tool for the tone engine
//!
//! # Commands
//!
//! - `beeper play` - Sustain one tone on the default output device
//! - `beeper sweep` - Walk a frequency range, retuning every step
//! - `beeper test` - Fire the diagnostic burst once
//! - `beeper render` - Write synthesized chunks to a WAV file (no device needed)
//!
//! # Usage
//!
//! ```bash
//! beeper play --frequency 440 --seconds 2
//! beeper sweep --from 200 --to 2000 --step 100 --waveform square
//! beeper render --frequency 1000 --waveform square --out beep.wav
//! ```
//!
//! Settings come from `beeper.toml` in the platform config directory, or the
//! file given with `--config`; `--waveform` and `--gain` override it.

mod play;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use beeper::ToneConfig;

/// Beeper CLI - bring-up tool for the tone engine
#[derive(Parser)]
#[command(name = "beeper")]
#[command(about = "Bring-up tool for the emulated PC speaker tone engine")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sustain one tone on the default output device
    Play(play::PlayArgs),

    /// Walk a frequency range, retuning every step
    Sweep(play::SweepArgs),

    /// Fire the diagnostic burst once
    Test(play::TestArgs),

    /// Write synthesized chunks to a WAV file
    Render(render::RenderArgs),
}

fn load_config(path: Option<&PathBuf>) -> Result<ToneConfig> {
    match path {
        Some(path) => beeper::config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(beeper::config::load()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Play(args) => play::execute_play(args, config),
        Commands::Sweep(args) => play::execute_sweep(args, config),
        Commands::Test(args) => play::execute_test(args, config),
        Commands::Render(args) => render::execute(args, config),
    }
}
