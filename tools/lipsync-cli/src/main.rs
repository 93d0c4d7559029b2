//! Lipsync CLI: capture mouth cues from audio and place them as strips.
//!
//! Usage:
//!   lipsync check                      Check the recognizer executable
//!   lipsync capture <AUDIO>            Recognize mouth cues in an audio file
//!   lipsync optimize <CUES>            Trim long cues and fix sub-frame cues
//!   lipsync bake <CUES> --mapping <M>  Place cues onto animation tracks

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lipsync_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "lipsync",
    about = "Mouth cue capture and animation strip placement",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/lipsync/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the recognizer executable and print its version
    Check {
        /// Recognizer executable (overrides config)
        #[arg(long)]
        executable: Option<PathBuf>,
    },

    /// Recognize mouth cues in an audio file
    Capture {
        /// Audio file to analyze
        audio: PathBuf,

        /// Output cue document (defaults to the audio path with .json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dialog text file to guide recognition
        #[arg(long)]
        dialog: Option<PathBuf>,

        /// Recognizer: pocket-sphinx|phonetic
        #[arg(long)]
        recognizer: Option<String>,

        /// Recognizer executable (overrides config)
        #[arg(long)]
        executable: Option<PathBuf>,
    },

    /// Trim long cues and stretch cues that fall between frames
    Optimize {
        /// Cue document to optimize
        cues: PathBuf,

        /// Output cue document (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Timeline frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Longest allowed non-silence cue (seconds)
        #[arg(long)]
        max_duration: Option<f64>,

        /// Blend-in time, also the trimming tolerance (seconds)
        #[arg(long)]
        blend_in: Option<f64>,
    },

    /// Optimize cues and place them onto in-memory tracks
    Bake {
        /// Cue document to bake
        cues: PathBuf,

        /// Shape to clip mapping (JSON)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Timeline frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Number of destination tracks (1 or 2)
        #[arg(long, default_value = "2")]
        tracks: usize,

        /// Split point inside each cue [0.0, 1.0]
        #[arg(long)]
        blend_ratio: Option<f64>,

        /// Blend mode: none|by-ratio|always-auto
        #[arg(long)]
        blend_mode: Option<String>,

        /// Print placed strips as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    lipsync_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Check { executable } => commands::check::run(&config, executable),
        Commands::Capture {
            audio,
            output,
            dialog,
            recognizer,
            executable,
        } => commands::capture::run(&config, audio, output, dialog, recognizer, executable).await,
        Commands::Optimize {
            cues,
            output,
            fps,
            max_duration,
            blend_in,
        } => commands::optimize::run(&config, cues, output, fps, max_duration, blend_in),
        Commands::Bake {
            cues,
            mapping,
            fps,
            tracks,
            blend_ratio,
            blend_mode,
            json,
        } => commands::bake::run(
            &config,
            commands::bake::BakeArgs {
                cues,
                mapping,
                fps,
                tracks,
                blend_ratio,
                blend_mode,
                json,
            },
        ),
    }
}
