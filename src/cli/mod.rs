//! CLI module for Skrift.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Skrift - resilient video transcripts
///
/// Fetches platform captions when a video has them and falls back to
/// downloading the audio and running chunked speech recognition when it
/// does not. The name "Skrift" is Norwegian for "writing".
#[derive(Parser, Debug)]
#[command(name = "skrift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check system requirements and configuration
    Doctor,

    /// Acquire a transcript for a video
    Transcribe {
        /// Video URL or bare video ID
        url: String,

        /// Caption language to try, in priority order (repeatable; `a.en`
        /// selects auto-generated English only)
        #[arg(short, long = "language")]
        languages: Vec<String>,

        /// Skip the language-model cleanup of recognized speech
        #[arg(long)]
        no_refine: bool,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Output format (text, json, srt, vtt, report)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
