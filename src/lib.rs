//! Skrift - resilient video transcripts
//!
//! Turns a video reference into a timestamped transcript, preferring the
//! platform's own captions and falling back to audio download plus chunked
//! speech recognition when there are none.
//!
//! The name "Skrift" is Norwegian for "writing".
//!
//! # Architecture
//!
//! - `video` - Video reference parsing
//! - `endpoint` - Egress endpoint rotation with failure accounting
//! - `captions` - Caption track discovery and WebVTT parsing
//! - `audio` - Audio download and segment extraction
//! - `transcription` - Chunked speech recognition, assembly, refinement and output formats
//! - `orchestrator` - The acquisition state machine
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use skrift::config::Settings;
//! use skrift::endpoint::EndpointPool;
//! use skrift::orchestrator::{AcquireOptions, Orchestrator};
//! use skrift::video::VideoReference;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pool = Arc::new(EndpointPool::from_settings(&settings.endpoints));
//!     let orchestrator = Orchestrator::new(settings, pool)?;
//!
//!     let video = VideoReference::parse("dQw4w9WgXcQ")?;
//!     let acquisition = orchestrator
//!         .acquire(&video, &[], AcquireOptions::default())
//!         .await?;
//!     println!("{} via {}", acquisition.text(), acquisition.method);
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod captions;
pub mod cli;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod transcription;
pub mod video;

pub use error::{Result, SkriftError};
