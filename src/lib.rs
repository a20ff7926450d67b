//! glitchbox - realtime bytebeat playback around an external expression engine
//!
//! - [`session`]: compile/play/stop/save controller owning the live evaluator
//! - [`audio`]: real-time output callback and cpal device
//! - [`render`] + [`wav`]: offline rendering to 16-bit PCM WAV
//! - [`analysis`] + [`visualizer`]: spectrum and waveform display

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod render;
pub mod session;
pub mod visualizer;
pub mod wav;

pub use error::{Error, Result};

/// Played when neither the share link nor the slot holds an expression.
pub const DEFAULT_EXPRESSION: &str = "t*(42&t>>10)";
