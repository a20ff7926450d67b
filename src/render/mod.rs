//! Offline rendering
//!
//! Turns an expression into a finished WAV file without touching the live
//! session. [`render`] is the synchronous pipeline; [`RenderWorker`] runs it
//! on an isolated thread behind a one-request-in, one-response-out protocol.

mod worker;

use std::time::Duration;

use crate::{
    evaluator::{CompileError, Engine, EngineError, Evaluator},
    wav::{self, AudioContainer},
};

pub use worker::RenderWorker;

/// Largest mono frame count whose data chunk still fits the 32-bit size fields.
pub const MAX_FRAMES: usize = (u32::MAX as usize - wav::HEADER_LEN) / 2;

/// One offline render job.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub expression: String,
    pub duration: Duration,
    pub sample_rate: u32,
}

impl RenderRequest {
    pub fn new(expression: impl Into<String>, duration: Duration, sample_rate: u32) -> Self {
        Self {
            expression: expression.into(),
            duration,
            sample_rate,
        }
    }

    /// Number of samples to pull: `duration * sample_rate`, truncated.
    pub fn frame_count(&self) -> Result<usize, RenderFailure> {
        if self.sample_rate == 0 {
            return Err(RenderFailure::InvalidRequest("sample rate must be non-zero".into()));
        }
        let frames = (self.duration.as_secs_f64() * self.sample_rate as f64).floor();
        if frames > MAX_FRAMES as f64 {
            return Err(RenderFailure::InvalidRequest(format!(
                "{frames} frames exceed the WAV size limit"
            )));
        }
        Ok(frames as usize)
    }
}

/// Result of a render job. An absent buffer means the save failed.
#[derive(Debug)]
pub enum RenderResponse {
    Rendered(AudioContainer),
    Failed(RenderFailure),
}

impl RenderResponse {
    pub fn into_container(self) -> Option<AudioContainer> {
        match self {
            RenderResponse::Rendered(container) => Some(container),
            RenderResponse::Failed(_) => None,
        }
    }
}

impl From<Result<AudioContainer, RenderFailure>> for RenderResponse {
    fn from(result: Result<AudioContainer, RenderFailure>) -> Self {
        match result {
            Ok(container) => RenderResponse::Rendered(container),
            Err(failure) => RenderResponse::Failed(failure),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderFailure {
    #[error("expression rejected: {0}")]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid render request: {0}")]
    InvalidRequest(String),
    #[error("render worker unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("render job panicked")]
    Panicked,
}

/// Render `request` with a fresh evaluator from `engine`.
///
/// The handle is created for this job only and dropped before encoding, so
/// no state leaks between jobs or into any other evaluator.
pub fn render<E: Engine>(engine: &E, request: &RenderRequest) -> Result<AudioContainer, RenderFailure> {
    let frames = request.frame_count()?;
    if let Some(rate) = engine.sample_rate() {
        if rate != request.sample_rate {
            return Err(RenderFailure::InvalidRequest(format!(
                "engine runs at {rate} Hz, request asks for {} Hz",
                request.sample_rate
            )));
        }
    }

    let mut evaluator = engine.create()?;
    evaluator.compile(&request.expression)?;

    let samples: Vec<i16> = (0..frames).map(|_| wav::quantize(evaluator.eval())).collect();
    drop(evaluator);

    Ok(AudioContainer::encode(&samples, request.sample_rate, 1))
}
