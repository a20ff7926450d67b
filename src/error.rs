use crate::evaluator::EngineError;

/// Result alias carrying the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Environment-level failures. Any of these means no live session can run;
/// compile and render problems are reported through session state instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no default output device available")]
    NoOutputDevice,
    #[error("failed to fetch default output config: {0}")]
    OutputConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("unsupported sample format '{0}'")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
