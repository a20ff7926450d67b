//! Evaluator boundary
//!
//! The expression language is compiled and executed by an external engine.
//! This module only describes the narrow surface the rest of the crate talks
//! to: create a handle, compile text into it, pull one sample per call.
//! Dropping a handle destroys it.

#[cfg(feature = "glitch")]
pub mod glitch;

#[cfg(test)]
pub(crate) mod testing;

/// A single evaluator instance holding compiled program state.
///
/// `eval` advances the evaluator's internal time by one sample, so callers
/// must invoke it exactly once per output sample and in order.
pub trait Evaluator: Send + 'static {
    /// Compile `source` into this handle.
    ///
    /// On failure the previously compiled program stays active.
    fn compile(&mut self, source: &str) -> Result<(), CompileError>;

    /// Produce the next sample.
    fn eval(&mut self) -> f32;

    /// Set a named variable consumed by the running program on its next evaluation.
    fn set_variable(&mut self, name: &str, value: f32);

    /// Forward a raw three-byte MIDI message (status, data1, data2).
    fn midi(&mut self, _message: [u8; 3]) {}

    /// Rewind internal time and oscillator state. Engines without a reset
    /// capability leave this as a no-op.
    fn reset(&mut self) {}
}

/// Factory for evaluator handles.
///
/// Shared between the live session and the offline render thread, each of
/// which creates its own independent handles.
pub trait Engine: Send + Sync + 'static {
    type Evaluator: Evaluator;

    fn create(&self) -> Result<Self::Evaluator, EngineError>;

    /// Rate at which evaluators advance time, when the engine fixes it.
    /// Offline renders must use this rate or the output plays off-speed.
    fn sample_rate(&self) -> Option<u32> {
        None
    }
}

/// Stand-in engine for builds without a linked expression engine.
/// Every `create` fails with [`EngineError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlinked;

/// Evaluator type of [`Unlinked`]; uninhabited.
#[derive(Debug)]
pub enum NoEvaluator {}

impl Engine for Unlinked {
    type Evaluator = NoEvaluator;

    fn create(&self) -> Result<NoEvaluator, EngineError> {
        Err(EngineError::Unavailable(
            "no expression engine linked, rebuild with `--features glitch`".into(),
        ))
    }
}

impl Evaluator for NoEvaluator {
    fn compile(&mut self, _source: &str) -> Result<(), CompileError> {
        match *self {}
    }

    fn eval(&mut self) -> f32 {
        match *self {}
    }

    fn set_variable(&mut self, _name: &str, _value: f32) {
        match *self {}
    }
}

/// Variables the controller forwards into the running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    /// Horizontal pointer position, normalized to `[0, 1]`.
    X,
    /// Vertical pointer position, normalized to `[0, 1]`.
    Y,
}

impl Variable {
    pub fn name(self) -> &'static str {
        match self {
            Variable::X => "x",
            Variable::Y => "y",
        }
    }
}

/// The engine rejected an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("syntax error (engine status {status})")]
    Syntax { status: i32 },
    #[error("expression contains an interior NUL byte")]
    InteriorNul,
}

/// The engine could not hand out a new evaluator.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine failed to create an evaluator handle")]
    CreateFailed,
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}
