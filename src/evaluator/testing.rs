//! In-process evaluator used by unit tests.
//!
//! Accepts any non-empty expression with balanced parentheses and plays a
//! sawtooth whose step is scaled by the `x` variable. MIDI messages are
//! recorded in arrival order.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use super::{CompileError, Engine, EngineError, Evaluator};

#[derive(Debug, Default)]
pub(crate) struct ScriptedEngine {
    pub(crate) alive: Arc<AtomicUsize>,
    pub(crate) created: AtomicUsize,
    pub(crate) sample_rate: Option<u32>,
}

impl ScriptedEngine {
    pub(crate) fn at_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            ..Self::default()
        }
    }

    pub(crate) fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Engine for ScriptedEngine {
    type Evaluator = ScriptedEvaluator;

    fn create(&self) -> Result<ScriptedEvaluator, EngineError> {
        self.alive.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedEvaluator {
            program: None,
            t: 0,
            x: 0.0,
            midi: Vec::new(),
            alive: self.alive.clone(),
        })
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedEvaluator {
    pub(crate) program: Option<String>,
    pub(crate) t: u32,
    pub(crate) x: f32,
    pub(crate) midi: Vec<[u8; 3]>,
    alive: Arc<AtomicUsize>,
}

pub(crate) fn is_valid(source: &str) -> bool {
    let mut depth = 0i32;
    for c in source.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0 && !source.trim().is_empty()
}

impl Evaluator for ScriptedEvaluator {
    fn compile(&mut self, source: &str) -> Result<(), CompileError> {
        if !is_valid(source) {
            return Err(CompileError::Syntax { status: 1 });
        }
        self.program = Some(source.to_owned());
        Ok(())
    }

    fn eval(&mut self) -> f32 {
        if self.program.is_none() {
            return 0.0;
        }
        let step = 1 + (self.x * 3.0) as u32;
        let byte = (self.t.wrapping_mul(step) & 255) as f32;
        self.t = self.t.wrapping_add(1);
        (byte - 128.0) / 128.0
    }

    fn set_variable(&mut self, name: &str, value: f32) {
        if name == "x" {
            self.x = value.clamp(0.0, 1.0);
        }
    }

    fn midi(&mut self, message: [u8; 3]) {
        self.midi.push(message);
    }

    fn reset(&mut self) {
        self.t = 0;
    }
}

impl Drop for ScriptedEvaluator {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}
