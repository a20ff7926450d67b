//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::{
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use glitchbox::{
    evaluator::{CompileError, Engine, EngineError, Evaluator},
    session::persist::{PersistError, SlotStore},
};

/// Byte-valued program of the sample index, as a bytebeat engine would produce.
pub type Program = fn(u32) -> u8;

/// `t*(42&t>>10)`
pub fn forty_two(t: u32) -> u8 {
    t.wrapping_mul(42 & (t >> 10)) as u8
}

pub fn sawtooth(t: u32) -> u8 {
    t as u8
}

/// Engine whose evaluators accept any non-empty text with balanced
/// parentheses and play a fixed program.
#[derive(Debug, Default)]
pub struct FakeEngine {
    program: Option<Program>,
    alive: Arc<AtomicUsize>,
    created: AtomicUsize,
}

impl FakeEngine {
    pub fn new(program: Program) -> Self {
        Self {
            program: Some(program),
            ..Self::default()
        }
    }

    /// Handles currently not destroyed.
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Engine for FakeEngine {
    type Evaluator = FakeEvaluator;

    fn create(&self) -> Result<FakeEvaluator, EngineError> {
        self.alive.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEvaluator {
            program: self.program.unwrap_or(sawtooth),
            compiled: false,
            t: 0,
            alive: self.alive.clone(),
        })
    }
}

#[derive(Debug)]
pub struct FakeEvaluator {
    program: Program,
    compiled: bool,
    t: u32,
    alive: Arc<AtomicUsize>,
}

impl FakeEvaluator {
    pub fn time(&self) -> u32 {
        self.t
    }
}

impl Evaluator for FakeEvaluator {
    fn compile(&mut self, source: &str) -> Result<(), CompileError> {
        let mut depth = 0i32;
        for c in source.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                break;
            }
        }
        if source.trim().is_empty() || depth != 0 {
            return Err(CompileError::Syntax { status: 1 });
        }
        self.compiled = true;
        Ok(())
    }

    fn eval(&mut self) -> f32 {
        if !self.compiled {
            return 0.0;
        }
        let byte = (self.program)(self.t);
        self.t = self.t.wrapping_add(1);
        (f32::from(byte) - 128.0) / 128.0
    }

    fn set_variable(&mut self, _name: &str, _value: f32) {}

    fn reset(&mut self) {
        self.t = 0;
    }
}

impl Drop for FakeEvaluator {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Slot that refuses every write, for best-effort persistence checks.
#[derive(Debug, Default)]
pub struct ReadOnlySlot {
    pub value: Option<String>,
    pub attempts: Arc<Mutex<usize>>,
}

impl SlotStore for ReadOnlySlot {
    fn get(&self, _key: &str) -> Option<String> {
        self.value.clone()
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<(), PersistError> {
        *self.attempts.lock().unwrap() += 1;
        Err(PersistError::Write {
            path: PathBuf::from("read-only"),
            source: io::ErrorKind::PermissionDenied.into(),
        })
    }
}
