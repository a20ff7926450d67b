//! libglitch adapter
//!
//! Binds the C ABI exported by the glitch expression engine. The library keeps
//! its sample rate and lookup tables in process-global state, so it is
//! initialized once per process; every later [`GlitchEngine`] reuses that
//! first sample rate.
//!
//! `glitch_reset` is only present in some libglitch builds; enable the
//! `glitch-reset` feature when linking one that exports it.

use std::{
    ffi::{c_char, c_float, c_int, c_uchar, c_ulonglong, CString},
    ptr::NonNull,
    sync::OnceLock,
};

use super::{CompileError, Engine, EngineError, Evaluator};

#[repr(C)]
struct RawGlitch {
    _private: [u8; 0],
}

#[link(name = "glitch")]
extern "C" {
    fn glitch_init(sample_rate: c_int, seed: c_ulonglong);
    fn glitch_create() -> *mut RawGlitch;
    fn glitch_destroy(g: *mut RawGlitch);
    fn glitch_compile(g: *mut RawGlitch, s: *const c_char, len: usize) -> c_int;
    #[cfg(feature = "glitch-reset")]
    fn glitch_reset(g: *mut RawGlitch);
    fn glitch_set(g: *mut RawGlitch, name: *const c_char, value: c_float);
    fn glitch_midi(g: *mut RawGlitch, cmd: c_uchar, a: c_uchar, b: c_uchar);
    fn glitch_fill(g: *mut RawGlitch, buf: *mut c_float, frames: usize, channels: usize);
}

static INIT_RATE: OnceLock<u32> = OnceLock::new();

/// Engine backed by the linked libglitch.
#[derive(Debug)]
pub struct GlitchEngine {
    sample_rate: u32,
}

impl GlitchEngine {
    pub fn new(sample_rate: u32, seed: u64) -> Self {
        let rate = *INIT_RATE.get_or_init(|| {
            // SAFETY: plain value arguments; runs once before any handle exists.
            unsafe { glitch_init(sample_rate as c_int, seed) };
            sample_rate
        });
        if rate != sample_rate {
            tracing::warn!(
                requested = sample_rate,
                active = rate,
                "libglitch already initialized at a different sample rate"
            );
        }
        Self { sample_rate: rate }
    }
}

impl Engine for GlitchEngine {
    type Evaluator = GlitchEvaluator;

    fn create(&self) -> Result<GlitchEvaluator, EngineError> {
        // SAFETY: glitch_create has no preconditions beyond glitch_init.
        let raw = unsafe { glitch_create() };
        NonNull::new(raw)
            .map(|handle| GlitchEvaluator { handle })
            .ok_or(EngineError::CreateFailed)
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }
}

/// Owned libglitch handle. Destroyed on drop.
pub struct GlitchEvaluator {
    handle: NonNull<RawGlitch>,
}

// SAFETY: a handle is only ever touched by one thread at a time; the session
// guards the live one with a mutex and render handles never leave their thread.
unsafe impl Send for GlitchEvaluator {}

impl Evaluator for GlitchEvaluator {
    fn compile(&mut self, source: &str) -> Result<(), CompileError> {
        let text = CString::new(source).map_err(|_| CompileError::InteriorNul)?;
        // SAFETY: handle is live; text outlives the call.
        let status =
            unsafe { glitch_compile(self.handle.as_ptr(), text.as_ptr(), source.len()) };
        if status == 0 {
            Ok(())
        } else {
            Err(CompileError::Syntax { status })
        }
    }

    fn eval(&mut self) -> f32 {
        let mut sample: c_float = 0.0;
        // SAFETY: one frame, one channel, into a single stack float.
        unsafe { glitch_fill(self.handle.as_ptr(), &mut sample, 1, 1) };
        sample
    }

    fn set_variable(&mut self, name: &str, value: f32) {
        let Ok(name) = CString::new(name) else {
            return;
        };
        // SAFETY: handle is live; name outlives the call.
        unsafe { glitch_set(self.handle.as_ptr(), name.as_ptr(), value) };
    }

    fn midi(&mut self, [cmd, a, b]: [u8; 3]) {
        // SAFETY: handle is live; plain value arguments.
        unsafe { glitch_midi(self.handle.as_ptr(), cmd, a, b) };
    }

    #[cfg(feature = "glitch-reset")]
    fn reset(&mut self) {
        // SAFETY: handle is live.
        unsafe { glitch_reset(self.handle.as_ptr()) };
    }
}

impl Drop for GlitchEvaluator {
    fn drop(&mut self) {
        // SAFETY: handle came from glitch_create and is destroyed exactly once.
        unsafe { glitch_destroy(self.handle.as_ptr()) };
    }
}
