//! Session controller
//!
//! The single authority over compile, play, stop, pointer and save intents.
//! A [`Session`] owns the live evaluator handle for its whole lifetime and
//! hands the real-time half of it ([`LivePlayback`]) to the audio output.
//! Failures never escape as errors: a rejected expression raises the error
//! flag, a failed save delivers an absent buffer.

pub mod persist;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

use rtrb::{Producer, RingBuffer};

use crate::{
    audio::{ControlMessage, LivePlayback, PointerState},
    evaluator::{Engine, EngineError, Evaluator},
    render::{RenderRequest, RenderWorker},
    wav::AudioContainer,
    DEFAULT_EXPRESSION,
};

pub use persist::Persistence;

const CONTROL_RING_CAPACITY: usize = 256;

/// Continuation fired exactly once per accepted save.
pub type SaveCallback = Box<dyn FnOnce(Option<AudioContainer>) + Send>;

/// Offline render parameters used for save requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub duration: Duration,
    pub sample_rate: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
            sample_rate: 48_000,
        }
    }
}

/// Read-only view of the session for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub expression_text: String,
    pub error: bool,
    pub playing: bool,
    pub saving: bool,
}

pub struct Session<E: Engine> {
    live: Arc<Mutex<E::Evaluator>>,
    controls: Producer<ControlMessage>,
    pointer: Arc<PointerState>,
    routed: Arc<AtomicBool>,
    worker: RenderWorker<E>,
    persistence: Persistence,
    render_settings: RenderSettings,

    expression_text: String,
    compiled_expression: Option<String>,
    error: bool,
    playing: bool,
    saving: bool,
    pending_save: Option<SaveCallback>,
}

impl<E: Engine> Session<E> {
    /// Create the session and its live evaluator handle.
    ///
    /// Returns the callback-side [`LivePlayback`] to be installed on an
    /// output stream. Nothing is compiled yet; see [`Session::restore`].
    ///
    /// If the engine runs at a fixed rate, saves use that rate instead of
    /// the configured one.
    pub fn new(
        engine: Arc<E>,
        persistence: Persistence,
        mut render_settings: RenderSettings,
    ) -> Result<(Self, LivePlayback<E::Evaluator>), EngineError> {
        if let Some(rate) = engine.sample_rate() {
            if rate != render_settings.sample_rate {
                tracing::warn!(
                    configured = render_settings.sample_rate,
                    engine = rate,
                    "saving at the engine sample rate"
                );
                render_settings.sample_rate = rate;
            }
        }

        let live = Arc::new(Mutex::new(engine.create()?));
        let (controls, controls_rx) = RingBuffer::new(CONTROL_RING_CAPACITY);
        let pointer = Arc::new(PointerState::default());
        let routed = Arc::new(AtomicBool::new(false));

        let playback = LivePlayback::new(live.clone(), controls_rx, pointer.clone(), routed.clone());
        let session = Self {
            live,
            controls,
            pointer,
            routed,
            worker: RenderWorker::new(engine),
            persistence,
            render_settings,
            expression_text: String::new(),
            compiled_expression: None,
            error: false,
            playing: false,
            saving: false,
            pending_save: None,
        };
        Ok((session, playback))
    }

    /// Compile the persisted expression: share link, then slot, then the
    /// built-in default. Returns the text that was compiled.
    pub fn restore(&mut self) -> String {
        let text = self
            .persistence
            .restore()
            .unwrap_or_else(|| DEFAULT_EXPRESSION.to_owned());
        self.compile(&text);
        text
    }

    /// Submit `text` to the live evaluator.
    ///
    /// On success the text becomes the compiled expression and is persisted.
    /// On failure only the error flag changes; a playing program keeps running.
    pub fn compile(&mut self, text: &str) {
        self.expression_text = text.to_owned();

        let result = self.lock_live().compile(text);
        match result {
            Ok(()) => {
                tracing::debug!(expression = text, "compiled");
                self.compiled_expression = Some(text.to_owned());
                self.error = false;
                self.persistence.store(text);
            }
            Err(err) => {
                tracing::debug!(%err, expression = text, "compile rejected");
                self.error = true;
            }
        }
    }

    /// Route the live evaluator to the output.
    ///
    /// Refused until some expression has compiled successfully.
    pub fn play(&mut self) {
        if self.playing {
            return;
        }
        if self.compiled_expression.is_none() {
            tracing::warn!("play requested before any successful compile");
            return;
        }
        self.routed.store(true, Ordering::Release);
        self.playing = true;
        tracing::info!("playback started");
    }

    /// Disconnect the live evaluator. Its internal time is kept.
    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        self.routed.store(false, Ordering::Release);
        self.playing = false;
        tracing::info!("playback stopped");
    }

    pub fn toggle(&mut self) {
        if self.playing {
            self.stop();
        } else {
            self.play();
        }
    }

    /// Rewind the live evaluator's internal time.
    pub fn reset(&mut self) {
        self.lock_live().reset();
        tracing::info!("evaluator reset");
    }

    /// Forward normalized pointer coordinates as the `x` and `y` variables.
    ///
    /// Last write wins: the audio side applies the newest position at the
    /// start of its next block.
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer.store(x, y);
    }

    /// Queue a MIDI message for the live evaluator.
    ///
    /// Returns `false` if the message was dropped because the audio side is
    /// not draining.
    pub fn midi(&mut self, message: [u8; 3]) -> bool {
        let queued = self.controls.push(ControlMessage::Midi(message)).is_ok();
        if !queued {
            tracing::debug!(?message, "midi message dropped, control ring full");
        }
        queued
    }

    /// Render the current expression text offline.
    ///
    /// Returns `false` and drops the request while another save is in
    /// flight. Otherwise `on_complete` runs exactly once, from
    /// [`Session::poll_render`], with the finished buffer or `None`.
    pub fn save(&mut self, on_complete: impl FnOnce(Option<AudioContainer>) + Send + 'static) -> bool {
        if self.saving {
            tracing::debug!("save ignored, render already in flight");
            return false;
        }

        let request = RenderRequest::new(
            self.expression_text.clone(),
            self.render_settings.duration,
            self.render_settings.sample_rate,
        );
        tracing::info!(
            duration = ?request.duration,
            sample_rate = request.sample_rate,
            "offline render requested"
        );

        if let Err(failure) = self.worker.submit(request) {
            tracing::warn!(%failure, "offline render could not start");
            on_complete(None);
            return true;
        }

        self.saving = true;
        self.pending_save = Some(Box::new(on_complete));
        true
    }

    /// Deliver a finished render, if any. Call once per UI tick.
    ///
    /// Returns `true` when a save completed during this call.
    pub fn poll_render(&mut self) -> bool {
        if !self.saving {
            return false;
        }
        let Some(response) = self.worker.try_recv() else {
            return false;
        };

        self.saving = false;
        let container = response.into_container();
        tracing::info!(ok = container.is_some(), "offline render finished");
        if let Some(on_complete) = self.pending_save.take() {
            on_complete(container);
        }
        true
    }

    /// Poll until the in-flight save completes or `timeout` elapses.
    pub fn wait_for_render(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.saving {
            if self.poll_render() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            expression_text: self.expression_text.clone(),
            error: self.error,
            playing: self.playing,
            saving: self.saving,
        }
    }

    pub fn expression_text(&self) -> &str {
        &self.expression_text
    }

    pub fn compiled_expression(&self) -> Option<&str> {
        self.compiled_expression.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn render_settings(&self) -> RenderSettings {
        self.render_settings
    }

    /// Stop playback and release the live handle and render thread.
    ///
    /// The handle itself is destroyed once the output stream holding the
    /// matching [`LivePlayback`] is dropped as well.
    pub fn teardown(mut self) {
        self.stop();
        if self.saving {
            tracing::info!("tearing down with a render in flight, result discarded");
        }
    }

    fn lock_live(&self) -> MutexGuard<'_, E::Evaluator> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::testing::ScriptedEngine;
    use std::sync::mpsc;

    fn session() -> (Session<ScriptedEngine>, LivePlayback<<ScriptedEngine as Engine>::Evaluator>) {
        Session::new(
            Arc::new(ScriptedEngine::default()),
            Persistence::in_memory(),
            RenderSettings {
                duration: Duration::from_millis(50),
                sample_rate: 8000,
            },
        )
        .unwrap()
    }

    #[test]
    fn successful_compile_updates_state_and_persistence() {
        let (mut session, _playback) = session();
        session.compile("t*2");

        assert_eq!(session.compiled_expression(), Some("t*2"));
        assert!(!session.has_error());
        assert_eq!(session.persistence().stored().as_deref(), Some("t*2"));
        assert_eq!(session.persistence().link(), "#t*2");
    }

    #[test]
    fn failed_compile_keeps_previous_program() {
        let (mut session, _playback) = session();
        session.compile("t*2");
        session.compile("t*(2");

        assert!(session.has_error());
        assert_eq!(session.expression_text(), "t*(2");
        assert_eq!(session.compiled_expression(), Some("t*2"));
        assert_eq!(session.persistence().stored().as_deref(), Some("t*2"));
    }

    #[test]
    fn restore_uses_default_when_nothing_persisted() {
        let (mut session, _playback) = session();
        assert_eq!(session.restore(), DEFAULT_EXPRESSION);
        assert_eq!(session.compiled_expression(), Some(DEFAULT_EXPRESSION));
    }

    #[test]
    fn play_requires_a_compiled_program() {
        let (mut session, playback) = session();
        session.play();
        assert!(!session.is_playing());
        assert!(!playback.is_routed());

        session.compile("t");
        session.play();
        assert!(session.is_playing());
        assert!(playback.is_routed());
    }

    #[test]
    fn stop_keeps_evaluator_time() {
        let (mut session, mut playback) = session();
        session.compile("t");
        session.play();

        let mut first = [0.0f32; 4];
        playback.process(&mut first, 1);
        session.stop();
        session.play();
        let mut second = [0.0f32; 1];
        playback.process(&mut second, 1);

        assert_eq!(second[0], (4.0 - 128.0) / 128.0);
    }

    #[test]
    fn reset_rewinds_evaluator_time() {
        let (mut session, mut playback) = session();
        session.compile("t");
        session.play();

        let mut block = [0.0f32; 4];
        playback.process(&mut block, 1);
        session.reset();
        playback.process(&mut block, 1);

        assert_eq!(block[0], -1.0);
    }

    #[test]
    fn latest_pointer_position_reaches_the_evaluator() {
        let (mut session, mut playback) = session();
        session.compile("t");
        session.play();

        for _ in 0..39 {
            session.set_pointer(0.0, 0.0);
        }
        session.set_pointer(1.0, 0.0);

        let mut block = [0.0f32; 2];
        playback.process(&mut block, 1);
        assert_eq!(block[1], (4.0 - 128.0) / 128.0);
    }

    #[test]
    fn midi_reaches_the_live_evaluator() {
        let (mut session, mut playback) = session();
        session.compile("t");
        assert!(session.midi([0x90, 69, 64]));

        playback.process(&mut [0.0f32; 1], 1);
        assert_eq!(session.live.lock().unwrap().midi, vec![[0x90, 69, 64]]);
    }

    #[test]
    fn midi_is_queued_until_the_ring_is_full() {
        let (mut session, _playback) = session();
        for _ in 0..CONTROL_RING_CAPACITY {
            assert!(session.midi([0x90, 60, 100]));
        }
        assert!(!session.midi([0x80, 60, 0]));
    }

    #[test]
    fn saves_follow_a_fixed_engine_rate() {
        let (mut session, _playback) = Session::new(
            Arc::new(ScriptedEngine::at_rate(44_100)),
            Persistence::in_memory(),
            RenderSettings {
                duration: Duration::from_millis(10),
                sample_rate: 48_000,
            },
        )
        .unwrap();
        assert_eq!(session.render_settings().sample_rate, 44_100);

        session.compile("t");
        let (tx, rx) = mpsc::channel();
        assert!(session.save(move |buf| {
            tx.send(buf.map(|b| (b.sample_rate(), b.sample_count()))).unwrap()
        }));
        assert!(session.wait_for_render(Duration::from_secs(5)));
        assert_eq!(rx.try_recv().unwrap(), Some((44_100, 441)));
    }

    #[test]
    fn second_save_is_dropped_while_first_is_in_flight() {
        let (mut session, _playback) = session();
        session.compile("t");
        let (tx, rx) = mpsc::channel();

        let first = tx.clone();
        assert!(session.save(move |buf| first.send(buf.map(|b| b.sample_count())).unwrap()));
        assert!(session.is_saving());
        let second = tx.clone();
        assert!(!session.save(move |buf| second.send(buf.map(|b| b.sample_count())).unwrap()));

        assert!(session.wait_for_render(Duration::from_secs(5)));
        assert!(!session.is_saving());
        assert_eq!(rx.try_recv().unwrap(), Some(400));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn save_of_invalid_text_reports_absent_buffer() {
        let (mut session, _playback) = session();
        session.compile("t");
        session.compile("((");
        let (tx, rx) = mpsc::channel();

        assert!(session.save(move |buf| tx.send(buf.is_none()).unwrap()));
        assert!(session.wait_for_render(Duration::from_secs(5)));
        assert!(rx.try_recv().unwrap());
    }
}
