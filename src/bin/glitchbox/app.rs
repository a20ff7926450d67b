//! Live editor application: owns the session and drives the UI loop.

use std::{
    path::PathBuf,
    sync::mpsc::{self, Receiver, Sender},
    time::Duration,
};

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};
use ratatui::{layout::Rect, DefaultTerminal, Frame};
use rtrb::Consumer;

use glitchbox::{
    analysis::Analyser, config::Config, evaluator::Engine, session::Session,
    visualizer::Visualizer,
};

use crate::{
    midi::MidiInputs,
    ui::{self, editor::Editor, transport::AudioStats},
};

/// Outcome of a save, reported back from the render worker's callback.
enum SaveNotice {
    Written { path: PathBuf, bytes: usize },
    WriteFailed { path: PathBuf, error: String },
    RenderFailed,
}

pub struct App<E: Engine> {
    session: Session<E>,
    tap: Consumer<f32>,
    analyser: Analyser,
    visualizer: Visualizer,
    editor: Editor,
    sample_rate: u32,
    save_path: PathBuf,
    notices: (Sender<SaveNotice>, Receiver<SaveNotice>),
    midi: Receiver<[u8; 3]>,
    midi_ports: usize,
    _midi_inputs: MidiInputs,
    status: String,
    screen: Rect,
    should_quit: bool,
}

impl<E: Engine> App<E> {
    pub fn new(session: Session<E>, tap: Consumer<f32>, config: &Config, sample_rate: u32) -> Self {
        let editor = Editor::new(session.expression_text());
        let (midi_tx, midi) = mpsc::channel();
        let midi_inputs = MidiInputs::connect_all(midi_tx);
        Self {
            session,
            tap,
            analyser: Analyser::new(config.visualizer.fft_size),
            visualizer: Visualizer::new(),
            editor,
            sample_rate,
            save_path: config.render.output_path(),
            notices: mpsc::channel(),
            midi,
            midi_ports: midi_inputs.port_count(),
            _midi_inputs: midi_inputs,
            status: String::new(),
            screen: Rect::default(),
            should_quit: false,
        }
    }

    /// Run the event loop until quit. Returns the share link for the
    /// expression that was last compiled.
    pub fn run(mut self, terminal: &mut DefaultTerminal) -> EyreResult<String> {
        while !self.should_quit {
            self.analyser.drain(&mut self.tap);
            self.analyser.update();
            self.session.poll_render();
            self.poll_notices();
            while let Ok(message) = self.midi.try_recv() {
                self.session.midi(message);
            }

            terminal.draw(|frame| self.render(frame))?;

            if event::poll(Duration::from_millis(16))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(width, height) => {
                        self.screen = Rect::new(0, 0, width, height);
                    }
                    _ => {}
                }
            }
        }

        let link = self.session.persistence().link();
        self.session.teardown();
        Ok(link)
    }

    fn poll_notices(&mut self) {
        while let Ok(notice) = self.notices.1.try_recv() {
            self.status = match notice {
                SaveNotice::Written { path, bytes } => {
                    format!("Saved {} ({bytes} bytes)", path.display())
                }
                SaveNotice::WriteFailed { path, error } => {
                    format!("Could not write {}: {error}", path.display())
                }
                SaveNotice::RenderFailed => "Render failed".to_owned(),
            };
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('q') if ctrl => self.should_quit = true,
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('p') if ctrl => self.session.toggle(),
            KeyCode::F(5) => self.session.toggle(),
            KeyCode::Char('s') if ctrl => self.save(),
            KeyCode::Char('r') if ctrl => self.session.reset(),
            _ => {
                if self.editor.handle_key(key) {
                    let text = self.editor.text().to_owned();
                    self.session.compile(&text);
                }
            }
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                let width = f32::from(self.screen.width.max(1));
                let height = f32::from(self.screen.height.max(1));
                self.session
                    .set_pointer(f32::from(mouse.column) / width, f32::from(mouse.row) / height);
            }
            _ => {}
        }
    }

    fn save(&mut self) {
        let path = self.save_path.clone();
        let notices = self.notices.0.clone();
        let accepted = self.session.save(move |container| {
            let notice = match container {
                Some(container) => match container.write_to(&path) {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), bytes = container.len(), "saved render");
                        SaveNotice::Written {
                            bytes: container.len(),
                            path,
                        }
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), %err, "failed to write render");
                        SaveNotice::WriteFailed {
                            error: err.to_string(),
                            path,
                        }
                    }
                },
                None => SaveNotice::RenderFailed,
            };
            let _ = notices.send(notice);
        });
        if accepted {
            self.status = "Rendering...".to_owned();
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        self.screen = frame.area();
        let stats = AudioStats::from_bytes(&self.analyser.frame().time_domain);
        ui::draw(
            frame,
            ui::View {
                snapshot: self.session.snapshot(),
                editor: &self.editor,
                visualizer: &mut self.visualizer,
                frame: self.analyser.frame(),
                stats,
                sample_rate: self.sample_rate,
                midi_ports: self.midi_ports,
                link: self.session.persistence().link(),
                status: &self.status,
            },
        );
    }
}
