//! TUI layout for the live editor
//!
//! Transport on top, the expression editor, the visualizer, and a help bar.

pub mod editor;
pub mod transport;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use glitchbox::{analysis::VisualizerFrame, session::Snapshot, visualizer::Visualizer};

use editor::{render_editor, Editor};
use transport::{render_transport, AudioStats};

/// Everything one frame of the UI needs.
pub struct View<'a> {
    pub snapshot: Snapshot,
    pub editor: &'a Editor,
    pub visualizer: &'a mut Visualizer,
    pub frame: &'a VisualizerFrame,
    pub stats: AudioStats,
    pub sample_rate: u32,
    pub midi_ports: usize,
    pub link: String,
    pub status: &'a str,
}

pub fn draw(frame: &mut Frame, view: View<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Transport bar
            Constraint::Min(5),    // Editor
            Constraint::Min(10),   // Visualizer
            Constraint::Length(1), // Help bar
        ])
        .split(frame.area());

    render_transport(
        frame,
        chunks[0],
        &view.snapshot,
        &view.stats,
        view.sample_rate,
        view.midi_ports,
        view.status,
    );

    render_editor(frame, chunks[1], view.editor, view.snapshot.error);

    let block = Block::default()
        .title(format!(" {} ", view.link))
        .borders(Borders::ALL);
    view.visualizer.resize_to(block.inner(chunks[2]));
    frame.render_widget(view.visualizer.view(view.frame).block(block), chunks[2]);

    let help = Paragraph::new(
        " [Esc] Quit  [Ctrl+P/F5] Play/Stop  [Ctrl+S] Save  [Ctrl+R] Reset  [Mouse] x/y",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[3]);
}
