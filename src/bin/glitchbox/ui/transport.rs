//! Transport bar widget - shows play state, sample rate, and audio stats

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use glitchbox::session::Snapshot;

/// Audio statistics for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioStats {
    pub peak: f32,
    pub rms: f32,
}

impl AudioStats {
    /// Compute stats from analyser time-domain bytes (128 is silence).
    pub fn from_bytes(buffer: &[u8]) -> Self {
        if buffer.is_empty() {
            return Self { peak: 0.0, rms: 0.0 };
        }
        let samples = buffer.iter().map(|&b| (f32::from(b) - 128.0) / 128.0);
        let peak = samples.clone().fold(0.0f32, |acc, x| acc.max(x.abs()));
        let rms = (samples.map(|x| x * x).sum::<f32>() / buffer.len() as f32).sqrt();
        Self { peak, rms }
    }
}

/// Render the transport bar
pub fn render_transport(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    audio_stats: &AudioStats,
    sample_rate: u32,
    midi_ports: usize,
    status: &str,
) {
    let block = Block::default().title(" glitchbox ").borders(Borders::ALL);

    let play_symbol = if snapshot.playing { "▶" } else { "■" };
    let play_state_str = if snapshot.playing { "Playing" } else { "Stopped" };

    let mut spans = vec![
        Span::styled(
            format!(" {} {}  ", play_symbol, play_state_str),
            Style::default().fg(if snapshot.playing {
                Color::Green
            } else {
                Color::Yellow
            }),
        ),
        Span::styled(
            format!("{:.1}kHz  ", sample_rate as f32 / 1000.0),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("MIDI: {}  ", midi_ports),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("Peak: {:.2}  RMS: {:.2}  ", audio_stats.peak, audio_stats.rms),
            Style::default().fg(Color::Magenta),
        ),
    ];
    if snapshot.saving {
        spans.push(Span::styled("Saving...  ", Style::default().fg(Color::Cyan)));
    } else if !status.is_empty() {
        spans.push(Span::styled(status.to_owned(), Style::default().fg(Color::White)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}
