//! Expression editor: a small multi-line text buffer with a cursor.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Position, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Editor {
    text: String,
    /// Byte offset into `text`, always on a char boundary.
    cursor: usize,
}

impl Editor {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            cursor: text.len(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply a key press. Returns true if the text changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
        {
            return false;
        }
        match key.code {
            KeyCode::Char(c) => {
                self.text.insert(self.cursor, c);
                self.cursor += c.len_utf8();
                true
            }
            KeyCode::Enter => {
                self.text.insert(self.cursor, '\n');
                self.cursor += 1;
                true
            }
            KeyCode::Backspace => match self.prev_boundary() {
                Some(prev) => {
                    self.text.replace_range(prev..self.cursor, "");
                    self.cursor = prev;
                    true
                }
                None => false,
            },
            KeyCode::Delete => match self.next_boundary() {
                Some(next) => {
                    self.text.replace_range(self.cursor..next, "");
                    true
                }
                None => false,
            },
            KeyCode::Left => {
                if let Some(prev) = self.prev_boundary() {
                    self.cursor = prev;
                }
                false
            }
            KeyCode::Right => {
                if let Some(next) = self.next_boundary() {
                    self.cursor = next;
                }
                false
            }
            KeyCode::Home => {
                self.cursor = self.line_start();
                false
            }
            KeyCode::End => {
                self.cursor = self.text[self.cursor..]
                    .find('\n')
                    .map_or(self.text.len(), |i| self.cursor + i);
                false
            }
            _ => false,
        }
    }

    /// Cursor position as (column, row) in characters.
    pub fn cursor_position(&self) -> (u16, u16) {
        let before = &self.text[..self.cursor];
        let row = before.matches('\n').count();
        let col = before[self.line_start()..].chars().count();
        (col as u16, row as u16)
    }

    fn line_start(&self) -> usize {
        self.text[..self.cursor].rfind('\n').map_or(0, |i| i + 1)
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.text[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.text[self.cursor..]
            .chars()
            .next()
            .map(|c| self.cursor + c.len_utf8())
    }
}

pub fn render_editor(frame: &mut Frame, area: Rect, editor: &Editor, error: bool) {
    let mut title = vec![Span::raw(" Expression ")];
    if error {
        title.push(Span::styled(
            "Syntax error! ",
            Style::default().fg(Color::Red),
        ));
    }
    let block = Block::default()
        .title(Line::from(title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if error { Color::Red } else { Color::Reset }));
    let inner = block.inner(area);

    let paragraph = Paragraph::new(editor.text()).block(block);
    frame.render_widget(paragraph, area);

    let (col, row) = editor.cursor_position();
    if col < inner.width && row < inner.height {
        frame.set_cursor_position(Position::new(inner.x + col, inner.y + row));
    }
}
