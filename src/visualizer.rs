//! Spectrum and waveform visualizer
//!
//! Geometry is computed in a screen-space coordinate system (origin top-left,
//! y grows downward) sized by the last [`Visualizer::resize`]. The ratatui
//! widget flips it onto a braille canvas.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Color,
    symbols::Marker,
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Rectangle},
        Block, Widget,
    },
};

use crate::analysis::VisualizerFrame;

/// Frequency bins summed into one bar.
pub const GROUP_SIZE: usize = 10;
const BAR_SCALE: f64 = 0.45;
const WAVE_SCALE: f64 = 0.45;
/// Braille cells hold 2x4 dots.
const DOTS_PER_CELL_X: f64 = 2.0;
const DOTS_PER_CELL_Y: f64 = 4.0;

/// One spectrum bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f64,
    pub width: f64,
    /// `height * 0.45 * sum(value / 256)` over the group
    pub magnitude: f64,
}

impl Bar {
    /// Top edge and height of the drawn rectangle, centered on the midline.
    pub fn extent(&self, height: f64) -> (f64, f64) {
        (height / 2.0 - self.magnitude / 20.0, self.magnitude / 10.0)
    }
}

/// One bar per complete group of [`GROUP_SIZE`] bins, spread across `width`.
pub fn spectrum_bars(frequency: &[u8], width: f64, height: f64) -> Vec<Bar> {
    if frequency.is_empty() {
        return Vec::new();
    }
    let slice = width / frequency.len() as f64;
    frequency
        .chunks_exact(GROUP_SIZE)
        .enumerate()
        .map(|(group, bins)| {
            let sum: f64 = bins.iter().map(|&v| v as f64 / 256.0).sum();
            Bar {
                x: (group * GROUP_SIZE) as f64 * slice,
                width: 5.0 * slice,
                magnitude: height * BAR_SCALE * sum,
            }
        })
        .collect()
}

/// One point per time-domain sample, spread across `width`.
pub fn waveform_points(time_domain: &[u8], width: f64, height: f64) -> Vec<(f64, f64)> {
    if time_domain.is_empty() {
        return Vec::new();
    }
    let slice = width / time_domain.len() as f64;
    time_domain
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let value = v as f64 / 256.0;
            (i as f64 * slice, 0.5 * height - WAVE_SCALE * height * (value - 0.5))
        })
        .collect()
}

/// Drawing surface dimensions, updated on every host resize.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Visualizer {
    width: f64,
    height: f64,
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record new dimensions. Returns whether they changed.
    pub fn resize(&mut self, width: f64, height: f64) -> bool {
        let changed = self.width != width || self.height != height;
        self.width = width;
        self.height = height;
        changed
    }

    /// Size the surface to a terminal area at braille resolution.
    pub fn resize_to(&mut self, area: Rect) -> bool {
        self.resize(
            area.width as f64 * DOTS_PER_CELL_X,
            area.height as f64 * DOTS_PER_CELL_Y,
        )
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn bars(&self, frame: &VisualizerFrame) -> Vec<Bar> {
        spectrum_bars(&frame.frequency, self.width, self.height)
    }

    pub fn waveform(&self, frame: &VisualizerFrame) -> Vec<(f64, f64)> {
        waveform_points(&frame.time_domain, self.width, self.height)
    }

    pub fn view<'a>(&self, frame: &'a VisualizerFrame) -> VisualizerView<'a> {
        VisualizerView {
            frame,
            visualizer: *self,
            block: None,
        }
    }
}

/// Widget drawing one frame: pink spectrum bars under a green waveform.
pub struct VisualizerView<'a> {
    frame: &'a VisualizerFrame,
    visualizer: Visualizer,
    block: Option<Block<'a>>,
}

impl<'a> VisualizerView<'a> {
    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for VisualizerView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (width, height) = self.visualizer.size();
        let bars = self.visualizer.bars(self.frame);
        let points = self.visualizer.waveform(self.frame);

        let mut canvas = Canvas::default()
            .marker(Marker::Braille)
            .x_bounds([0.0, width.max(1.0)])
            .y_bounds([0.0, height.max(1.0)])
            .paint(move |ctx| {
                for bar in &bars {
                    let (top, bar_height) = bar.extent(height);
                    ctx.draw(&Rectangle {
                        x: bar.x,
                        y: height - top - bar_height,
                        width: bar.width,
                        height: bar_height,
                        color: Color::LightMagenta,
                    });
                }
                ctx.layer();
                for pair in points.windows(2) {
                    let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
                    ctx.draw(&CanvasLine::new(x1, height - y1, x2, height - y2, Color::Green));
                }
            });
        if let Some(block) = self.block {
            canvas = canvas.block(block);
        }
        canvas.render(area, buf);
    }
}
