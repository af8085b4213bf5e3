use crate::common::Result;
use crate::core::detector::FaceBox;
use crate::core::operator::{Operator, OperatorKey, Overlay, OverlayKind};
use image::DynamicImage;
use std::io::{self, Write};
use std::time::Duration;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{self, ClearType},
    cursor,
};

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(8),
            height: height.unwrap_or((term_height.saturating_sub(5) / 2).min(DEFAULT_HEIGHT / 2)).max(4),
        }
    }

    pub fn render(&self, image: &DynamicImage, overlays: &[Overlay]) -> String {
        let mut grid = self.image_to_ascii(image);
        let img_width = image.width().max(1) as f32;
        let img_height = image.height().max(1) as f32;

        for overlay in overlays {
            self.draw_face_box(&mut grid, &overlay.face, img_width, img_height, &overlay.kind);

            if let Some(label) = &overlay.label {
                let x1 = ((overlay.face.x1 / img_width) * self.width as f32) as usize;
                let x2 = ((overlay.face.x2 / img_width) * self.width as f32) as usize;
                let y1 = ((overlay.face.y1 / img_height) * self.height as f32) as usize;
                self.overlay_text(&mut grid, label, (x1 + x2) / 2, y1.saturating_sub(1));
            }
        }

        self.grid_to_string(&grid)
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();

        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ramp[brightness * (ramp.len() - 1) / 255];
                }
            }
        }

        grid
    }

    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, center_x: usize, y: usize) {
        if y >= self.height {
            return;
        }

        let start_x = center_x.saturating_sub(text.chars().count() / 2);
        for (i, ch) in text.chars().enumerate() {
            let x = start_x + i;
            if x < self.width {
                grid[y][x] = ch;
            }
        }
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceBox, img_width: f32, img_height: f32, kind: &OverlayKind) {
        let scale = |v: f32, img: f32, cells: usize| (((v / img) * cells as f32).max(0.0) as usize).min(cells - 1);
        let x1 = scale(face.x1, img_width, self.width);
        let x2 = scale(face.x2, img_width, self.width);
        let y1 = scale(face.y1, img_height, self.height);
        let y2 = scale(face.y2, img_height, self.height);
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        let (horizontal, vertical) = match kind {
            OverlayKind::Unknown => ('?', '?'),
            _ => ('─', '│'),
        };

        for x in x1..=x2 {
            grid[y1][x] = horizontal;
            grid[y2][x] = horizontal;
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = vertical;
            row[x2] = vertical;
        }
        if !matches!(kind, OverlayKind::Unknown) {
            grid[y1][x1] = '┌';
            grid[y1][x2] = '┐';
            grid[y2][x1] = '└';
            grid[y2][x2] = '┘';
        }
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

/// Terminal operator: raw-mode key polling plus an optional ASCII preview.
/// Raw mode is left when the value is dropped.
pub struct TerminalOperator {
    renderer: Option<AsciiRenderer>,
}

impl TerminalOperator {
    pub fn new(preview: bool, width: Option<usize>, height: Option<usize>) -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self {
            renderer: preview.then(|| AsciiRenderer::new(width, height)),
        })
    }
}

impl Drop for TerminalOperator {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!("Failed to restore terminal: {}", e);
        }
        println!();
    }
}

impl Operator for TerminalOperator {
    fn poll_key(&mut self) -> Result<OperatorKey> {
        if event::poll(Duration::from_millis(0))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind == KeyEventKind::Release {
                    return Ok(OperatorKey::None);
                }
                return Ok(match code {
                    KeyCode::Char(' ') => OperatorKey::Capture,
                    KeyCode::Esc | KeyCode::Char('q') => OperatorKey::Quit,
                    _ => OperatorKey::None,
                });
            }
        }
        Ok(OperatorKey::None)
    }

    fn show(&mut self, frame: &DynamicImage, overlays: &[Overlay], status: &str) -> Result<()> {
        let mut stdout = io::stdout();
        match &self.renderer {
            Some(renderer) => {
                let art = renderer.render(frame, overlays);
                crossterm::execute!(stdout, cursor::MoveTo(0, 0))?;
                write!(stdout, "{}\r\n{}\r\n", art, status)?;
            }
            None => {
                crossterm::execute!(stdout, cursor::MoveToColumn(0), terminal::Clear(ClearType::CurrentLine))?;
                write!(stdout, "{}", status)?;
            }
        }
        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn renders_requested_size_with_label() {
        let renderer = AsciiRenderer::new(Some(20), Some(10));
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([255])));
        let overlay = Overlay {
            face: FaceBox { x1: 20.0, y1: 30.0, x2: 80.0, y2: 90.0, confidence: 0.9 },
            label: Some("Ann".into()),
            kind: OverlayKind::Recognized,
        };

        let out = renderer.render(&img, &[overlay]);
        let lines: Vec<&str> = out.split("\r\n").collect();
        assert_eq!(lines.len(), 10);
        assert!(lines.iter().all(|l| l.chars().count() == 20));
        assert!(lines[2].contains("Ann"));
        assert!(lines[3].contains('┌'));
    }

    #[test]
    fn dark_frame_renders_blank() {
        let renderer = AsciiRenderer::new(Some(10), Some(5));
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 50, Luma([0])));
        let out = renderer.render(&img, &[]);
        assert!(out.split("\r\n").all(|l| l.trim().is_empty()));
    }
}
