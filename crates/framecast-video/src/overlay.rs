//! Text overlays rasterised onto raw RGB frames.

use std::path::Path;

use fontdue::{Font, FontSettings};
use tracing::trace;

use crate::frame::RawFrame;
use crate::{VideoError, VideoResult};

/// Where on the frame an overlay is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPosition {
    LeftTop,
    LeftBottom,
    RightTop,
    RightBottom,
    Center,
}

/// Distance kept from the frame edges.
const MARGIN: i32 = 50;
/// Anchor box reserved in each corner.
const ANCHOR_BOX_WIDTH: i32 = 300;
const ANCHOR_BOX_HEIGHT: i32 = 100;
/// Baseline-to-baseline distance for multi-line content.
const LINE_HEIGHT: i32 = 20;
/// Rasterised glyph size in pixels.
const GLYPH_SIZE_PX: f32 = 20.0;

/// Rasterises strings onto the scene plane of raw frames. Glyph coverage
/// is blitted as solid white; the background is left untouched.
pub struct OverlayRenderer {
    font: Font,
}

impl OverlayRenderer {
    /// Load the TrueType font used for all overlays.
    pub fn new(font_path: &Path) -> VideoResult<Self> {
        let data = std::fs::read(font_path)?;
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|err| VideoError::FontParse(err.to_string()))?;
        Ok(Self { font })
    }

    /// Draw `content` at `position`, in place. Newlines start a new line
    /// one `LINE_HEIGHT` down from the previous baseline. Pixels falling
    /// outside the frame are clipped.
    pub fn draw(&self, frame: &mut RawFrame, position: OverlayPosition, content: &str) {
        let width = frame.width() as i32;
        let height = frame.height() as i32;
        let (origin_x, origin_y) = pen_origin(position, width, height);
        let mut pen_x = origin_x;
        let mut pen_y = origin_y;
        let surface = frame.scene_mut();

        for ch in content.chars() {
            if ch == '\n' {
                pen_x = origin_x;
                pen_y += LINE_HEIGHT;
                continue;
            }

            let (metrics, coverage) = self.font.rasterize(ch, GLYPH_SIZE_PX);
            if metrics.width == 0 || metrics.height == 0 {
                pen_x += metrics.advance_width.round() as i32;
                continue;
            }
            trace!(glyph = %ch, width = metrics.width, height = metrics.height, "Rasterised glyph");

            let left = pen_x + metrics.xmin;
            let top = pen_y - metrics.height as i32 - metrics.ymin;
            for row in 0..metrics.height as i32 {
                for col in 0..metrics.width as i32 {
                    let x = left + col;
                    let y = top + row;
                    if x < 0 || y < 0 || x >= width || y >= height {
                        continue;
                    }
                    if coverage[row as usize * metrics.width + col as usize] != 0 {
                        let offset = ((y * width + x) * 3) as usize;
                        surface[offset] = 255;
                        surface[offset + 1] = 255;
                        surface[offset + 2] = 255;
                    }
                }
            }

            pen_x += metrics.advance_width.round() as i32;
        }
    }
}

/// Baseline origin of the first line for each anchor.
fn pen_origin(position: OverlayPosition, width: i32, height: i32) -> (i32, i32) {
    match position {
        OverlayPosition::LeftTop => (MARGIN, MARGIN),
        OverlayPosition::LeftBottom => (MARGIN, height - ANCHOR_BOX_HEIGHT + MARGIN),
        OverlayPosition::RightTop => (width - ANCHOR_BOX_WIDTH + MARGIN, MARGIN),
        OverlayPosition::RightBottom => (
            width - ANCHOR_BOX_WIDTH + MARGIN,
            height - ANCHOR_BOX_HEIGHT + MARGIN,
        ),
        OverlayPosition::Center => (width / 2 - ANCHOR_BOX_WIDTH, height / 2 - ANCHOR_BOX_HEIGHT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_anchors_keep_the_margin() {
        assert_eq!(pen_origin(OverlayPosition::LeftTop, 1280, 720), (50, 50));
        assert_eq!(
            pen_origin(OverlayPosition::LeftBottom, 1280, 720),
            (50, 720 - 100 + 50)
        );
        assert_eq!(
            pen_origin(OverlayPosition::RightTop, 1280, 720),
            (1280 - 300 + 50, 50)
        );
        assert_eq!(
            pen_origin(OverlayPosition::RightBottom, 1280, 720),
            (1280 - 300 + 50, 720 - 100 + 50)
        );
    }

    #[test]
    fn center_anchor_backs_off_a_full_box() {
        assert_eq!(
            pen_origin(OverlayPosition::Center, 1280, 720),
            (640 - 300, 360 - 100)
        );
    }
}
