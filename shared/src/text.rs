//! Text shaping for overlays.
//!
//! Platform builds plug in a rasterizer backed by the system font stack. The
//! built-in [`BoxGlyphRasterizer`] draws every glyph as a solid cell, which
//! keeps layout deterministic for headless rendering and tests.

use image::{GrayImage, Luma};

use crate::model::{FontDescriptor, FontWeight};

/// Size of a laid-out text block in logical points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMetrics {
    pub width: f32,
    pub height: f32,
}

pub trait GlyphRasterizer: Send + Sync {
    fn measure(&self, text: &str, font: &FontDescriptor, size: f32) -> TextMetrics;

    /// Draws coverage for `text` into `mask`. `origin` is the pixel position
    /// of the block's top-left corner and may lie outside the mask; anything
    /// outside is clipped.
    fn draw(
        &self,
        text: &str,
        font: &FontDescriptor,
        size: f32,
        scale: f32,
        origin: (f32, f32),
        mask: &mut GrayImage,
    );
}

/// Monospaced box-glyph layout.
///
/// Each line is `LINE_HEIGHT * size` tall and each character advances
/// `ADVANCE * size`. Whitespace advances without drawing.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxGlyphRasterizer;

impl BoxGlyphRasterizer {
    pub const ADVANCE: f32 = 0.6;
    pub const LINE_HEIGHT: f32 = 1.2;
    // Glyph box spans [GLYPH_TOP, GLYPH_TOP + 1.0] * size within its line.
    const GLYPH_TOP: f32 = 0.1;

    fn inset(weight: FontWeight) -> f32 {
        match weight {
            FontWeight::Bold => 0.05,
            FontWeight::Regular => 0.15,
        }
    }
}

impl GlyphRasterizer for BoxGlyphRasterizer {
    fn measure(&self, text: &str, _font: &FontDescriptor, size: f32) -> TextMetrics {
        let lines = text.split('\n');
        let (count, widest) = lines.fold((0usize, 0usize), |(count, widest), line| {
            (count + 1, widest.max(line.chars().count()))
        });
        TextMetrics {
            width: widest as f32 * Self::ADVANCE * size,
            height: count as f32 * Self::LINE_HEIGHT * size,
        }
    }

    fn draw(
        &self,
        text: &str,
        font: &FontDescriptor,
        size: f32,
        scale: f32,
        origin: (f32, f32),
        mask: &mut GrayImage,
    ) {
        let (mask_w, mask_h) = mask.dimensions();
        let advance = Self::ADVANCE * size * scale;
        let line_height = Self::LINE_HEIGHT * size * scale;
        let inset = Self::inset(font.weight) * advance;
        let clamp_x = |v: f32| v.round().clamp(0.0, mask_w as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, mask_h as f32) as u32;

        for (row, line) in text.split('\n').enumerate() {
            let top = origin.1 + row as f32 * line_height + Self::GLYPH_TOP * size * scale;
            let bottom = top + size * scale;
            let (y0, y1) = (clamp_y(top), clamp_y(bottom));
            if y0 >= y1 {
                continue;
            }

            for (col, ch) in line.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let left = origin.0 + col as f32 * advance + inset;
                let right = origin.0 + (col + 1) as f32 * advance - inset;
                let (x0, x1) = (clamp_x(left), clamp_x(right));
                for y in y0..y1 {
                    for x in x0..x1 {
                        mask.put_pixel(x, y, Luma([255]));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_bounds(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in mask.enumerate_pixels() {
            if p[0] > 0 {
                let b = bounds.get_or_insert((x, y, x, y));
                b.0 = b.0.min(x);
                b.1 = b.1.min(y);
                b.2 = b.2.max(x);
                b.3 = b.3.max(y);
            }
        }
        bounds
    }

    #[test]
    fn measure_is_proportional_to_size() {
        let font = FontDescriptor::body();
        let m = BoxGlyphRasterizer.measure("Hello", &font, 20.0);
        assert!((m.width - 60.0).abs() < 1e-4);
        assert!((m.height - 24.0).abs() < 1e-4);

        let two_lines = BoxGlyphRasterizer.measure("ab\nabcd", &font, 10.0);
        assert!((two_lines.width - 24.0).abs() < 1e-4);
        assert!((two_lines.height - 24.0).abs() < 1e-4);
    }

    #[test]
    fn draw_stays_inside_measured_block() {
        let font = FontDescriptor::title();
        let mut mask = GrayImage::new(100, 100);
        BoxGlyphRasterizer.draw("Hi", &font, 20.0, 1.0, (10.0, 10.0), &mut mask);

        let (x0, y0, x1, y1) = covered_bounds(&mask).unwrap();
        let m = BoxGlyphRasterizer.measure("Hi", &font, 20.0);
        assert!(x0 >= 10 && y0 >= 10);
        assert!(x1 as f32 <= 10.0 + m.width && y1 as f32 <= 10.0 + m.height);
    }

    #[test]
    fn bold_covers_more_than_regular() {
        let count = |font: FontDescriptor| {
            let mut mask = GrayImage::new(80, 40);
            BoxGlyphRasterizer.draw("WW", &font, 20.0, 1.0, (0.0, 0.0), &mut mask);
            mask.pixels().filter(|p| p[0] > 0).count()
        };
        assert!(count(FontDescriptor::title()) > count(FontDescriptor::body()));
    }

    #[test]
    fn whitespace_draws_nothing() {
        let mut mask = GrayImage::new(50, 50);
        BoxGlyphRasterizer.draw("  \n ", &FontDescriptor::body(), 12.0, 1.0, (0.0, 0.0), &mut mask);
        assert!(covered_bounds(&mask).is_none());
    }

    #[test]
    fn origin_outside_mask_is_clipped() {
        let mut mask = GrayImage::new(20, 20);
        BoxGlyphRasterizer.draw("XXXX", &FontDescriptor::body(), 30.0, 1.0, (-40.0, -5.0), &mut mask);
        assert!(covered_bounds(&mask).is_some());

        let mut far = GrayImage::new(20, 20);
        BoxGlyphRasterizer.draw("X", &FontDescriptor::body(), 30.0, 1.0, (500.0, 500.0), &mut far);
        assert!(covered_bounds(&far).is_none());
    }
}
