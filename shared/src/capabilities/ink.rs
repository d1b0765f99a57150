use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::compositor::blend_over;
use crate::model::{Rect, Rgba8, Vec2};

/// Freehand drawing layer that can paint itself into a raster.
pub trait InkLayer {
    fn is_empty(&self) -> bool;

    /// Renders the area `rect` (logical points) at `scale` pixels per point.
    ///
    /// The result is `round(rect.size * scale)` pixels with a transparent
    /// background. A degenerate side yields zero pixels on that axis.
    fn rasterize(&self, rect: Rect, scale: f32) -> RgbaImage;
}

/// Ink layer with nothing drawn on it.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyInk;

impl InkLayer for EmptyInk {
    fn is_empty(&self) -> bool {
        true
    }

    fn rasterize(&self, rect: Rect, scale: f32) -> RgbaImage {
        let (w, h) = surface_size(rect, scale);
        RgbaImage::new(w, h)
    }
}

/// One pen stroke: a polyline with round caps and joins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Vec2>,
    pub width: f32,
    pub color: Rgba8,
}

impl Stroke {
    pub fn new(color: Rgba8, width: f32) -> Self {
        Self {
            points: Vec::new(),
            width,
            color,
        }
    }

    #[must_use]
    pub fn through(mut self, points: impl IntoIterator<Item = Vec2>) -> Self {
        self.points.extend(points);
        self
    }

    pub fn push(&mut self, point: Vec2) {
        self.points.push(point);
    }

    fn is_visible(&self) -> bool {
        !self.points.is_empty() && self.width.is_finite() && self.width > 0.0 && self.color.a > 0
    }
}

/// Ink layer made of vector strokes, painted in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeLayer {
    strokes: Vec<Stroke>,
}

impl StrokeLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stroke(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    pub fn undo_last(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }
}

impl InkLayer for StrokeLayer {
    fn is_empty(&self) -> bool {
        !self.strokes.iter().any(Stroke::is_visible)
    }

    fn rasterize(&self, rect: Rect, scale: f32) -> RgbaImage {
        let (w, h) = surface_size(rect, scale);
        let mut layer = RgbaImage::new(w, h);
        if w == 0 || h == 0 {
            return layer;
        }

        for stroke in self.strokes.iter().filter(|s| s.is_visible()) {
            let radius = stroke.width * scale / 2.0;
            let points: Vec<(f32, f32)> = stroke
                .points
                .iter()
                .map(|p| ((p.x - rect.x) * scale, (p.y - rect.y) * scale))
                .collect();
            let Some(bounds) = PixelBounds::around(&points, radius, w, h) else {
                continue;
            };

            // Coverage is max-accumulated per stroke so overlapping stamps
            // of the same stroke do not darken each other. The mask only
            // spans the stroke's own bounds.
            let mut coverage = GrayImage::new(bounds.width, bounds.height);
            let local = |(x, y): (f32, f32)| (x - bounds.x as f32, y - bounds.y as f32);

            let mut previous = local(points[0]);
            stamp_disc(&mut coverage, previous, radius);
            for point in &points[1..] {
                let next = local(*point);
                stamp_segment(&mut coverage, previous, next, radius);
                previous = next;
            }

            let color = stroke.color;
            for (x, y, cov) in coverage.enumerate_pixels() {
                if cov[0] == 0 {
                    continue;
                }
                let alpha = (u16::from(color.a) * u16::from(cov[0]) / 255) as u8;
                let src = image::Rgba([color.r, color.g, color.b, alpha]);
                blend_over(layer.get_pixel_mut(bounds.x + x, bounds.y + y), src);
            }
        }
        layer
    }
}

/// Pixel rectangle clamped to a `w`×`h` surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PixelBounds {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl PixelBounds {
    /// Smallest rectangle holding every disc of `radius` centred on `points`.
    fn around(points: &[(f32, f32)], radius: f32, w: u32, h: u32) -> Option<Self> {
        let radius = radius.max(0.5);
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for &(x, y) in points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let x0 = (min_x - radius).floor().max(0.0);
        let y0 = (min_y - radius).floor().max(0.0);
        let x1 = (max_x + radius).ceil().min(w as f32);
        let y1 = (max_y + radius).ceil().min(h as f32);
        if !(x0 < x1 && y0 < y1) {
            return None;
        }
        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

fn surface_size(rect: Rect, scale: f32) -> (u32, u32) {
    let dim = |v: f32| {
        let px = (f64::from(v) * f64::from(scale)).round();
        if px.is_finite() && px >= 1.0 {
            px.min(f64::from(u32::MAX)) as u32
        } else {
            0
        }
    };
    (dim(rect.width), dim(rect.height))
}

fn stamp_segment(mask: &mut GrayImage, from: (f32, f32), to: (f32, f32), radius: f32) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = dx.hypot(dy);
    let spacing = (radius / 2.0).max(0.5);
    let steps = (length / spacing).ceil().max(1.0) as u32;
    for i in 1..=steps {
        let t = i as f32 / steps as f32;
        stamp_disc(mask, (from.0 + dx * t, from.1 + dy * t), radius);
    }
}

fn stamp_disc(mask: &mut GrayImage, center: (f32, f32), radius: f32) {
    let (w, h) = mask.dimensions();
    // Sub-pixel strokes still leave a one pixel mark.
    let radius = radius.max(0.5);
    let min_x = (center.0 - radius).floor().max(0.0);
    let min_y = (center.1 - radius).floor().max(0.0);
    let max_x = (center.0 + radius).ceil().min(w as f32);
    let max_y = (center.1 + radius).ceil().min(h as f32);
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    for y in min_y as u32..max_y as u32 {
        for x in min_x as u32..max_x as u32 {
            let px = x as f32 + 0.5 - center.0;
            let py = y as f32 + 0.5 - center.1;
            if px * px + py * py <= radius * radius {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }
}
