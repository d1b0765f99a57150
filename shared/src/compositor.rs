//! Flattening of an edit into a single raster.
//!
//! Layers are painted bottom to top: the base photo (filtered when a filter
//! is active) stretched over the whole target, the ink layer, then text
//! overlays in insertion order. Rendering is pure and deterministic; callers
//! snapshot their inputs before handing them over.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, Rgba, RgbaImage};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::capabilities::InkLayer;
use crate::config::RenderConfig;
use crate::edit::EditSnapshot;
use crate::model::{TargetSize, TextOverlay};
use crate::text::{BoxGlyphRasterizer, GlyphRasterizer};

const TEXT_MASK_PADDING: f32 = 2.0;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no output surface for {width}x{height} at scale {scale}: {reason}")]
    NoOutputSurface {
        width: f32,
        height: f32,
        scale: f32,
        reason: &'static str,
    },

    #[error("png encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Where an overlay's anchor point sits on its text block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAnchor {
    /// The block is centred on the anchor.
    #[default]
    Center,
    /// The anchor is the block's top-left corner.
    TopLeft,
}

/// Resampling used when the base photo is stretched to the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resample {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl Resample {
    fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

pub struct Compositor {
    config: RenderConfig,
    glyphs: Arc<dyn GlyphRasterizer>,
}

impl Compositor {
    pub fn new(config: RenderConfig) -> Self {
        Self::with_rasterizer(config, Arc::new(BoxGlyphRasterizer))
    }

    pub fn with_rasterizer(config: RenderConfig, glyphs: Arc<dyn GlyphRasterizer>) -> Self {
        Self { config, glyphs }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Flattens the layers into an image of `target`'s pixel size.
    ///
    /// Nothing to draw still yields a fully transparent image; only a target
    /// that cannot back a surface fails.
    #[instrument(skip_all, fields(width = target.width, height = target.height, scale = target.scale, overlays = overlays.len()))]
    pub fn render(
        &self,
        base: Option<&RgbaImage>,
        filtered: Option<&RgbaImage>,
        ink: &dyn InkLayer,
        overlays: &[TextOverlay],
        target: TargetSize,
    ) -> Result<RgbaImage, RenderError> {
        let start = Instant::now();
        counter!("compositor.render.requests").increment(1);

        let (width, height) = self.surface_dimensions(target).map_err(|e| {
            counter!("compositor.render.errors").increment(1);
            warn!(error = %e, "render rejected");
            e
        })?;

        let mut canvas = RgbaImage::new(width, height);

        if let Some(photo) = filtered.or(base) {
            self.draw_photo(&mut canvas, photo);
        }

        if !ink.is_empty() {
            draw_ink(&mut canvas, ink, target);
        }

        for overlay in overlays {
            self.draw_text(&mut canvas, overlay, target);
        }

        histogram!("compositor.render.duration_ms").record(start.elapsed().as_millis() as f64);
        debug!(width, height, "composition rendered");
        Ok(canvas)
    }

    /// Renders a snapshot taken from an [`crate::EditState`].
    pub fn render_edit(
        &self,
        edit: &EditSnapshot,
        ink: &dyn InkLayer,
        target: TargetSize,
    ) -> Result<RgbaImage, RenderError> {
        self.render(
            edit.selected.as_deref(),
            edit.filtered.as_deref(),
            ink,
            &edit.overlays,
            target,
        )
    }

    fn surface_dimensions(&self, target: TargetSize) -> Result<(u32, u32), RenderError> {
        let no_surface = |reason| RenderError::NoOutputSurface {
            width: target.width,
            height: target.height,
            scale: target.scale,
            reason,
        };
        let (w, h) = target
            .pixel_dimensions()
            .ok_or_else(|| no_surface("degenerate target size"))?;

        let max = self.config.max_output_dimension;
        if w > max || h > max {
            return Err(no_surface("dimension exceeds limit"));
        }
        if u64::from(w) * u64::from(h) > self.config.max_output_pixels {
            return Err(no_surface("pixel count exceeds limit"));
        }
        Ok((w, h))
    }

    fn draw_photo(&self, canvas: &mut RgbaImage, photo: &RgbaImage) {
        if photo.width() == 0 || photo.height() == 0 {
            debug!("skipping empty base image");
            return;
        }
        let (w, h) = canvas.dimensions();
        if photo.dimensions() == (w, h) {
            blend_image(canvas, photo);
        } else {
            let stretched = imageops::resize(photo, w, h, self.config.resample.filter_type());
            blend_image(canvas, &stretched);
        }
    }

    fn draw_text(&self, canvas: &mut RgbaImage, overlay: &TextOverlay, target: TargetSize) {
        if overlay.text.is_empty() || !overlay.size.is_finite() || overlay.size <= 0.0 {
            return;
        }

        let metrics = self.glyphs.measure(&overlay.text, &overlay.font, overlay.size);
        let anchor_x = target.width / 2.0 + overlay.offset.x;
        let anchor_y = target.height / 2.0 + overlay.offset.y;
        let (left, top) = match self.config.text_anchor {
            TextAnchor::Center => (anchor_x - metrics.width / 2.0, anchor_y - metrics.height / 2.0),
            TextAnchor::TopLeft => (anchor_x, anchor_y),
        };

        let scale = target.scale;
        let (origin_x, origin_y) = (left * scale, top * scale);
        // Coverage is only gathered over the laid-out block, padded for
        // rasterizers that antialias past their metrics.
        let pad = TEXT_MASK_PADDING;
        let clamp = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;
        let x0 = clamp((origin_x - pad).floor(), canvas.width());
        let y0 = clamp((origin_y - pad).floor(), canvas.height());
        let x1 = clamp((origin_x + metrics.width * scale + pad).ceil(), canvas.width());
        let y1 = clamp((origin_y + metrics.height * scale + pad).ceil(), canvas.height());
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let mut coverage = GrayImage::new(x1 - x0, y1 - y0);
        self.glyphs.draw(
            &overlay.text,
            &overlay.font,
            overlay.size,
            scale,
            (origin_x - x0 as f32, origin_y - y0 as f32),
            &mut coverage,
        );

        let color = overlay.color;
        for (x, y, cov) in coverage.enumerate_pixels() {
            if cov[0] == 0 {
                continue;
            }
            let alpha = (u16::from(color.a) * u16::from(cov[0]) / 255) as u8;
            blend_over(
                canvas.get_pixel_mut(x0 + x, y0 + y),
                Rgba([color.r, color.g, color.b, alpha]),
            );
        }
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

fn draw_ink(canvas: &mut RgbaImage, ink: &dyn InkLayer, target: TargetSize) {
    let layer = ink.rasterize(target.rect(), target.scale);
    if layer.width() == 0 || layer.height() == 0 {
        return;
    }
    if layer.dimensions() == canvas.dimensions() {
        blend_image(canvas, &layer);
    } else {
        debug!(
            ink_width = layer.width(),
            ink_height = layer.height(),
            "ink layer size mismatch, resampling"
        );
        let resized = imageops::resize(&layer, canvas.width(), canvas.height(), FilterType::Triangle);
        blend_image(canvas, &resized);
    }
}

fn blend_image(canvas: &mut RgbaImage, top: &RgbaImage) {
    for (dst, src) in canvas.pixels_mut().zip(top.pixels()) {
        blend_over(dst, *src);
    }
}

/// Straight-alpha source-over.
pub(crate) fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    if src[3] == 0 {
        return;
    }
    if src[3] == 255 || dst[3] == 0 {
        *dst = src;
        return;
    }

    let src_a = f32::from(src[3]) / 255.0;
    let dst_a = f32::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    let channel = |s: u8, d: u8| {
        let value = (f32::from(s) * src_a + f32::from(d) * dst_a * (1.0 - src_a)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };

    *dst = Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]);
}

/// Encodes a rendered image as PNG for share and export collaborators.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
