use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GenericImageView, ImageReader, Limits, RgbaImage};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::{MAX_EDIT_DIMENSION, MAX_IMAGE_BYTES, MAX_IMAGE_DIMENSION};

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },

    #[error("image too large: {width}x{height} = {pixels} pixels, max {max_pixels}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("input bytes empty")]
    EmptyInput,

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("decode task did not complete")]
    Interrupted,

    #[error("too many images loading, try again later")]
    Overloaded,
}

/// Bounds applied to picked or captured photos before they enter an edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub max_image_pixels: u64,
    pub max_input_bytes: usize,
    pub max_alloc_bytes: u64,
    pub max_dimension: u32,
    /// Longest side of the working copy; larger photos are downscaled.
    pub max_edit_dimension: u32,
    pub max_concurrent_ops: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_image_pixels: 100_000_000,
            max_input_bytes: MAX_IMAGE_BYTES,
            max_alloc_bytes: 512 * 1024 * 1024,
            max_dimension: MAX_IMAGE_DIMENSION,
            max_edit_dimension: MAX_EDIT_DIMENSION,
            max_concurrent_ops: 2,
        }
    }
}

/// Decodes photo bytes into the RGBA working image of an edit.
pub struct ImageLoader {
    config: LoaderConfig,
    semaphore: Arc<Semaphore>,
}

impl ImageLoader {
    pub fn new(config: LoaderConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_ops));
        Self { config, semaphore }
    }

    pub fn with_defaults() -> Self {
        Self::new(LoaderConfig::default())
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    #[instrument(skip(self, raw_bytes), fields(input_size = raw_bytes.len()))]
    pub async fn load(&self, raw_bytes: Vec<u8>) -> Result<RgbaImage, ImageLoadError> {
        let start = Instant::now();
        counter!("image.load.requests").increment(1);

        let _permit = self.semaphore.try_acquire().map_err(|_| {
            counter!("image.load.rejected").increment(1);
            ImageLoadError::Overloaded
        })?;

        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || Self::load_sync(&config, &raw_bytes))
            .await
            .map_err(|_| ImageLoadError::Interrupted)?;

        histogram!("image.load.duration_ms").record(start.elapsed().as_millis() as f64);

        match &result {
            Ok(image) => {
                debug!(width = image.width(), height = image.height(), "image loaded");
            }
            Err(e) => {
                counter!("image.load.errors").increment(1);
                warn!(error = %e, "image load failed");
            }
        }

        result
    }

    /// Blocking variant for callers already off the async runtime.
    pub fn load_sync(config: &LoaderConfig, raw_bytes: &[u8]) -> Result<RgbaImage, ImageLoadError> {
        let img = decode_image(config, raw_bytes)?;
        Ok(fit_to_edit_bounds(img, config.max_edit_dimension).to_rgba8())
    }
}

fn fit_to_edit_bounds(img: DynamicImage, max_side: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if max_side == 0 || (w <= max_side && h <= max_side) {
        return img;
    }
    // `resize` keeps the aspect ratio within the bounding box.
    img.resize(max_side, max_side, image::imageops::FilterType::Triangle)
}

fn decode_image(config: &LoaderConfig, raw_bytes: &[u8]) -> Result<DynamicImage, ImageLoadError> {
    if raw_bytes.is_empty() {
        return Err(ImageLoadError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(ImageLoadError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: config.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| ImageLoadError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(ImageLoadError::UnsupportedFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);
    reader.limits(limits);

    let img = reader.decode()?;
    let (w, h) = img.dimensions();
    let pixels = u64::from(w) * u64::from(h);

    if pixels > config.max_image_pixels {
        return Err(ImageLoadError::ImageTooLarge {
            width: w,
            height: h,
            pixels,
            max_pixels: config.max_image_pixels,
        });
    }

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ExtendedColorType, ImageEncoder, Rgba};
    use proptest::prelude::*;

    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        });
        let mut buffer = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
            .unwrap();
        buffer
    }

    #[test]
    fn decode_rejects_empty() {
        let config = LoaderConfig::default();
        assert!(matches!(decode_image(&config, &[]), Err(ImageLoadError::EmptyInput)));
    }

    #[test]
    fn decode_rejects_garbage() {
        let config = LoaderConfig::default();
        assert!(decode_image(&config, &[0xFF, 0xFE, 0x00]).is_err());
    }

    #[test]
    fn decode_rejects_oversized_input() {
        let config = LoaderConfig {
            max_input_bytes: 100,
            ..Default::default()
        };
        let data = vec![0u8; 101];
        assert!(matches!(
            decode_image(&config, &data),
            Err(ImageLoadError::InputTooLarge { .. })
        ));
    }

    #[test]
    fn decode_enforces_pixel_budget() {
        let config = LoaderConfig {
            max_image_pixels: 100,
            ..Default::default()
        };
        let png = create_test_png(20, 20);
        assert!(matches!(
            decode_image(&config, &png),
            Err(ImageLoadError::ImageTooLarge { pixels: 400, .. })
        ));
    }

    #[test]
    fn decode_enforces_dimension_limit() {
        let config = LoaderConfig {
            max_dimension: 16,
            ..Default::default()
        };
        let png = create_test_png(32, 8);
        assert!(matches!(decode_image(&config, &png), Err(ImageLoadError::Decode { .. })));
    }

    #[test]
    fn small_images_keep_their_size() {
        let png = create_test_png(64, 48);
        let image = ImageLoader::load_sync(&LoaderConfig::default(), &png).unwrap();
        assert_eq!(image.dimensions(), (64, 48));
        assert_eq!(*image.get_pixel(10, 20), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn large_images_are_downscaled_keeping_aspect() {
        let config = LoaderConfig {
            max_edit_dimension: 50,
            ..Default::default()
        };
        let png = create_test_png(200, 100);
        let image = ImageLoader::load_sync(&config, &png).unwrap();
        assert_eq!(image.dimensions(), (50, 25));
    }

    #[tokio::test]
    async fn loader_decodes_on_blocking_pool() {
        let loader = ImageLoader::with_defaults();
        let image = loader.load(create_test_png(8, 8)).await.unwrap();
        assert_eq!(image.dimensions(), (8, 8));
    }

    #[tokio::test]
    async fn loader_rejects_when_overloaded() {
        let loader = ImageLoader::new(LoaderConfig {
            max_concurrent_ops: 1,
            ..Default::default()
        });
        let _permit = loader.semaphore.try_acquire().unwrap();

        let result = loader.load(create_test_png(8, 8)).await;
        assert!(matches!(result, Err(ImageLoadError::Overloaded)));
    }

    proptest! {
        #[test]
        fn downscale_never_exceeds_bound(w in 1u32..300, h in 1u32..300, max in 1u32..120) {
            let img = DynamicImage::ImageRgba8(RgbaImage::new(w, h));
            let fitted = fit_to_edit_bounds(img, max);
            let (fw, fh) = fitted.dimensions();
            prop_assert!(fw <= max && fh <= max);
        }
    }
}
