use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FilterConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("cannot filter an empty image")]
    EmptyImage,

    #[error("invalid filter intensity: {0}")]
    InvalidIntensity(f32),
}

/// Photo look that can be applied to the selected image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Filter {
    Mono,
    Noir,
    Chrome,
    Fade,
    Sepia { intensity: f32 },
}

// Rec. 709 luma weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

impl Filter {
    pub const NAMES: [&'static str; 5] = ["Mono", "Noir", "Chrome", "Fade", "Sepia"];

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mono => "Mono",
            Self::Noir => "Noir",
            Self::Chrome => "Chrome",
            Self::Fade => "Fade",
            Self::Sepia { .. } => "Sepia",
        }
    }

    /// Produces a new image; alpha is preserved.
    pub fn apply(&self, source: &RgbaImage) -> Result<RgbaImage, FilterError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(FilterError::EmptyImage);
        }
        if let Self::Sepia { intensity } = self {
            if !intensity.is_finite() {
                return Err(FilterError::InvalidIntensity(*intensity));
            }
        }

        let mut output = source.clone();
        for pixel in output.pixels_mut() {
            let rgb = [
                f32::from(pixel[0]),
                f32::from(pixel[1]),
                f32::from(pixel[2]),
            ];
            let [r, g, b] = self.transform(rgb);
            *pixel = Rgba([to_channel(r), to_channel(g), to_channel(b), pixel[3]]);
        }
        Ok(output)
    }

    fn transform(&self, rgb: [f32; 3]) -> [f32; 3] {
        let luma = LUMA[0] * rgb[0] + LUMA[1] * rgb[1] + LUMA[2] * rgb[2];
        match self {
            Self::Mono => [luma; 3],
            Self::Noir => [contrast(luma, 1.35); 3],
            Self::Chrome => rgb.map(|c| contrast(luma + (c - luma) * 1.3, 1.1)),
            Self::Fade => rgb.map(|c| {
                let muted = luma + (c - luma) * 0.7;
                muted * 0.85 + 0.12 * 255.0
            }),
            Self::Sepia { intensity } => {
                let toned = SEPIA.map(|row| row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2]);
                [0, 1, 2].map(|i| rgb[i] + (toned[i] - rgb[i]) * intensity)
            }
        }
    }
}

fn contrast(value: f32, amount: f32) -> f32 {
    (value - 127.5) * amount + 127.5
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Name lookup for the fixed set of filters offered in the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCatalog {
    sepia_intensity: f32,
}

impl FilterCatalog {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            sepia_intensity: config.sepia_intensity,
        }
    }

    /// Case-insensitive lookup. Unknown names resolve to `None`.
    pub fn lookup(&self, name: &str) -> Option<Filter> {
        let name = name.trim();
        let filter = match name.to_ascii_lowercase().as_str() {
            "mono" => Filter::Mono,
            "noir" => Filter::Noir,
            "chrome" => Filter::Chrome,
            "fade" => Filter::Fade,
            "sepia" => Filter::Sepia {
                intensity: self.sepia_intensity,
            },
            _ => return None,
        };
        Some(filter)
    }

    pub fn names(&self) -> &'static [&'static str] {
        &Filter::NAMES
    }

    pub fn sepia_intensity(&self) -> f32 {
        self.sepia_intensity
    }
}

impl Default for FilterCatalog {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}
