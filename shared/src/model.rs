use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use thiserror::Error;
use uuid::Uuid;

use crate::{MAX_TEXT_SIZE, MIN_TEXT_SIZE};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
    ($name:ident: Uuid) => {
        #[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

// Overlay ids are stable for the overlay's whole lifetime.
typed_id!(OverlayId: Uuid);
typed_id!(UserId);

/// Account returned by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: UserId,
    pub email: String,
}

impl AppUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            email: email.into(),
        }
    }
}

// Redact debug output; emails end up in logs otherwise.
impl fmt::Debug for AppUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppUser")
            .field("id", &self.id)
            .field("email_present", &!self.email.is_empty())
            .finish()
    }
}

// --- Geometry ---

/// 2D vector in logical points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

/// Output size of a composition: logical points times a pixel scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl TargetSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            scale: 1.0,
        }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Pixel dimensions, or `None` when the size cannot back a surface.
    pub fn pixel_dimensions(&self) -> Option<(u32, u32)> {
        let values = [self.width, self.height, self.scale];
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return None;
        }
        let w = (f64::from(self.width) * f64::from(self.scale)).round();
        let h = (f64::from(self.height) * f64::from(self.scale)).round();
        if w < 1.0 || h < 1.0 || w > f64::from(u32::MAX) || h > f64::from(u32::MAX) {
            return None;
        }
        Some((w as u32, h as u32))
    }
}

// --- Color ---

/// Straight (non-premultiplied) RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const RED: Self = Self::new(255, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn to_pixel(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

impl From<image::Rgba<u8>> for Rgba8 {
    fn from(p: image::Rgba<u8>) -> Self {
        Self::new(p[0], p[1], p[2], p[3])
    }
}

// --- Fonts ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    #[default]
    Regular,
    Bold,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontDescriptor {
    pub family: String,
    pub weight: FontWeight,
}

impl FontDescriptor {
    pub const SYSTEM_FAMILY: &'static str = "system";

    pub fn new(family: impl Into<String>, weight: FontWeight) -> Self {
        Self {
            family: family.into(),
            weight,
        }
    }

    /// Preset used by the text tool's "Title" choice.
    pub fn title() -> Self {
        Self::new(Self::SYSTEM_FAMILY, FontWeight::Bold)
    }

    /// Preset used by the text tool's "Body" choice.
    pub fn body() -> Self {
        Self::new(Self::SYSTEM_FAMILY, FontWeight::Regular)
    }
}

impl Default for FontDescriptor {
    fn default() -> Self {
        Self::body()
    }
}

/// Clamp a slider value into the range the text tool offers.
pub fn clamp_text_size(size: f32) -> f32 {
    if size.is_nan() {
        return MIN_TEXT_SIZE;
    }
    size.clamp(MIN_TEXT_SIZE, MAX_TEXT_SIZE)
}

// --- Text overlay ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverlayError {
    #[error("overlay text cannot be empty")]
    EmptyText,

    #[error("invalid text size: {0}, must be a positive finite value")]
    InvalidSize(f32),
}

/// A positioned piece of text drawn on top of the photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    id: OverlayId,
    pub text: String,
    pub font: FontDescriptor,
    pub color: Rgba8,
    /// Point size. Only positivity is enforced here; the editor UI clamps
    /// to [`MIN_TEXT_SIZE`, `MAX_TEXT_SIZE`].
    pub size: f32,
    /// Offset from the composition center, in logical points.
    pub offset: Vec2,
}

impl TextOverlay {
    pub fn new(
        text: impl Into<String>,
        font: FontDescriptor,
        color: Rgba8,
        size: f32,
    ) -> Result<Self, OverlayError> {
        let text = text.into();
        if text.is_empty() {
            return Err(OverlayError::EmptyText);
        }
        if !size.is_finite() || size <= 0.0 {
            return Err(OverlayError::InvalidSize(size));
        }
        Ok(Self {
            id: OverlayId::generate(),
            text,
            font,
            color,
            size,
            offset: Vec2::ZERO,
        })
    }

    #[must_use]
    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }
}

// --- Session state ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated,
}

impl SessionState {
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_ids_display_their_value() {
        let user = UserId::new("user-7");
        assert_eq!(user.as_str(), "user-7");
        assert_eq!(user.to_string(), "user-7");

        let a = OverlayId::generate();
        let b = OverlayId::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn overlay_rejects_empty_text() {
        let result = TextOverlay::new("", FontDescriptor::body(), Rgba8::BLACK, 24.0);
        assert_eq!(result, Err(OverlayError::EmptyText));
    }

    #[test]
    fn overlay_rejects_non_positive_size() {
        assert!(TextOverlay::new("a", FontDescriptor::body(), Rgba8::BLACK, 0.0).is_err());
        assert!(TextOverlay::new("a", FontDescriptor::body(), Rgba8::BLACK, -3.0).is_err());
        assert!(TextOverlay::new("a", FontDescriptor::body(), Rgba8::BLACK, f32::NAN).is_err());
    }

    #[test]
    fn overlay_accepts_sizes_beyond_ui_range() {
        let overlay = TextOverlay::new("big", FontDescriptor::title(), Rgba8::RED, 400.0).unwrap();
        assert!((overlay.size - 400.0).abs() < f32::EPSILON);
        assert_eq!(overlay.offset, Vec2::ZERO);
    }

    #[test]
    fn overlay_ids_are_unique() {
        let a = TextOverlay::new("a", FontDescriptor::body(), Rgba8::BLACK, 12.0).unwrap();
        let b = TextOverlay::new("a", FontDescriptor::body(), Rgba8::BLACK, 12.0).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn clamp_text_size_matches_slider_range() {
        assert!((clamp_text_size(4.0) - MIN_TEXT_SIZE).abs() < f32::EPSILON);
        assert!((clamp_text_size(100.0) - MAX_TEXT_SIZE).abs() < f32::EPSILON);
        assert!((clamp_text_size(30.0) - 30.0).abs() < f32::EPSILON);
        assert!((clamp_text_size(f32::NAN) - MIN_TEXT_SIZE).abs() < f32::EPSILON);
    }

    #[test]
    fn target_size_pixel_dimensions() {
        assert_eq!(TargetSize::new(300.0, 200.0).pixel_dimensions(), Some((300, 200)));
        assert_eq!(
            TargetSize::new(300.0, 200.0).with_scale(2.0).pixel_dimensions(),
            Some((600, 400))
        );
        assert_eq!(TargetSize::new(0.0, 200.0).pixel_dimensions(), None);
        assert_eq!(TargetSize::new(10.0, f32::NAN).pixel_dimensions(), None);
        assert_eq!(TargetSize::new(10.0, 10.0).with_scale(0.0).pixel_dimensions(), None);
        assert_eq!(TargetSize::new(0.2, 0.2).pixel_dimensions(), None);
    }

    #[test]
    fn app_user_debug_is_redacted() {
        let user = AppUser::new("uid-1", "someone@example.com");
        let debug = format!("{user:?}");
        assert!(!debug.contains("someone@example.com"));
        assert!(debug.contains("uid-1"));
    }

    #[test]
    fn session_state_defaults_to_unauthenticated() {
        assert_eq!(SessionState::default(), SessionState::Unauthenticated);
        assert!(!SessionState::default().is_authenticated());
        assert_eq!(SessionState::Authenticated.to_string(), "authenticated");
    }

    #[test]
    fn vec2_accumulates_drags() {
        let mut offset = Vec2::new(10.0, -5.0);
        offset += Vec2::new(2.5, 5.0);
        assert_eq!(offset, Vec2::new(12.5, 0.0));
    }
}
