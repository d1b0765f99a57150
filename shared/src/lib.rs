// lib.rs - Photo editor shared core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod capabilities;
pub mod compositor;
pub mod config;
pub mod credentials;
pub mod edit;
pub mod event;
pub mod export;
pub mod filter;
pub mod image_processing;
pub mod model;
pub mod session;
pub mod text;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use capabilities::{
    AuthError, FederatedAuthError, IdentityProvider, InkLayer, PhotoLibrary, PresentationContext,
};
pub use compositor::{encode_png, Compositor, RenderError};
pub use config::EditorConfig;
pub use edit::{EditError, EditSnapshot, EditState};
pub use event::{SessionEvent, SessionSignal};
pub use export::{LibraryAccessError, PhotoExporter};
pub use filter::{Filter, FilterCatalog, FilterError};
pub use model::{
    AppUser, FontDescriptor, FontWeight, OverlayId, Rgba8, SessionState, TargetSize, TextOverlay,
    Vec2,
};
pub use session::{SessionMachine, SessionSnapshot};

pub const MIN_TEXT_SIZE: f32 = 12.0;
pub const MAX_TEXT_SIZE: f32 = 72.0;
pub const DEFAULT_SEPIA_INTENSITY: f32 = 1.0;
pub const GOOGLE_SETTLE_DELAY: Duration = Duration::from_millis(1500);
pub const MAX_OUTPUT_DIMENSION: u32 = 8192;
pub const MAX_OUTPUT_PIXELS: u64 = 40_000_000;
pub const MAX_IMAGE_BYTES: usize = 30 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 12_000;
pub const MAX_EDIT_DIMENSION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Authentication,
    InvalidCredentials,
    AccountConflict,
    WeakPassword,
    FederatedSignIn,
    LibraryAccessDenied,
    LibraryAccess,
    Validation,
    ImageProcessing,
    ImageTooLarge,
    ImageFormatUnsupported,
    Render,
    Configuration,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Authentication => "AUTH_ERROR",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountConflict => "EMAIL_IN_USE",
            Self::WeakPassword => "WEAK_PASSWORD",
            Self::FederatedSignIn => "FEDERATED_SIGN_IN_ERROR",
            Self::LibraryAccessDenied => "LIBRARY_ACCESS_DENIED",
            Self::LibraryAccess => "LIBRARY_ACCESS_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::ImageFormatUnsupported => "IMAGE_FORMAT_UNSUPPORTED",
            Self::Render => "RENDER_ERROR",
            Self::Configuration => "CONFIG_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Whether the user can fix the problem by editing what they typed.
    #[must_use]
    pub const fn is_user_correctable(self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::AccountConflict | Self::WeakPassword | Self::Validation
        )
    }
}

/// Crate-wide error carried in UI-facing state.
///
/// `message` is the provider's or component's own description; use
/// [`AppError::user_facing_message`] for alert text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub code: Option<i64>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn kind_code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            // Provider messages are already localized and user-readable.
            ErrorKind::Authentication
            | ErrorKind::InvalidCredentials
            | ErrorKind::AccountConflict
            | ErrorKind::WeakPassword
            | ErrorKind::FederatedSignIn
            | ErrorKind::Validation => self.message.clone(),
            ErrorKind::LibraryAccessDenied => {
                "Access to Photo Library denied. Enable access in Settings to save photos.".into()
            }
            ErrorKind::LibraryAccess => "Unable to save the photo. Please try again.".into(),
            ErrorKind::ImageProcessing => {
                "Unable to process the image. Please try a different photo.".into()
            }
            ErrorKind::ImageTooLarge => format!(
                "The image is too large. Maximum supported is {MAX_IMAGE_DIMENSION}x{MAX_IMAGE_DIMENSION} pixels."
            ),
            ErrorKind::ImageFormatUnsupported => "This image format is not supported.".into(),
            ErrorKind::Render => "Nothing to export yet.".into(),
            ErrorKind::Configuration => {
                "The app is misconfigured. Please reinstall or contact support.".into()
            }
            ErrorKind::Unknown => "Something went wrong. Please try again.".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for AppError {}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        let kind = match &e {
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::EmailInUse => ErrorKind::AccountConflict,
            AuthError::WeakPassword => ErrorKind::WeakPassword,
            AuthError::Unknown | AuthError::NotAuthenticated | AuthError::Custom { .. } => {
                ErrorKind::Authentication
            }
        };
        AppError::new(kind, e.to_string()).with_code(e.code())
    }
}

impl From<FederatedAuthError> for AppError {
    fn from(e: FederatedAuthError) -> Self {
        AppError::new(ErrorKind::FederatedSignIn, e.to_string())
    }
}

impl From<LibraryAccessError> for AppError {
    fn from(e: LibraryAccessError) -> Self {
        let kind = match &e {
            LibraryAccessError::Denied => ErrorKind::LibraryAccessDenied,
            LibraryAccessError::UnknownStatus { .. } | LibraryAccessError::UnderlyingIo(_) => {
                ErrorKind::LibraryAccess
            }
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        AppError::new(ErrorKind::Render, e.to_string())
    }
}

impl From<EditError> for AppError {
    fn from(e: EditError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

impl From<image_processing::ImageLoadError> for AppError {
    fn from(e: image_processing::ImageLoadError) -> Self {
        use image_processing::ImageLoadError;
        let kind = match &e {
            ImageLoadError::InputTooLarge { .. } | ImageLoadError::ImageTooLarge { .. } => {
                ErrorKind::ImageTooLarge
            }
            ImageLoadError::UnsupportedFormat => ErrorKind::ImageFormatUnsupported,
            _ => ErrorKind::ImageProcessing,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}
