//! Capabilities the shell provides to the core.
//!
//! Each capability is a trait the native layer implements on top of the
//! platform SDK (identity provider, photo library, ink toolkit). The core only
//! ever talks to these traits, so every flow can be driven by test doubles.
mod identity;
mod ink;
mod photo_library;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use self::identity::{AuthError, FederatedAuthError, IdentityProvider, PresentationContext};
pub use self::ink::{EmptyInk, InkLayer, Stroke, StrokeLayer};
pub use self::photo_library::{AuthorizationStatus, DirectoryLibrary, PhotoLibrary};
