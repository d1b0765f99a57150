use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Photo library permission as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
    /// Add-only access to a user-selected subset.
    Limited,
    /// A status value this build does not know about.
    Unrecognized(i32),
}

impl AuthorizationStatus {
    #[must_use]
    pub const fn is_authorized(self) -> bool {
        matches!(self, Self::Authorized)
    }

    #[must_use]
    pub const fn can_request(self) -> bool {
        matches!(self, Self::NotDetermined)
    }
}

/// Write access to the device photo library.
#[async_trait::async_trait]
pub trait PhotoLibrary: Send + Sync {
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Prompts the user when the status is undetermined and reports the
    /// resulting status. Otherwise returns the current status unchanged.
    async fn request_authorization(&self) -> AuthorizationStatus;

    async fn save_image(&self, image: &RgbaImage) -> io::Result<()>;
}

/// Library that writes PNG files into a directory.
///
/// Backs desktop builds and tests. The permission state is simulated: it
/// starts at `status` and a request resolves an undetermined status to
/// `granted_on_request`.
pub struct DirectoryLibrary {
    root: PathBuf,
    status: Mutex<AuthorizationStatus>,
    granted_on_request: AuthorizationStatus,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            status: Mutex::new(AuthorizationStatus::Authorized),
            granted_on_request: AuthorizationStatus::Authorized,
        }
    }

    #[must_use]
    pub fn with_status(self, status: AuthorizationStatus) -> Self {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        self
    }

    #[must_use]
    pub fn granting_on_request(mut self, status: AuthorizationStatus) -> Self {
        self.granted_on_request = status;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl PhotoLibrary for DirectoryLibrary {
    fn authorization_status(&self) -> AuthorizationStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request_authorization(&self) -> AuthorizationStatus {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.can_request() {
            *status = self.granted_on_request;
        }
        *status
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    async fn save_image(&self, image: &RgbaImage) -> io::Result<()> {
        let image = image.clone();
        let path = self.root.join(format!("{}.png", Uuid::new_v4()));
        let dir = self.root.clone();

        let written = tokio::task::spawn_blocking(move || -> io::Result<PathBuf> {
            std::fs::create_dir_all(&dir)?;
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(io::Error::other)?;
            Ok(path)
        })
        .await
        .map_err(io::Error::other)??;

        debug!(path = %written.display(), "photo written to library directory");
        Ok(())
    }
}
