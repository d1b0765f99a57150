use std::sync::Arc;

use image::RgbaImage;
use metrics::counter;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::capabilities::{AuthorizationStatus, InkLayer, PhotoLibrary};
use crate::compositor::Compositor;
use crate::edit::EditSnapshot;
use crate::model::TargetSize;
use crate::AppError;

#[derive(Debug, Error)]
pub enum LibraryAccessError {
    #[error("Access to the photo library was denied")]
    Denied,

    #[error("Unknown photo library authorization status: {raw}")]
    UnknownStatus { raw: i32 },

    #[error("Failed to save the photo: {0}")]
    UnderlyingIo(#[from] std::io::Error),
}

/// Saves finished compositions, asking for library access when needed.
pub struct PhotoExporter {
    library: Arc<dyn PhotoLibrary>,
}

impl PhotoExporter {
    pub fn new(library: Arc<dyn PhotoLibrary>) -> Self {
        Self { library }
    }

    /// Saves `image` once access is granted.
    ///
    /// An undetermined status triggers one permission request; any status
    /// other than authorized after that is a denial.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub async fn save(&self, image: &RgbaImage) -> Result<(), LibraryAccessError> {
        let mut status = self.library.authorization_status();
        if status.can_request() {
            status = self.library.request_authorization().await;
        }

        match status {
            AuthorizationStatus::Authorized => {}
            AuthorizationStatus::NotDetermined
            | AuthorizationStatus::Denied
            | AuthorizationStatus::Restricted
            | AuthorizationStatus::Limited => {
                counter!("export.denied").increment(1);
                warn!(?status, "photo library access refused");
                return Err(LibraryAccessError::Denied);
            }
            AuthorizationStatus::Unrecognized(raw) => {
                warn!(raw, "unrecognized photo library status");
                return Err(LibraryAccessError::UnknownStatus { raw });
            }
        }

        self.library.save_image(image).await.map_err(|e| {
            counter!("export.failed").increment(1);
            warn!(error = %e, "saving to photo library failed");
            LibraryAccessError::from(e)
        })?;

        counter!("export.saved").increment(1);
        info!("photo saved to library");
        Ok(())
    }

    /// Renders the snapshot and saves the result.
    ///
    /// A target that cannot be rendered means there is nothing to export.
    pub async fn export(
        &self,
        compositor: &Compositor,
        edit: &EditSnapshot,
        ink: &dyn InkLayer,
        target: TargetSize,
    ) -> Result<(), AppError> {
        let image = compositor.render_edit(edit, ink, target)?;
        self.save(&image).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::ScriptedPhotoLibrary;
    use crate::capabilities::EmptyInk;
    use crate::ErrorKind;

    fn exporter(library: ScriptedPhotoLibrary) -> (PhotoExporter, Arc<ScriptedPhotoLibrary>) {
        let library = Arc::new(library);
        (PhotoExporter::new(library.clone()), library)
    }

    fn image() -> RgbaImage {
        RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]))
    }

    #[tokio::test]
    async fn authorized_saves_without_prompt() {
        let (exporter, library) = exporter(ScriptedPhotoLibrary::new(AuthorizationStatus::Authorized));
        exporter.save(&image()).await.unwrap();
        assert_eq!(library.saved(), vec![image()]);
        assert_eq!(library.authorization_requests(), 0);
    }

    #[tokio::test]
    async fn undetermined_prompts_once_then_saves() {
        let (exporter, library) = exporter(
            ScriptedPhotoLibrary::new(AuthorizationStatus::NotDetermined)
                .answering(AuthorizationStatus::Authorized),
        );
        exporter.save(&image()).await.unwrap();
        assert_eq!(library.authorization_requests(), 1);
        assert_eq!(library.saved().len(), 1);
    }

    #[tokio::test]
    async fn still_undetermined_after_prompt_is_denied() {
        let (exporter, library) = exporter(ScriptedPhotoLibrary::new(AuthorizationStatus::NotDetermined));
        let err = exporter.save(&image()).await.unwrap_err();
        assert!(matches!(err, LibraryAccessError::Denied));
        assert_eq!(library.authorization_requests(), 1);
    }

    #[tokio::test]
    async fn refused_statuses_are_denied() {
        for status in [
            AuthorizationStatus::Denied,
            AuthorizationStatus::Restricted,
            AuthorizationStatus::Limited,
        ] {
            let (exporter, library) = exporter(ScriptedPhotoLibrary::new(status));
            let err = exporter.save(&image()).await.unwrap_err();
            assert!(matches!(err, LibraryAccessError::Denied), "{status:?}");
            assert!(library.saved().is_empty());
            assert_eq!(library.authorization_requests(), 0);
        }
    }

    #[tokio::test]
    async fn unrecognized_status_is_reported() {
        let (exporter, _) = exporter(ScriptedPhotoLibrary::new(AuthorizationStatus::Unrecognized(9)));
        let err = exporter.save(&image()).await.unwrap_err();
        assert!(matches!(err, LibraryAccessError::UnknownStatus { raw: 9 }));
    }

    #[tokio::test]
    async fn save_failure_is_underlying_io() {
        let (exporter, _) = exporter(
            ScriptedPhotoLibrary::new(AuthorizationStatus::Authorized).failing_saves(),
        );
        let err = exporter.save(&image()).await.unwrap_err();
        assert!(matches!(err, LibraryAccessError::UnderlyingIo(_)));
        assert_eq!(AppError::from(err).kind, ErrorKind::LibraryAccess);
    }

    #[tokio::test]
    async fn degenerate_target_means_nothing_to_export() {
        let (exporter, library) = exporter(ScriptedPhotoLibrary::new(AuthorizationStatus::Authorized));
        let err = exporter
            .export(
                &Compositor::default(),
                &EditSnapshot::default(),
                &EmptyInk,
                TargetSize::new(0.0, 0.0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Render);
        assert!(library.saved().is_empty());
    }
}
