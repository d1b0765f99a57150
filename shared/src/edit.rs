use image::RgbaImage;
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::filter::{Filter, FilterCatalog};
use crate::model::{FontDescriptor, OverlayError, OverlayId, Rgba8, TextOverlay, Vec2};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error("no text overlay with id {0}")]
    UnknownOverlay(OverlayId),
}

/// Immutable copy of the layers handed to the compositor.
///
/// Images are shared, so taking a snapshot never copies pixels.
#[derive(Debug, Clone, Default)]
pub struct EditSnapshot {
    pub selected: Option<Arc<RgbaImage>>,
    pub filtered: Option<Arc<RgbaImage>>,
    pub overlays: Vec<TextOverlay>,
}

/// In-memory model of one editing session.
///
/// `filtered` is always derived from `selected`: it is either the same image
/// or the output of the active filter applied to it.
#[derive(Debug, Clone, Default)]
pub struct EditState {
    selected: Option<Arc<RgbaImage>>,
    filtered: Option<Arc<RgbaImage>>,
    active_filter: Option<Filter>,
    overlays: Vec<TextOverlay>,
    catalog: FilterCatalog,
}

impl EditState {
    pub fn new(catalog: FilterCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Replaces the photo. Overlays are kept; the active filter is dropped.
    pub fn set_image(&mut self, image: impl Into<Arc<RgbaImage>>) {
        let image = image.into();
        debug!(width = image.width(), height = image.height(), "selected image replaced");
        self.filtered = Some(Arc::clone(&image));
        self.selected = Some(image);
        self.active_filter = None;
    }

    pub fn selected_image(&self) -> Option<&Arc<RgbaImage>> {
        self.selected.as_ref()
    }

    pub fn filtered_image(&self) -> Option<&Arc<RgbaImage>> {
        self.filtered.as_ref()
    }

    pub fn active_filter(&self) -> Option<Filter> {
        self.active_filter
    }

    pub fn catalog(&self) -> &FilterCatalog {
        &self.catalog
    }

    /// Applies the catalog filter called `name`.
    ///
    /// Returns whether the filtered image changed. Unknown names, a missing
    /// photo and transform failures leave the state untouched.
    pub fn apply_filter(&mut self, name: &str) -> bool {
        match self.catalog.lookup(name) {
            Some(filter) => self.apply(filter),
            None => {
                debug!(name, "unknown filter name ignored");
                false
            }
        }
    }

    pub fn apply(&mut self, filter: Filter) -> bool {
        let Some(selected) = &self.selected else {
            debug!(filter = filter.name(), "no image selected, filter ignored");
            return false;
        };

        match filter.apply(selected) {
            Ok(output) => {
                self.filtered = Some(Arc::new(output));
                self.active_filter = Some(filter);
                counter!("edit.filter.applied", "filter" => filter.name()).increment(1);
                true
            }
            Err(error) => {
                // Best effort: the user keeps seeing the previous result.
                debug!(filter = filter.name(), %error, "filter failed");
                counter!("edit.filter.failed", "filter" => filter.name()).increment(1);
                false
            }
        }
    }

    pub fn reset_filter(&mut self) {
        self.filtered = self.selected.clone();
        self.active_filter = None;
    }

    /// "Reset changes": hands the overlay list to `on_cleared` (which also
    /// clears the host's ink layer), then reverts the filter. The selected
    /// image is kept.
    pub fn reset_all<F>(&mut self, on_cleared: F)
    where
        F: FnOnce(&mut Vec<TextOverlay>),
    {
        on_cleared(&mut self.overlays);
        self.reset_filter();
    }

    /// Appends on top of the existing overlays.
    pub fn add_overlay(&mut self, overlay: TextOverlay) -> OverlayId {
        let id = overlay.id();
        self.overlays.push(overlay);
        id
    }

    pub fn add_text(
        &mut self,
        text: impl Into<String>,
        font: FontDescriptor,
        color: Rgba8,
        size: f32,
    ) -> Result<OverlayId, EditError> {
        let overlay = TextOverlay::new(text, font, color, size)?;
        Ok(self.add_overlay(overlay))
    }

    /// Adds a drag translation to the overlay's offset.
    pub fn move_overlay(&mut self, id: OverlayId, delta: Vec2) -> Result<(), EditError> {
        self.overlay_mut(id)?.offset += delta;
        Ok(())
    }

    pub fn set_overlay_offset(&mut self, id: OverlayId, offset: Vec2) -> Result<(), EditError> {
        self.overlay_mut(id)?.offset = offset;
        Ok(())
    }

    pub fn set_overlay_size(&mut self, id: OverlayId, size: f32) -> Result<(), EditError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(OverlayError::InvalidSize(size).into());
        }
        self.overlay_mut(id)?.size = size;
        Ok(())
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> Result<TextOverlay, EditError> {
        let index = self
            .overlays
            .iter()
            .position(|o| o.id() == id)
            .ok_or(EditError::UnknownOverlay(id))?;
        Ok(self.overlays.remove(index))
    }

    pub fn overlay(&self, id: OverlayId) -> Option<&TextOverlay> {
        self.overlays.iter().find(|o| o.id() == id)
    }

    /// Overlays in z-order, bottom first.
    pub fn overlays(&self) -> &[TextOverlay] {
        &self.overlays
    }

    pub fn snapshot(&self) -> EditSnapshot {
        EditSnapshot {
            selected: self.selected.clone(),
            filtered: self.filtered.clone(),
            overlays: self.overlays.clone(),
        }
    }

    fn overlay_mut(&mut self, id: OverlayId) -> Result<&mut TextOverlay, EditError> {
        self.overlays
            .iter_mut()
            .find(|o| o.id() == id)
            .ok_or(EditError::UnknownOverlay(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn photo(value: u8) -> RgbaImage {
        RgbaImage::from_fn(3, 3, |x, y| Rgba([value, (x * 40) as u8, (y * 40) as u8, 255]))
    }

    fn text(label: &str) -> TextOverlay {
        TextOverlay::new(label, FontDescriptor::body(), Rgba8::BLACK, 24.0).unwrap()
    }

    mod filters {
        use super::*;

        #[test]
        fn apply_then_reset_restores_selected_pixels() {
            let mut edit = EditState::default();
            edit.set_image(photo(200));
            assert!(edit.apply_filter("Mono"));
            assert_ne!(edit.filtered_image(), edit.selected_image());

            edit.reset_filter();
            assert_eq!(**edit.filtered_image().unwrap(), photo(200));
            assert_eq!(edit.active_filter(), None);
        }

        #[test]
        fn new_image_resets_filter() {
            let mut edit = EditState::default();
            edit.set_image(photo(10));
            edit.apply_filter("Noir");

            edit.set_image(photo(90));
            assert_eq!(**edit.filtered_image().unwrap(), photo(90));
            assert_eq!(edit.active_filter(), None);
        }

        #[test]
        fn unknown_filter_is_a_no_op() {
            let mut edit = EditState::default();
            edit.set_image(photo(10));
            edit.apply_filter("Mono");
            let before = edit.filtered_image().cloned();

            assert!(!edit.apply_filter("Vintage"));
            assert_eq!(edit.filtered_image().cloned(), before);
            assert_eq!(edit.active_filter(), Some(Filter::Mono));
        }

        #[test]
        fn filter_without_image_is_a_no_op() {
            let mut edit = EditState::default();
            assert!(!edit.apply_filter("Mono"));
            assert!(edit.filtered_image().is_none());
        }

        #[test]
        fn failed_transform_keeps_previous_output() {
            let mut edit = EditState::default();
            edit.set_image(photo(10));
            edit.apply_filter("Chrome");
            let before = edit.filtered_image().cloned();

            assert!(!edit.apply(Filter::Sepia {
                intensity: f32::NAN
            }));
            assert_eq!(edit.filtered_image().cloned(), before);
        }

        #[test]
        fn filters_derive_from_selected_not_previous_output() {
            let mut a = EditState::default();
            a.set_image(photo(120));
            a.apply_filter("Fade");
            a.apply_filter("Chrome");

            let mut b = EditState::default();
            b.set_image(photo(120));
            b.apply_filter("Chrome");

            assert_eq!(a.filtered_image(), b.filtered_image());
        }
    }

    mod overlays {
        use super::*;

        #[test]
        fn insertion_order_is_z_order() {
            let mut edit = EditState::default();
            let a = edit.add_overlay(text("A"));
            let b = edit.add_overlay(text("B"));
            let ids: Vec<_> = edit.overlays().iter().map(TextOverlay::id).collect();
            assert_eq!(ids, vec![a, b]);
        }

        #[test]
        fn drag_accumulates_offset() {
            let mut edit = EditState::default();
            let id = edit.add_overlay(text("drag me"));
            edit.move_overlay(id, Vec2::new(10.0, -5.0)).unwrap();
            edit.move_overlay(id, Vec2::new(2.5, 1.0)).unwrap();
            assert_eq!(edit.overlay(id).unwrap().offset, Vec2::new(12.5, -4.0));

            edit.set_overlay_offset(id, Vec2::ZERO).unwrap();
            assert_eq!(edit.overlay(id).unwrap().offset, Vec2::ZERO);
        }

        #[test]
        fn unknown_ids_are_rejected() {
            let mut edit = EditState::default();
            let stray = text("stray").id();
            assert_eq!(
                edit.move_overlay(stray, Vec2::ZERO),
                Err(EditError::UnknownOverlay(stray))
            );
            assert!(edit.remove_overlay(stray).is_err());
        }

        #[test]
        fn add_text_validates_input() {
            let mut edit = EditState::default();
            assert_eq!(
                edit.add_text("", FontDescriptor::title(), Rgba8::RED, 30.0),
                Err(EditError::Overlay(OverlayError::EmptyText))
            );
            assert!(edit.overlays().is_empty());
        }

        #[test]
        fn size_must_stay_positive() {
            let mut edit = EditState::default();
            let id = edit.add_overlay(text("size"));
            assert!(edit.set_overlay_size(id, -1.0).is_err());
            edit.set_overlay_size(id, 90.0).unwrap();
            assert!((edit.overlay(id).unwrap().size - 90.0).abs() < f32::EPSILON);
        }

        #[test]
        fn remove_returns_overlay() {
            let mut edit = EditState::default();
            let keep = edit.add_overlay(text("keep"));
            let gone = edit.add_overlay(text("drop"));
            assert_eq!(edit.remove_overlay(gone).unwrap().text, "drop");
            assert_eq!(edit.overlays().len(), 1);
            assert!(edit.overlay(keep).is_some());
        }
    }

    mod reset {
        use super::*;

        #[test]
        fn reset_all_clears_via_callback_and_keeps_image() {
            let mut edit = EditState::default();
            edit.set_image(photo(50));
            edit.apply_filter("Sepia");
            edit.add_overlay(text("gone"));

            let mut ink_cleared = false;
            edit.reset_all(|overlays| {
                overlays.clear();
                ink_cleared = true;
            });

            assert!(ink_cleared);
            assert!(edit.overlays().is_empty());
            assert_eq!(**edit.selected_image().unwrap(), photo(50));
            assert_eq!(edit.filtered_image(), edit.selected_image());
        }

        #[test]
        fn snapshot_shares_image_buffers() {
            let mut edit = EditState::default();
            edit.set_image(photo(1));
            let snapshot = edit.snapshot();
            assert!(Arc::ptr_eq(
                snapshot.selected.as_ref().unwrap(),
                edit.selected_image().unwrap()
            ));

            edit.add_overlay(text("later"));
            assert!(snapshot.overlays.is_empty());
        }
    }
}
