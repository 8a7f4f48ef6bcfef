use std::sync::{Arc, Mutex, MutexGuard};

use crate::messaging::domain::channel::Outbox;
use crate::messaging::domain::messages::TrackerCommand;
use crate::shared::region::Region;
use crate::tracking::domain::video_surface::{VideoSurface, Viewport};

/// The host document the tracker scans.
pub trait SurfaceSource: Send {
    fn surfaces(&self) -> Vec<VideoSurface>;
    fn viewport(&self) -> Viewport;
}

/// Live scan: the largest qualifying surface, if any.
pub fn scan(source: &dyn SurfaceSource) -> Option<Region> {
    let viewport = source.viewport();
    select_primary(
        source
            .surfaces()
            .iter()
            .filter(|s| s.is_qualifying(&viewport))
            .map(VideoSurface::region),
    )
}

/// Largest area wins; the first one seen wins ties.
pub fn select_primary(regions: impl IntoIterator<Item = Region>) -> Option<Region> {
    regions.into_iter().fold(None, |best: Option<Region>, r| match best {
        Some(b) if b.area() >= r.area() => Some(b),
        _ => Some(r),
    })
}

struct DocumentState {
    surfaces: Vec<VideoSurface>,
    viewport: Viewport,
    observer: Option<Outbox<TrackerCommand>>,
}

/// A document mutated by its host and read by the tracker.
///
/// Every mutation notifies the registered observer, the way a DOM mutation
/// observer would.
#[derive(Clone)]
pub struct SharedDocument {
    state: Arc<Mutex<DocumentState>>,
}

impl SharedDocument {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            state: Arc::new(Mutex::new(DocumentState {
                surfaces: Vec::new(),
                viewport,
                observer: None,
            })),
        }
    }

    /// Registers the tracker to be told about mutations.
    pub fn observe(&self, observer: Outbox<TrackerCommand>) {
        self.lock().observer = Some(observer);
    }

    pub fn set_surfaces(&self, surfaces: Vec<VideoSurface>) {
        self.mutate(|doc| doc.surfaces = surfaces);
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.mutate(|doc| doc.viewport = viewport);
    }

    pub fn clear(&self) {
        self.set_surfaces(Vec::new());
    }

    fn mutate(&self, change: impl FnOnce(&mut DocumentState)) {
        let observer = {
            let mut doc = self.lock();
            change(&mut doc);
            doc.observer.clone()
        };
        if let Some(observer) = observer {
            observer.notify(TrackerCommand::Mutation);
        }
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SurfaceSource for SharedDocument {
    fn surfaces(&self) -> Vec<VideoSurface> {
        self.lock().surfaces.clone()
    }

    fn viewport(&self) -> Viewport {
        self.lock().viewport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::domain::video_surface::MediaSource;

    #[test]
    fn test_scan_picks_largest_qualifying_surface() {
        let doc = SharedDocument::new(Viewport::new(0, 1000));
        doc.set_surfaces(vec![
            VideoSurface::live(0, 0, 160, 120),
            VideoSurface {
                source: MediaSource::None,
                ..VideoSurface::live(0, 0, 1920, 1080)
            },
            VideoSurface::live(10, 10, 640, 480),
        ]);
        assert_eq!(scan(&doc), Some(Region::new(10, 10, 640, 480, true)));
    }

    #[test]
    fn test_scan_of_empty_document_is_none() {
        assert!(scan(&SharedDocument::new(Viewport::new(0, 800))).is_none());
    }

    #[test]
    fn test_select_primary_keeps_first_on_ties() {
        let a = Region::new(0, 0, 10, 10, true);
        let b = Region::new(50, 50, 10, 10, true);
        assert_eq!(select_primary([a, b]), Some(a));
    }

    #[test]
    fn test_mutation_notifies_observer() {
        let doc = SharedDocument::new(Viewport::new(0, 800));
        let (outbox, rx) = Outbox::channel("tracker");
        doc.observe(outbox);
        doc.set_surfaces(vec![VideoSurface::live(0, 0, 10, 10)]);
        assert!(matches!(rx.try_recv(), Ok(TrackerCommand::Mutation)));
    }
}
