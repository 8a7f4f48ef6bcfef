use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::messaging::domain::channel::Outbox;
use crate::messaging::domain::messages::{OverlayMessage, OverlayStatus};
use crate::overlay::domain::overlay_view::{OverlayRenderer, OverlayView};

/// Attaches an overlay to the target and returns its inbox.
///
/// Called again whenever the coordinator finds the overlay unreachable.
pub trait OverlayInjector: Send {
    fn inject(&mut self) -> Result<Outbox<OverlayMessage>, Box<dyn std::error::Error>>;
}

pub type RendererFactory = Box<dyn FnMut() -> Box<dyn OverlayRenderer> + Send>;

/// Injects overlays as threads, one renderer each.
pub struct ThreadOverlayInjector {
    make_renderer: RendererFactory,
    injected: usize,
    last: Option<JoinHandle<()>>,
}

impl ThreadOverlayInjector {
    pub fn new(make_renderer: RendererFactory) -> Self {
        Self {
            make_renderer,
            injected: 0,
            last: None,
        }
    }

    pub fn injected(&self) -> usize {
        self.injected
    }
}

impl OverlayInjector for ThreadOverlayInjector {
    fn inject(&mut self) -> Result<Outbox<OverlayMessage>, Box<dyn std::error::Error>> {
        let (outbox, inbox) = Outbox::channel("overlay");
        let renderer = (self.make_renderer)();
        let thread = thread::Builder::new()
            .name("overlay".into())
            .spawn(move || run(renderer, inbox))?;
        // A replaced overlay exits once its inbox disconnects.
        self.last = Some(thread);
        self.injected += 1;
        log::debug!("Overlay injected ({} so far)", self.injected);
        Ok(outbox)
    }
}

fn run(mut renderer: Box<dyn OverlayRenderer>, inbox: Receiver<OverlayMessage>) {
    let mut view = OverlayView::default();
    for message in inbox.iter() {
        if matches!(message, OverlayMessage::Shutdown) {
            break;
        }
        if view.apply(&message) {
            renderer.render(&view);
        }
    }
}

/// Logs status changes at info level and per-frame badges at debug.
#[derive(Default)]
pub struct LogOverlayRenderer {
    last_status: Option<OverlayStatus>,
}

impl OverlayRenderer for LogOverlayRenderer {
    fn render(&mut self, view: &OverlayView) {
        if self.last_status != Some(view.status) {
            self.last_status = Some(view.status);
            log::info!("Overlay {:?}", view.status);
        }
        if view.latest.is_some() {
            log::debug!("Overlay: {}", view.badge());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::shared::detection_result::DetectionResult;

    /// Records every rendered view.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingRenderer(pub Arc<Mutex<Vec<OverlayView>>>);

    impl OverlayRenderer for RecordingRenderer {
        fn render(&mut self, view: &OverlayView) {
            self.0.lock().unwrap().push(view.clone());
        }
    }

    fn wait_for(views: &Arc<Mutex<Vec<OverlayView>>>, n: usize) -> Vec<OverlayView> {
        for _ in 0..200 {
            let v = views.lock().unwrap().clone();
            if v.len() >= n {
                return v;
            }
            thread::sleep(Duration::from_millis(5));
        }
        views.lock().unwrap().clone()
    }

    #[test]
    fn test_injected_overlay_renders_messages() {
        let recorder = RecordingRenderer::default();
        let views = recorder.0.clone();
        let mut injector = ThreadOverlayInjector::new(Box::new(move || {
            Box::new(recorder.clone()) as Box<dyn OverlayRenderer>
        }));
        let overlay = injector.inject().unwrap();

        overlay
            .send(OverlayMessage::StatusChanged(OverlayStatus::Active))
            .unwrap();
        overlay
            .send(OverlayMessage::Result(DetectionResult::scored(0, 0.9, 1, 1.0, None)))
            .unwrap();
        overlay.send(OverlayMessage::Clear).unwrap();

        let rendered = wait_for(&views, 3);
        assert_eq!(rendered.len(), 3);
        assert_eq!(rendered[1].badge(), "LIVE · 90% · danger");
        assert_eq!(rendered[2], OverlayView::default());
        assert_eq!(injector.injected(), 1);
    }

    #[test]
    fn test_shut_down_overlay_becomes_unreachable() {
        let mut injector = ThreadOverlayInjector::new(Box::new(|| {
            Box::new(LogOverlayRenderer::default()) as Box<dyn OverlayRenderer>
        }));
        let overlay = injector.inject().unwrap();
        overlay.send(OverlayMessage::Shutdown).unwrap();
        let mut unreachable = false;
        for _ in 0..200 {
            if overlay.send(OverlayMessage::Clear).is_err() {
                unreachable = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(unreachable);
    }
}
