/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use cammic_types::RequestMode;
use log::{debug, info};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::platform;
use crate::providers::DocumentProvider;
use crate::ui::UiElements;

/// Frames the reload banner gets to paint before the blocking alert.
const PAINT_FRAMES: usize = 2;

/// Turns a denial into the banner, alert, reload sequence. Runs at most once
/// per page lifetime.
pub struct ReloadRequiredHandler {
    document: Rc<dyn DocumentProvider>,
    message: String,
    frame_timeout: Duration,
    armed: Cell<bool>,
}

impl ReloadRequiredHandler {
    pub fn new(document: Rc<dyn DocumentProvider>, message: String, frame_timeout: Duration) -> Self {
        Self {
            document,
            message,
            frame_timeout,
            armed: Cell::new(false),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    /// Returns false if a reload is already pending.
    pub async fn handle(&self, elements: Option<Rc<UiElements>>, context: RequestMode) -> bool {
        if self.armed.replace(true) {
            debug!("Reload already pending, ignoring {context} denial");
            return false;
        }
        info!("{context} access denied, page reload required");
        if let Some(elements) = elements {
            elements.show_reload_required();
        }
        for _ in 0..PAINT_FRAMES {
            // Frames stall in hidden tabs.
            let _ = platform::timeout(self.frame_timeout, self.document.next_animation_frame()).await;
        }
        self.document.alert(&self.message);
        self.document.reload();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElementSelectors;
    use crate::providers::UiElement;
    use crate::tests::mock_platform::MockDocument;

    fn handler(document: &Rc<MockDocument>) -> ReloadRequiredHandler {
        ReloadRequiredHandler::new(
            document.clone(),
            "Please reload".to_string(),
            Duration::from_millis(100),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_runs_once() {
        let selectors = ElementSelectors::default();
        let document = Rc::new(MockDocument::with_elements(&selectors));
        let elements = Rc::new(UiElements::capture(document.as_ref(), &selectors).unwrap());
        document.mock_element(&selectors.loader).set_visible(true);
        let handler = handler(&document);

        let (first, second) = futures::join!(
            handler.handle(Some(elements.clone()), RequestMode::Camera),
            handler.handle(Some(elements.clone()), RequestMode::Both),
        );

        assert!(first);
        assert!(!second);
        assert_eq!(document.alerts(), vec!["Please reload".to_string()]);
        assert_eq!(document.reload_count(), 1);
        assert!(document.frame_count() >= 2);
        assert!(document.mock_element(&selectors.reload_banner).is_visible());
        assert!(!document.mock_element(&selectors.loader).is_visible());

        assert!(!handler.handle(None, RequestMode::Microphone).await);
        assert_eq!(document.alerts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_tab_does_not_block_alert() {
        let document = Rc::new(MockDocument::new());
        document.set_hidden(true);
        let handler = handler(&document);

        assert!(handler.handle(None, RequestMode::Microphone).await);
        assert_eq!(document.frame_count(), 0);
        assert_eq!(document.alerts().len(), 1);
    }
}
