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

use cammic_types::{DeviceKind, PermissionPair};
use log::debug;
use std::rc::Rc;

use crate::config::ElementSelectors;
use crate::error::MediaAccessError;
use crate::providers::{DocumentProvider, UiElement, VideoSurface};

/// Handles to the elements of the DOM contract, captured once at init.
///
/// Selects are not cached here: mirrors come and go, so the selector sync
/// looks them up itself.
pub struct UiElements {
    pub status_camera: Rc<dyn UiElement>,
    pub status_microphone: Rc<dyn UiElement>,
    pub loader: Option<Rc<dyn UiElement>>,
    pub waiting_banner: Option<Rc<dyn UiElement>>,
    pub reload_banner: Option<Rc<dyn UiElement>>,
    pub camera_label: Option<Rc<dyn UiElement>>,
    pub microphone_label: Option<Rc<dyn UiElement>>,
    pub preview_video: Option<Rc<dyn VideoSurface>>,
}

impl UiElements {
    /// Fails with `MissingElement` on the first mandatory element not found.
    pub fn capture(
        document: &dyn DocumentProvider,
        selectors: &ElementSelectors,
    ) -> Result<Self, MediaAccessError> {
        for (name, selector) in [
            ("videoSelect", &selectors.video_select),
            ("audioSelect", &selectors.audio_select),
        ] {
            if document.select_widgets(selector).is_empty() {
                return Err(missing(name, selector));
            }
        }

        let required = |name: &'static str, selector: &String| {
            document
                .element(selector)
                .ok_or_else(|| missing(name, selector))
        };
        let optional = |name: &str, selector: &String| {
            let element = document.element(selector);
            if element.is_none() {
                debug!("Optional element {name} ({selector}) not present");
            }
            element
        };

        Ok(Self {
            status_camera: required("statusItemCamera", &selectors.status_item_camera)?,
            status_microphone: required("statusItemMicrophone", &selectors.status_item_microphone)?,
            loader: optional("loader", &selectors.loader),
            waiting_banner: optional("waitingBanner", &selectors.waiting_banner),
            reload_banner: optional("reloadBanner", &selectors.reload_banner),
            camera_label: optional("cameraLabel", &selectors.camera_label),
            microphone_label: optional("microphoneLabel", &selectors.microphone_label),
            preview_video: document.video_surface(&selectors.preview_video),
        })
    }

    pub fn status(&self, kind: DeviceKind) -> &Rc<dyn UiElement> {
        match kind {
            DeviceKind::Camera => &self.status_camera,
            DeviceKind::Microphone => &self.status_microphone,
        }
    }

    pub fn label(&self, kind: DeviceKind) -> Option<&Rc<dyn UiElement>> {
        match kind {
            DeviceKind::Camera => self.camera_label.as_ref(),
            DeviceKind::Microphone => self.microphone_label.as_ref(),
        }
    }

    /// Writes each kind's state into its status element.
    pub fn show_permissions(&self, permissions: &PermissionPair) {
        for kind in DeviceKind::ALL {
            self.status(kind).set_text(permissions.get(kind).as_str());
        }
    }

    pub fn set_loading(&self, loading: bool) {
        set_visible(&self.loader, loading);
    }

    pub fn set_waiting(&self, waiting: bool) {
        set_visible(&self.waiting_banner, waiting);
    }

    /// Hides transient chrome and shows the persistent reload banner.
    pub fn show_reload_required(&self) {
        set_visible(&self.loader, false);
        set_visible(&self.waiting_banner, false);
        set_visible(&self.reload_banner, true);
    }
}

fn set_visible(element: &Option<Rc<dyn UiElement>>, visible: bool) {
    if let Some(element) = element {
        element.set_visible(visible);
    }
}

fn missing(name: &'static str, selector: &str) -> MediaAccessError {
    MediaAccessError::MissingElement {
        name,
        selector: selector.to_string(),
    }
}
