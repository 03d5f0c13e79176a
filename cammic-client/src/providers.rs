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

//! Platform seams of the permission core.
//!
//! Every browser capability the core touches is reached through one of these
//! traits. The `web` module implements them with `web-sys`; tests implement them
//! with in-memory mocks. All futures are `!Send`: the core runs on a single
//! event loop.

use cammic_types::{DeviceDescriptor, DeviceKind, PermissionState, RequestMode};
use futures::future::LocalBoxFuture;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::PlatformError;

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Future returned by provider calls.
pub type ProviderFuture<'a, T> = LocalBoxFuture<'a, PlatformResult<T>>;

/// A registered listener. Dropping the handle (or calling
/// [`remove`](Self::remove)) detaches it.
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    remove: Option<Box<dyn FnOnce()>>,
}

impl ListenerHandle {
    pub fn new<F: FnOnce() + 'static>(remove: F) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// A handle with nothing to detach.
    pub fn noop() -> Self {
        Self { remove: None }
    }

    pub fn remove(self) {
        // Drop does the work.
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("attached", &self.remove.is_some())
            .finish()
    }
}

/// Reads and watches the platform permission registry.
pub trait PermissionsProvider {
    /// False when the platform exposes no permission-query capability at all.
    fn is_supported(&self) -> bool;

    fn query(&self, kind: DeviceKind) -> ProviderFuture<'_, PermissionState>;

    /// Attaches a change listener to the permission status of `kind`.
    fn watch(
        &self,
        kind: DeviceKind,
        on_change: Rc<dyn Fn(PermissionState)>,
    ) -> ProviderFuture<'_, ListenerHandle>;
}

/// How one track kind is constrained in a capture request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackConstraint {
    Disabled,
    Any,
    ExactDevice(String),
}

impl TrackConstraint {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TrackConstraint::Disabled)
    }
}

/// Constraints of a capture request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: TrackConstraint,
    pub audio: TrackConstraint,
}

impl MediaConstraints {
    /// Any device of the kinds covered by `mode`.
    pub fn for_mode(mode: RequestMode) -> Self {
        let pick = |kind| {
            if mode.includes(kind) {
                TrackConstraint::Any
            } else {
                TrackConstraint::Disabled
            }
        };
        Self {
            video: pick(DeviceKind::Camera),
            audio: pick(DeviceKind::Microphone),
        }
    }

    /// Video only, from exactly `device_id`.
    pub fn exact_video(device_id: &str) -> Self {
        Self {
            video: TrackConstraint::ExactDevice(device_id.to_string()),
            audio: TrackConstraint::Disabled,
        }
    }
}

/// Capture and enumeration, i.e. `navigator.mediaDevices`.
pub trait MediaDevicesProvider {
    fn supports_capture(&self) -> bool;

    fn supports_enumeration(&self) -> bool;

    fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> ProviderFuture<'_, Rc<dyn MediaStreamHandle>>;

    fn enumerate_devices(&self) -> ProviderFuture<'_, Vec<DeviceDescriptor>>;
}

/// An open capture stream.
pub trait MediaStreamHandle {
    fn id(&self) -> String;

    fn tracks(&self) -> Vec<Rc<dyn MediaTrackHandle>>;

    /// Lets a platform surface recover its concrete stream type.
    fn as_any(&self) -> &dyn Any;
}

/// One track of a capture stream.
pub trait MediaTrackHandle {
    fn id(&self) -> String;

    /// `"video"` or `"audio"`.
    fn kind(&self) -> String;

    fn is_live(&self) -> bool;

    /// Stops the track. Does not fire the ended listeners.
    fn stop(&self);

    fn on_ended(&self, callback: Rc<dyn Fn()>) -> ListenerHandle;
}

/// A `<video>` element used for the local preview.
pub trait VideoSurface {
    /// True while the element is attached to the document.
    fn is_connected(&self) -> bool;

    /// Id of the stream currently rendered, if any.
    fn current_stream_id(&self) -> Option<String>;

    fn set_stream(&self, stream: Option<&Rc<dyn MediaStreamHandle>>);

    /// Resolves once the element has data to show.
    fn loaded_data(&self) -> LocalBoxFuture<'_, ()>;

    fn play(&self) -> ProviderFuture<'_, ()>;
}

/// Durable key-value storage, i.e. `localStorage`.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// A device `<select>`.
pub trait SelectWidget {
    /// Replaces the option list.
    fn set_options(&self, devices: &[DeviceDescriptor]);

    /// Writes the value without firing change listeners.
    fn set_value(&self, device_id: &str);

    fn value(&self) -> String;

    /// Called with the new value whenever the user changes the selection.
    fn on_change(&self, callback: Rc<dyn Fn(String)>) -> ListenerHandle;
}

/// Any other element the core shows, hides or labels.
pub trait UiElement {
    fn set_visible(&self, visible: bool);

    fn set_text(&self, text: &str);

    /// True once the element has actually been laid out on screen.
    fn is_rendered(&self) -> bool;
}

/// A DOM mutation observer that can be paused around our own writes.
pub trait MutationWatch {
    fn disconnect(&self);
    fn reconnect(&self);
}

/// The document and window around the widget.
pub trait DocumentProvider {
    fn is_hidden(&self) -> bool;

    /// Called every time the document becomes visible.
    fn on_visible(&self, callback: Rc<dyn Fn()>) -> ListenerHandle;

    /// Resolves on the next animation frame. Never resolves while the tab is
    /// hidden, so callers bound the wait.
    fn next_animation_frame(&self) -> LocalBoxFuture<'_, ()>;

    /// Blocking acknowledgement.
    fn alert(&self, message: &str);

    fn reload(&self);

    /// All selects matching `selector`, in document order.
    fn select_widgets(&self, selector: &str) -> Vec<Rc<dyn SelectWidget>>;

    fn element(&self, selector: &str) -> Option<Rc<dyn UiElement>>;

    fn video_surface(&self, selector: &str) -> Option<Rc<dyn VideoSurface>>;

    /// Observes subtree changes of the document body.
    fn observe_mutations(&self, callback: Rc<dyn Fn()>) -> Box<dyn MutationWatch>;
}

/// Identity of an `Rc`'d trait object, usable to tell widgets apart.
pub(crate) fn same_object<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}
