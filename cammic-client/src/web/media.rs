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

//! `navigator.permissions` and `navigator.mediaDevices`.

use cammic_types::{DeviceDescriptor, DeviceKind, MediaDeviceKind, PermissionState};
use futures::FutureExt;
use gloo::events::EventListener;
use gloo::utils::window;
use js_sys::{Array, Object, Reflect};
use std::any::Any;
use std::rc::Rc;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    MediaDeviceInfo, MediaDevices, MediaStream, MediaStreamConstraints, MediaStreamTrack,
    MediaStreamTrackState, PermissionStatus, Permissions,
};

use super::platform_error;
use crate::error::PlatformError;
use crate::providers::{
    ListenerHandle, MediaConstraints, MediaDevicesProvider, MediaStreamHandle, MediaTrackHandle,
    PermissionsProvider, PlatformResult, ProviderFuture, TrackConstraint,
};

fn has_property(target: &JsValue, name: &str) -> bool {
    Reflect::has(target, &JsValue::from_str(name)).unwrap_or(false)
}

fn permission_state(state: web_sys::PermissionState) -> PermissionState {
    match state {
        web_sys::PermissionState::Granted => PermissionState::Granted,
        web_sys::PermissionState::Denied => PermissionState::Denied,
        web_sys::PermissionState::Prompt => PermissionState::Prompt,
        _ => PermissionState::Error,
    }
}

/// The Permissions API. Absent in some embedded browsers.
pub struct WebPermissions {
    permissions: Option<Permissions>,
}

impl WebPermissions {
    pub fn new() -> Self {
        let navigator = window().navigator();
        let permissions = if has_property(&navigator, "permissions") {
            navigator.permissions().ok()
        } else {
            None
        };
        Self { permissions }
    }

    async fn status(&self, kind: DeviceKind) -> PlatformResult<PermissionStatus> {
        let permissions = self.permissions.as_ref().ok_or_else(|| {
            PlatformError::new("NotSupportedError", "Permissions API unavailable")
        })?;
        let descriptor = Object::new();
        Reflect::set(
            &descriptor,
            &JsValue::from_str("name"),
            &JsValue::from_str(kind.as_str()),
        )
        .map_err(platform_error)?;
        let promise = permissions.query(&descriptor).map_err(platform_error)?;
        JsFuture::from(promise)
            .await
            .map_err(platform_error)?
            .dyn_into::<PermissionStatus>()
            .map_err(platform_error)
    }
}

impl Default for WebPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionsProvider for WebPermissions {
    fn is_supported(&self) -> bool {
        self.permissions.is_some()
    }

    fn query(&self, kind: DeviceKind) -> ProviderFuture<'_, PermissionState> {
        async move {
            let status = self.status(kind).await?;
            Ok(permission_state(status.state()))
        }
        .boxed_local()
    }

    fn watch(
        &self,
        kind: DeviceKind,
        on_change: Rc<dyn Fn(PermissionState)>,
    ) -> ProviderFuture<'_, ListenerHandle> {
        async move {
            let status = self.status(kind).await?;
            let target = status.clone();
            let listener = EventListener::new(&status, "change", move |_| {
                on_change(permission_state(target.state()));
            });
            Ok(ListenerHandle::new(move || drop(listener)))
        }
        .boxed_local()
    }
}

/// Capture and enumeration through `navigator.mediaDevices`. Absent on
/// insecure origins.
pub struct WebMediaDevices {
    devices: Option<MediaDevices>,
}

impl WebMediaDevices {
    pub fn new() -> Self {
        let navigator = window().navigator();
        let devices = if has_property(&navigator, "mediaDevices") {
            navigator.media_devices().ok()
        } else {
            None
        };
        Self { devices }
    }

    fn devices(&self) -> PlatformResult<MediaDevices> {
        self.devices
            .clone()
            .ok_or_else(|| PlatformError::new("NotSupportedError", "mediaDevices unavailable"))
    }
}

impl Default for WebMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

fn track_constraint(constraint: &TrackConstraint) -> PlatformResult<JsValue> {
    match constraint {
        TrackConstraint::Disabled => Ok(JsValue::from_bool(false)),
        TrackConstraint::Any => Ok(JsValue::from_bool(true)),
        TrackConstraint::ExactDevice(device_id) => {
            let exact = Object::new();
            Reflect::set(
                &exact,
                &JsValue::from_str("exact"),
                &JsValue::from_str(device_id),
            )
            .map_err(platform_error)?;
            let track = Object::new();
            Reflect::set(&track, &JsValue::from_str("deviceId"), &exact).map_err(platform_error)?;
            Ok(track.into())
        }
    }
}

fn descriptor(info: &MediaDeviceInfo) -> Option<DeviceDescriptor> {
    let kind = match info.kind() {
        web_sys::MediaDeviceKind::Videoinput => MediaDeviceKind::VideoInput,
        web_sys::MediaDeviceKind::Audioinput => MediaDeviceKind::AudioInput,
        web_sys::MediaDeviceKind::Audiooutput => MediaDeviceKind::AudioOutput,
        _ => return None,
    };
    Some(DeviceDescriptor::new(info.device_id(), kind, info.label()))
}

impl MediaDevicesProvider for WebMediaDevices {
    fn supports_capture(&self) -> bool {
        self.devices
            .as_ref()
            .is_some_and(|devices| has_property(devices, "getUserMedia"))
    }

    fn supports_enumeration(&self) -> bool {
        self.devices
            .as_ref()
            .is_some_and(|devices| has_property(devices, "enumerateDevices"))
    }

    fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> ProviderFuture<'_, Rc<dyn MediaStreamHandle>> {
        async move {
            let devices = self.devices()?;
            let js_constraints = MediaStreamConstraints::new();
            js_constraints.set_video(&track_constraint(&constraints.video)?);
            js_constraints.set_audio(&track_constraint(&constraints.audio)?);
            let promise = devices
                .get_user_media_with_constraints(&js_constraints)
                .map_err(platform_error)?;
            let stream = JsFuture::from(promise)
                .await
                .map_err(platform_error)?
                .dyn_into::<MediaStream>()
                .map_err(platform_error)?;
            Ok(Rc::new(WebMediaStream::new(stream)) as Rc<dyn MediaStreamHandle>)
        }
        .boxed_local()
    }

    fn enumerate_devices(&self) -> ProviderFuture<'_, Vec<DeviceDescriptor>> {
        async move {
            let devices = self.devices()?;
            let promise = devices.enumerate_devices().map_err(platform_error)?;
            let list = JsFuture::from(promise)
                .await
                .map_err(platform_error)?
                .dyn_into::<Array>()
                .map_err(platform_error)?;
            Ok(list
                .iter()
                .filter_map(|value| value.dyn_into::<MediaDeviceInfo>().ok())
                .filter_map(|info| descriptor(&info))
                .collect())
        }
        .boxed_local()
    }
}

pub struct WebMediaStream {
    stream: MediaStream,
}

impl WebMediaStream {
    pub fn new(stream: MediaStream) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }
}

impl MediaStreamHandle for WebMediaStream {
    fn id(&self) -> String {
        self.stream.id()
    }

    fn tracks(&self) -> Vec<Rc<dyn MediaTrackHandle>> {
        self.stream
            .get_tracks()
            .iter()
            .filter_map(|value| value.dyn_into::<MediaStreamTrack>().ok())
            .map(|track| Rc::new(WebTrack { track }) as Rc<dyn MediaTrackHandle>)
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct WebTrack {
    track: MediaStreamTrack,
}

impl MediaTrackHandle for WebTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> String {
        self.track.kind()
    }

    fn is_live(&self) -> bool {
        self.track.ready_state() == MediaStreamTrackState::Live
    }

    fn stop(&self) {
        self.track.stop();
    }

    fn on_ended(&self, callback: Rc<dyn Fn()>) -> ListenerHandle {
        let listener = EventListener::new(&self.track, "ended", move |_| callback());
        ListenerHandle::new(move || drop(listener))
    }
}
