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

use cammic_types::{DeviceDescriptor, DeviceKind};
use log::{debug, error};
use std::rc::Rc;
use std::time::Duration;

use crate::constants::PLATFORM_CALL_TIMEOUT_MS;
use crate::error::MediaAccessError;
use crate::event_bus::EventBus;
use crate::events::PermissionEvent;
use crate::platform;
use crate::providers::MediaDevicesProvider;

/// A list of input devices of one kind with a current selection, used by
/// the selector widgets.
///
/// The selection always names a listed device: selecting an unknown id is
/// refused, and replacing the list drops a selection that vanished.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectableDevices {
    devices: Vec<DeviceDescriptor>,
    selected: Option<String>,
}

impl SelectableDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the device list and picks a selection: `preferred` if it is
    /// still listed, else the current selection if still listed, else the
    /// first device.
    pub fn set_devices(&mut self, devices: Vec<DeviceDescriptor>, preferred: Option<&str>) {
        self.devices = devices;
        let keep = |id: &str| self.devices.iter().any(|d| d.device_id == id);
        self.selected = preferred
            .filter(|id| keep(*id))
            .map(str::to_string)
            .or_else(|| self.selected.take().filter(|id| keep(id.as_str())))
            .or_else(|| self.devices.first().map(|d| d.device_id.clone()));
    }

    /// Selects `device_id`. Returns false, leaving the selection untouched,
    /// if it is not listed.
    pub fn select(&mut self, device_id: &str) -> bool {
        if self.contains(device_id) {
            self.selected = Some(device_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.device_id == device_id)
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// The selected device id, `None` when the list is empty.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Human-readable label of the selection.
    pub fn selected_label(&self) -> Option<String> {
        let selected = self.selected.as_deref()?;
        self.devices
            .iter()
            .position(|d| d.device_id == selected)
            .map(|i| self.devices[i].display_label(i))
    }
}

/// [MediaDeviceList] queries the platform for the currently attached devices.
///
/// Enumeration is never cached: device ids are only valid while the device
/// stays plugged in, so every caller gets a fresh list.
#[derive(Clone)]
pub struct MediaDeviceList {
    media_devices: Rc<dyn MediaDevicesProvider>,
    events: EventBus<PermissionEvent>,
    call_timeout: Duration,
}

impl MediaDeviceList {
    pub fn new(media_devices: Rc<dyn MediaDevicesProvider>, events: EventBus<PermissionEvent>) -> Self {
        Self {
            media_devices,
            events,
            call_timeout: Duration::from_millis(PLATFORM_CALL_TIMEOUT_MS),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Every attached device. Emits `Devices:Listed` or `Devices:Error`.
    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, MediaAccessError> {
        if !self.media_devices.supports_enumeration() {
            return Err(self.fail(MediaAccessError::Unsupported {
                capability: "device enumeration",
            }));
        }
        let enumeration = self.media_devices.enumerate_devices();
        match platform::timeout(self.call_timeout, enumeration).await {
            Err(_) => Err(self.fail(MediaAccessError::Timeout {
                what: "device enumeration",
            })),
            Ok(Ok(devices)) => {
                debug!("Enumerated {} device(s)", devices.len());
                self.events.emit(PermissionEvent::DevicesListed {
                    count: devices.len(),
                });
                Ok(devices)
            }
            Ok(Err(e)) => Err(self.fail(MediaAccessError::Transient(e))),
        }
    }

    /// Attached input devices of `kind`.
    pub async fn inputs(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, MediaAccessError> {
        let input_kind = kind.input_kind();
        Ok(self
            .list_devices()
            .await?
            .into_iter()
            .filter(|d| d.kind == input_kind)
            .collect())
    }

    /// True if `device_id` is an attached input device of `kind` right now.
    pub async fn has_device(&self, kind: DeviceKind, device_id: &str) -> Result<bool, MediaAccessError> {
        Ok(self
            .inputs(kind)
            .await?
            .iter()
            .any(|d| d.device_id == device_id))
    }

    fn fail(&self, err: MediaAccessError) -> MediaAccessError {
        error!("Device enumeration failed: {err}");
        self.events.emit(PermissionEvent::DevicesError {
            message: err.to_string(),
            reason: err.reason().to_string(),
        });
        err
    }
}
