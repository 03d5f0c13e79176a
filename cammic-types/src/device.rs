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

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::PREFERRED_DEVICE_KEY_PREFIX;

/// A permission/device category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Microphone,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Camera, DeviceKind::Microphone];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Camera => "camera",
            DeviceKind::Microphone => "microphone",
        }
    }

    /// The enumeration kind of the input devices backing this category.
    pub fn input_kind(&self) -> MediaDeviceKind {
        match self {
            DeviceKind::Camera => MediaDeviceKind::VideoInput,
            DeviceKind::Microphone => MediaDeviceKind::AudioInput,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind reported by device enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaDeviceKind {
    #[serde(rename = "videoinput")]
    VideoInput,
    #[serde(rename = "audioinput")]
    AudioInput,
    #[serde(rename = "audiooutput")]
    AudioOutput,
}

impl MediaDeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaDeviceKind::VideoInput => "videoinput",
            MediaDeviceKind::AudioInput => "audioinput",
            MediaDeviceKind::AudioOutput => "audiooutput",
        }
    }

    /// Parses the platform spelling; unknown kinds yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "videoinput" => Some(MediaDeviceKind::VideoInput),
            "audioinput" => Some(MediaDeviceKind::AudioInput),
            "audiooutput" => Some(MediaDeviceKind::AudioOutput),
            _ => None,
        }
    }
}

/// One entry of a device enumeration.
///
/// A `device_id` is only valid for as long as the device stays attached, so a
/// descriptor kept around must be checked against a fresh enumeration before
/// it is used to open a stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub kind: MediaDeviceKind,
    pub label: String,
}

impl DeviceDescriptor {
    pub fn new(device_id: impl Into<String>, kind: MediaDeviceKind, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            label: label.into(),
        }
    }

    /// Label to show in a selector. Browsers hide labels until access is
    /// granted, so fall back to a numbered placeholder.
    pub fn display_label(&self, index: usize) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }
        match self.kind {
            MediaDeviceKind::VideoInput => format!("Camera {}", index + 1),
            MediaDeviceKind::AudioInput => format!("Microphone {}", index + 1),
            MediaDeviceKind::AudioOutput => format!("Speaker {}", index + 1),
        }
    }
}

/// Storage key of the preferred device of `kind`, e.g. `Preferred-camera`.
pub fn preferred_device_key(kind: DeviceKind) -> String {
    format!("{PREFERRED_DEVICE_KEY_PREFIX}{}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_device_key() {
        assert_eq!(preferred_device_key(DeviceKind::Camera), "Preferred-camera");
        assert_eq!(
            preferred_device_key(DeviceKind::Microphone),
            "Preferred-microphone"
        );
    }

    #[test]
    fn test_descriptor_wire_format() {
        let device = DeviceDescriptor::new("abc", MediaDeviceKind::VideoInput, "Front");
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["deviceId"], "abc");
        assert_eq!(json["kind"], "videoinput");
        assert_eq!(json["label"], "Front");
    }

    #[test]
    fn test_display_label_falls_back_when_hidden() {
        let device = DeviceDescriptor::new("abc", MediaDeviceKind::AudioInput, "");
        assert_eq!(device.display_label(1), "Microphone 2");
    }

    #[test]
    fn test_parse_media_device_kind() {
        assert_eq!(
            MediaDeviceKind::parse("audiooutput"),
            Some(MediaDeviceKind::AudioOutput)
        );
        assert_eq!(MediaDeviceKind::parse("screen"), None);
        assert_eq!(DeviceKind::Camera.input_kind(), MediaDeviceKind::VideoInput);
    }
}
