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

use crate::DeviceKind;

/// Which kinds a request or orchestration covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    Camera,
    Microphone,
    Both,
}

impl RequestMode {
    pub fn kinds(&self) -> &'static [DeviceKind] {
        match self {
            RequestMode::Camera => &[DeviceKind::Camera],
            RequestMode::Microphone => &[DeviceKind::Microphone],
            RequestMode::Both => &DeviceKind::ALL,
        }
    }

    pub fn includes(&self, kind: DeviceKind) -> bool {
        self.kinds().contains(&kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Camera => "camera",
            RequestMode::Microphone => "microphone",
            RequestMode::Both => "both",
        }
    }

    /// Capitalised spelling used inside event names (`Request:Both:Start`).
    pub fn title(&self) -> &'static str {
        match self {
            RequestMode::Camera => "Camera",
            RequestMode::Microphone => "Microphone",
            RequestMode::Both => "Both",
        }
    }
}

impl From<DeviceKind> for RequestMode {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Camera => RequestMode::Camera,
            DeviceKind::Microphone => RequestMode::Microphone,
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of one orchestration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    pub mode: RequestMode,
    #[serde(default = "default_enable_preview")]
    pub enable_preview: bool,
}

fn default_enable_preview() -> bool {
    true
}

impl OrchestrationRequest {
    pub fn new(mode: RequestMode, enable_preview: bool) -> Self {
        Self {
            mode,
            enable_preview,
        }
    }
}
