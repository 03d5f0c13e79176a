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

/// Grant state of a single permission kind.
///
/// Never cached by the core: every decision re-queries the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
    /// The platform has no permission-query capability at all.
    Unsupported,
    /// The query itself failed.
    Error,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
            PermissionState::Unsupported => "unsupported",
            PermissionState::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "granted" => PermissionState::Granted,
            "denied" => PermissionState::Denied,
            "prompt" => PermissionState::Prompt,
            "unsupported" => PermissionState::Unsupported,
            _ => PermissionState::Error,
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera and microphone states read in one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPair {
    pub camera: PermissionState,
    pub microphone: PermissionState,
}

impl PermissionPair {
    pub fn new(camera: PermissionState, microphone: PermissionState) -> Self {
        Self { camera, microphone }
    }

    /// The pair returned when a check could not run.
    pub fn error() -> Self {
        Self::new(PermissionState::Error, PermissionState::Error)
    }

    pub fn get(&self, kind: DeviceKind) -> PermissionState {
        match kind {
            DeviceKind::Camera => self.camera,
            DeviceKind::Microphone => self.microphone,
        }
    }

    pub fn set(&mut self, kind: DeviceKind, state: PermissionState) {
        match kind {
            DeviceKind::Camera => self.camera = state,
            DeviceKind::Microphone => self.microphone = state,
        }
    }

    /// True when every kind in `kinds` is granted.
    pub fn all_granted(&self, kinds: &[DeviceKind]) -> bool {
        kinds.iter().all(|kind| self.get(*kind).is_granted())
    }

    pub fn any_in(&self, kinds: &[DeviceKind], state: PermissionState) -> bool {
        kinds.iter().any(|kind| self.get(*kind) == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_serializes_lowercase_states() {
        let pair = PermissionPair::new(PermissionState::Prompt, PermissionState::Granted);
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, r#"{"camera":"prompt","microphone":"granted"}"#);
    }

    #[test]
    fn test_all_granted_only_considers_requested_kinds() {
        let pair = PermissionPair::new(PermissionState::Granted, PermissionState::Denied);
        assert!(pair.all_granted(&[DeviceKind::Camera]));
        assert!(!pair.all_granted(&DeviceKind::ALL));
        assert!(pair.any_in(&DeviceKind::ALL, PermissionState::Denied));
    }

    #[test]
    fn test_parse_unknown_state_is_error() {
        assert_eq!(PermissionState::parse("granted"), PermissionState::Granted);
        assert_eq!(PermissionState::parse("whatever"), PermissionState::Error);
    }
}
