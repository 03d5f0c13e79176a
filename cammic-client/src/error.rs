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

//! Error types of the permission core.

use cammic_types::RequestMode;
use std::fmt;
use thiserror::Error;

/// Exception names the platform uses for a refused capture request.
const DENIAL_NAMES: [&str; 2] = ["NotAllowedError", "SecurityError"];

/// A failure reported by a platform API, shaped like a DOM exception.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True when the platform refused access.
    ///
    /// Matches the standard not-allowed/security exception names, or any
    /// message mentioning "denied". Escalation to a page reload keys off
    /// this, so the message heuristic has to stay.
    pub fn is_denial(&self) -> bool {
        DENIAL_NAMES.contains(&self.name.as_str())
            || self.message.to_lowercase().contains("denied")
    }

    /// True for playback failures caused by a newer load superseding this one.
    pub fn is_interrupted(&self) -> bool {
        self.name == "AbortError" || self.message.to_lowercase().contains("interrupted")
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for PlatformError {}

/// Error taxonomy of the permission core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaAccessError {
    /// The platform lacks the capability entirely. Configuration class, never retried.
    #[error("{capability} is not supported on this platform")]
    Unsupported { capability: &'static str },

    /// The user or a policy refused access. Terminal for the session.
    #[error("access to {context} was denied: {message}")]
    Denied { context: RequestMode, message: String },

    /// Any other request failure.
    #[error("media request failed: {0}")]
    Transient(PlatformError),

    /// A previously valid device id no longer enumerates.
    #[error("device {device_id} is no longer available")]
    StaleDevice { device_id: String },

    /// A bounded wait elapsed.
    #[error("timed out waiting for {what}")]
    Timeout { what: &'static str },

    #[error("device id must not be empty")]
    EmptyDeviceId,

    #[error("video element is not attached to the document")]
    DetachedSurface,

    #[error("playback failed: {0}")]
    Playback(PlatformError),

    /// A mandatory UI element was not found at initialisation.
    #[error("required element `{name}` ({selector}) is missing")]
    MissingElement {
        name: &'static str,
        selector: String,
    },
}

impl MediaAccessError {
    /// Short machine-readable reason, used in `Devices:Error` payloads.
    pub fn reason(&self) -> &'static str {
        match self {
            MediaAccessError::Unsupported { .. } => "unsupported",
            MediaAccessError::Denied { .. } => "denied",
            MediaAccessError::Transient(_) => "transient",
            MediaAccessError::StaleDevice { .. } => "stale-device",
            MediaAccessError::Timeout { .. } => "timeout",
            MediaAccessError::EmptyDeviceId => "empty-device-id",
            MediaAccessError::DetachedSurface => "detached-surface",
            MediaAccessError::Playback(_) => "playback",
            MediaAccessError::MissingElement { .. } => "missing-element",
        }
    }
}
