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

//! Tunables of the permission core.
//!
//! Every field has a default, so a host page only passes the values it wants
//! to change, e.g. `{"retryBackoffMs": 250}`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionsConfig {
    /// Attempts per capture request, the first one included. Denials are never retried.
    pub max_request_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Inactivity safety net of the stream registry.
    pub stream_cleanup_ms: u64,
    pub preview_load_timeout_ms: u64,
    /// How long a permission check waits for one already in flight.
    pub check_wait_timeout_ms: u64,
    /// Upper bound of a single permission query or device enumeration.
    pub platform_call_timeout_ms: u64,
    /// Frames to wait for the waiting UI to report it rendered.
    pub paint_poll_attempts: u32,
    /// Upper bound of a single animation-frame wait (frames stall in hidden tabs).
    pub frame_timeout_ms: u64,
    pub selector_debounce_ms: u64,
    pub reload_message: String,
    pub selectors: ElementSelectors,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            max_request_attempts: MAX_REQUEST_ATTEMPTS,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            stream_cleanup_ms: STREAM_CLEANUP_MS,
            preview_load_timeout_ms: PREVIEW_LOAD_TIMEOUT_MS,
            check_wait_timeout_ms: CHECK_WAIT_TIMEOUT_MS,
            platform_call_timeout_ms: PLATFORM_CALL_TIMEOUT_MS,
            paint_poll_attempts: PAINT_POLL_ATTEMPTS,
            frame_timeout_ms: FRAME_TIMEOUT_MS,
            selector_debounce_ms: SELECTOR_DEBOUNCE_MS,
            reload_message: RELOAD_MESSAGE.to_string(),
            selectors: ElementSelectors::default(),
        }
    }
}

impl PermissionsConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("invalid camera/microphone permissions config")?;
        anyhow::ensure!(
            config.max_request_attempts >= 1,
            "maxRequestAttempts must be at least 1"
        );
        anyhow::ensure!(
            config.platform_call_timeout_ms > 0,
            "platformCallTimeoutMs must be positive"
        );
        Ok(config)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stream_cleanup(&self) -> Duration {
        Duration::from_millis(self.stream_cleanup_ms)
    }

    pub fn preview_load_timeout(&self) -> Duration {
        Duration::from_millis(self.preview_load_timeout_ms)
    }

    pub fn check_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.check_wait_timeout_ms)
    }

    pub fn platform_call_timeout(&self) -> Duration {
        Duration::from_millis(self.platform_call_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn selector_debounce(&self) -> Duration {
        Duration::from_millis(self.selector_debounce_ms)
    }
}

/// Attribute selectors of the DOM contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElementSelectors {
    // Required.
    pub video_select: String,
    pub audio_select: String,
    pub status_item_camera: String,
    pub status_item_microphone: String,
    // Optional.
    pub camera_mirrors: String,
    pub microphone_mirrors: String,
    pub loader: String,
    pub waiting_banner: String,
    pub reload_banner: String,
    pub camera_label: String,
    pub microphone_label: String,
    pub preview_video: String,
}

impl Default for ElementSelectors {
    fn default() -> Self {
        Self {
            video_select: "[data-cammic=\"videoSelect\"]".to_string(),
            audio_select: "[data-cammic=\"audioSelect\"]".to_string(),
            status_item_camera: "[data-cammic=\"statusItemCamera\"]".to_string(),
            status_item_microphone: "[data-cammic=\"statusItemMicrophone\"]".to_string(),
            camera_mirrors: "[data-camera-select]".to_string(),
            microphone_mirrors: "[data-microphone-select]".to_string(),
            loader: "[data-cammic=\"loader\"]".to_string(),
            waiting_banner: "[data-cammic=\"waitingBanner\"]".to_string(),
            reload_banner: "[data-cammic=\"reloadBanner\"]".to_string(),
            camera_label: "[data-cammic=\"cameraLabel\"]".to_string(),
            microphone_label: "[data-cammic=\"microphoneLabel\"]".to_string(),
            preview_video: "[data-cammic=\"previewVideo\"]".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PermissionsConfig::from_json(r#"{"retryBackoffMs": 250}"#).unwrap();
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));
        assert_eq!(config.max_request_attempts, MAX_REQUEST_ATTEMPTS);
        assert_eq!(config.selectors, ElementSelectors::default());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = PermissionsConfig::from_json(r#"{"maxRequestAttempts": 0}"#).unwrap_err();
        assert!(err.to_string().contains("maxRequestAttempts"));
    }

    #[test]
    fn test_platform_call_timeout_configurable() {
        let config = PermissionsConfig::from_json(r#"{"platformCallTimeoutMs": 750}"#).unwrap();
        assert_eq!(config.platform_call_timeout(), Duration::from_millis(750));
        assert!(PermissionsConfig::from_json(r#"{"platformCallTimeoutMs": 0}"#).is_err());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(PermissionsConfig::from_json("{").is_err());
    }

    #[test]
    fn test_default_thresholds() {
        let config = PermissionsConfig::default();
        assert_eq!(config.max_request_attempts, 2);
        assert_eq!(config.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.stream_cleanup(), Duration::from_secs(300));
        assert_eq!(config.platform_call_timeout(), Duration::from_secs(5));
        assert_eq!(config.selectors.camera_mirrors, "[data-camera-select]");
    }
}
