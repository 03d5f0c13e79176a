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

//! Framework-agnostic event types for the permission core.
//!
//! [`PermissionEvent`] flows out of the core, [`Command`] flows in. Both carry a
//! stable event name so the browser bridge can dispatch them as `CustomEvent`s
//! on `window` under the names the page already listens for.

use cammic_types::{DeviceKind, PermissionPair, PermissionState, RequestMode};
use serde_json::{json, Value};

use crate::constants::EVENT_PREFIX;

/// Events emitted by the permission core that UI layers can subscribe to.
#[derive(Clone, Debug, PartialEq)]
pub enum PermissionEvent {
    // === Permission lifecycle ===
    /// A permission check is about to query the platform
    BeforeCheck,

    /// A permission check finished
    Checked(PermissionPair),

    /// The platform reported a state change for one kind
    Changed {
        kind: DeviceKind,
        state: PermissionState,
    },

    WatchStarted,
    WatchStopped,

    // === Request lifecycle ===
    RequestStart {
        mode: RequestMode,
    },

    RequestSuccess {
        mode: RequestMode,
        track_count: usize,
    },

    /// A request gave up. `retried` tells whether a second attempt was made.
    RequestError {
        mode: RequestMode,
        message: String,
        retried: bool,
    },

    // === Stream lifecycle ===
    /// Registered streams were stopped through the registry
    StreamsStopped {
        count: usize,
    },

    // === Preview lifecycle ===
    PreviewStarted {
        device_id: String,
    },

    PreviewError {
        device_id: String,
        message: String,
    },

    // === Device lifecycle ===
    DevicesListed {
        count: usize,
    },

    DevicesError {
        message: String,
        reason: String,
    },

    // === UI choreography ===
    /// The UI should show its "waiting for your answer" state before the browser prompt
    ShowWaiting {
        mode: RequestMode,
    },

    /// Access was denied; the page has to be reloaded after the user changed their settings
    PageReloadRequired {
        context: RequestMode,
        message: String,
    },

    // === Orchestration lifecycle ===
    AllGranted {
        camera: bool,
        microphone: bool,
        auto_preview: bool,
    },

    /// Terminal event of every orchestration run, successful or not
    OrchestrateComplete {
        mode: RequestMode,
        success: bool,
        permissions: PermissionPair,
        preview_enabled: bool,
    },
}

impl PermissionEvent {
    /// Event name dispatched on `window`, e.g. `CamMicPermissions:Request:Both:Start`.
    pub fn name(&self) -> String {
        let suffix = match self {
            PermissionEvent::BeforeCheck => "BeforeCheck".to_string(),
            PermissionEvent::Checked(_) => "Checked".to_string(),
            PermissionEvent::Changed { .. } => "Changed".to_string(),
            PermissionEvent::WatchStarted => "WatchStarted".to_string(),
            PermissionEvent::WatchStopped => "WatchStopped".to_string(),
            PermissionEvent::RequestStart { mode } => format!("Request:{}:Start", mode.title()),
            PermissionEvent::RequestSuccess { mode, .. } => {
                format!("Request:{}:Success", mode.title())
            }
            PermissionEvent::RequestError { mode, .. } => format!("Request:{}:Error", mode.title()),
            PermissionEvent::StreamsStopped { .. } => "Streams:Stopped".to_string(),
            PermissionEvent::PreviewStarted { .. } => "Preview:Started".to_string(),
            PermissionEvent::PreviewError { .. } => "Preview:Error".to_string(),
            PermissionEvent::DevicesListed { .. } => "Devices:Listed".to_string(),
            PermissionEvent::DevicesError { .. } => "Devices:Error".to_string(),
            PermissionEvent::ShowWaiting { .. } => "ShowWaiting".to_string(),
            PermissionEvent::PageReloadRequired { .. } => "PageReloadRequired".to_string(),
            PermissionEvent::AllGranted { .. } => "AllGranted".to_string(),
            PermissionEvent::OrchestrateComplete { .. } => "OrchestrateComplete".to_string(),
        };
        format!("{EVENT_PREFIX}:{suffix}")
    }

    /// JSON payload carried as the `CustomEvent` detail.
    pub fn detail(&self) -> Value {
        match self {
            PermissionEvent::BeforeCheck
            | PermissionEvent::WatchStarted
            | PermissionEvent::WatchStopped => Value::Null,
            PermissionEvent::Checked(pair) => json!(pair),
            PermissionEvent::Changed { kind, state } => json!({ "type": kind, "state": state }),
            PermissionEvent::RequestStart { mode } => json!({ "mode": mode }),
            PermissionEvent::RequestSuccess { mode, track_count } => {
                json!({ "mode": mode, "trackCount": track_count })
            }
            PermissionEvent::RequestError {
                mode,
                message,
                retried,
            } => json!({ "mode": mode, "message": message, "retried": retried }),
            PermissionEvent::StreamsStopped { count } => json!({ "count": count }),
            PermissionEvent::PreviewStarted { device_id } => json!({ "deviceId": device_id }),
            PermissionEvent::PreviewError { device_id, message } => {
                json!({ "deviceId": device_id, "message": message })
            }
            PermissionEvent::DevicesListed { count } => json!({ "count": count }),
            PermissionEvent::DevicesError { message, reason } => {
                json!({ "message": message, "reason": reason })
            }
            PermissionEvent::ShowWaiting { mode } => json!({ "mode": mode }),
            PermissionEvent::PageReloadRequired { context, message } => {
                json!({ "context": context, "message": message })
            }
            PermissionEvent::AllGranted {
                camera,
                microphone,
                auto_preview,
            } => json!({ "camera": camera, "microphone": microphone, "autoPreview": auto_preview }),
            PermissionEvent::OrchestrateComplete {
                mode,
                success,
                permissions,
                preview_enabled,
            } => json!({
                "mode": mode,
                "success": success,
                "permissions": permissions,
                "previewEnabled": preview_enabled,
            }),
        }
    }
}

/// Commands the permission core listens for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Boot signal: capture the UI and run the initial check
    Init,
    Check,
    RequestCamera,
    RequestMicrophone,
    RequestBoth,
    StopStreams,
    Orchestrate {
        mode: RequestMode,
        enable_preview: bool,
    },
    WatchStart,
    WatchStop,
    StartPreview {
        device_id: String,
    },
}

impl Command {
    /// Every inbound event name, for bridges that must register one listener per name.
    pub const EVENT_NAMES: [&'static str; 14] = [
        "CamMicPermissions:Init",
        "CamMicPermissions:RequestCheck",
        "CamMicPermissions:RequestCamera",
        "CamMicPermissions:RequestMicrophone",
        "CamMicPermissions:RequestBoth",
        "CamMicPermissions:RequestStopStreams",
        "CamMicPermissions:OrchestrateBoth",
        "CamMicPermissions:OrchestrateBothNoPreview",
        "CamMicPermissions:OrchestrateCamera",
        "CamMicPermissions:OrchestrateCameraNoPreview",
        "CamMicPermissions:OrchestrateMicrophone",
        "CamMicPermissions:WatchStart",
        "CamMicPermissions:WatchStop",
        "CamMicPermissions:PreviewStart",
    ];

    pub fn name(&self) -> String {
        let suffix = match self {
            Command::Init => "Init",
            Command::Check => "RequestCheck",
            Command::RequestCamera => "RequestCamera",
            Command::RequestMicrophone => "RequestMicrophone",
            Command::RequestBoth => "RequestBoth",
            Command::StopStreams => "RequestStopStreams",
            Command::Orchestrate {
                mode,
                enable_preview,
            } => match (mode, enable_preview) {
                (RequestMode::Both, true) => "OrchestrateBoth",
                (RequestMode::Both, false) => "OrchestrateBothNoPreview",
                (RequestMode::Camera, true) => "OrchestrateCamera",
                (RequestMode::Camera, false) => "OrchestrateCameraNoPreview",
                (RequestMode::Microphone, _) => "OrchestrateMicrophone",
            },
            Command::WatchStart => "WatchStart",
            Command::WatchStop => "WatchStop",
            Command::StartPreview { .. } => "PreviewStart",
        };
        format!("{EVENT_PREFIX}:{suffix}")
    }

    /// Maps an inbound event name (and its detail) to a command.
    ///
    /// Returns `None` for unknown names and for a preview start without a
    /// device id.
    pub fn from_event_name(name: &str, detail: Option<&Value>) -> Option<Command> {
        let suffix = name.strip_prefix(EVENT_PREFIX)?.strip_prefix(':')?;
        let command = match suffix {
            "Init" => Command::Init,
            "RequestCheck" => Command::Check,
            "RequestCamera" => Command::RequestCamera,
            "RequestMicrophone" => Command::RequestMicrophone,
            "RequestBoth" => Command::RequestBoth,
            "RequestStopStreams" => Command::StopStreams,
            "OrchestrateBoth" => Command::orchestrate(RequestMode::Both, true),
            "OrchestrateBothNoPreview" => Command::orchestrate(RequestMode::Both, false),
            "OrchestrateCamera" => Command::orchestrate(RequestMode::Camera, true),
            "OrchestrateCameraNoPreview" => Command::orchestrate(RequestMode::Camera, false),
            // Microphone-only runs never preview.
            "OrchestrateMicrophone" => Command::orchestrate(RequestMode::Microphone, false),
            "WatchStart" => Command::WatchStart,
            "WatchStop" => Command::WatchStop,
            "PreviewStart" => {
                let device_id = detail?.get("deviceId")?.as_str()?;
                if device_id.is_empty() {
                    return None;
                }
                Command::StartPreview {
                    device_id: device_id.to_string(),
                }
            }
            _ => return None,
        };
        Some(command)
    }

    fn orchestrate(mode: RequestMode, enable_preview: bool) -> Command {
        Command::Orchestrate {
            mode,
            enable_preview,
        }
    }
}
