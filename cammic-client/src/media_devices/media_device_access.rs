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

use cammic_types::RequestMode;
use log::{error, info, warn};
use std::rc::Rc;
use std::time::Duration;

use crate::error::MediaAccessError;
use crate::event_bus::EventBus;
use crate::events::PermissionEvent;
use crate::media_devices::StreamRegistry;
use crate::platform;
use crate::providers::{MediaConstraints, MediaDevicesProvider, MediaStreamHandle};

/// Result of one capture request, after retries.
#[derive(Clone)]
pub enum RequestOutcome {
    /// Access granted; the stream is owned by the registry.
    Granted(Rc<dyn MediaStreamHandle>),
    /// The user or a policy refused. Never retried.
    Denied(MediaAccessError),
    /// Every attempt failed for some other reason.
    Failed(MediaAccessError),
}

impl RequestOutcome {
    pub fn stream(&self) -> Option<&Rc<dyn MediaStreamHandle>> {
        match self {
            RequestOutcome::Granted(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn into_stream(self) -> Option<Rc<dyn MediaStreamHandle>> {
        match self {
            RequestOutcome::Granted(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, RequestOutcome::Denied(_))
    }
}

impl std::fmt::Debug for RequestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestOutcome::Granted(stream) => f.debug_tuple("Granted").field(&stream.id()).finish(),
            RequestOutcome::Denied(e) => f.debug_tuple("Denied").field(e).finish(),
            RequestOutcome::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// [MediaDeviceAccess] requests the user's permission to access the camera,
/// the microphone, or both.
///
/// Events are emitted to the event bus:
/// - `RequestStart` before the first attempt
/// - `RequestSuccess { track_count }` once a stream was obtained and registered
/// - `RequestError { message, retried }` when the request gave up
/// - `PageReloadRequired { context }` when access was denied
///
/// A denial is never retried. Any other failure is retried up to
/// `max_attempts` in total, `backoff` apart.
pub struct MediaDeviceAccess {
    media_devices: Rc<dyn MediaDevicesProvider>,
    registry: StreamRegistry,
    events: EventBus<PermissionEvent>,
    max_attempts: u32,
    backoff: Duration,
}

impl MediaDeviceAccess {
    pub fn new(
        media_devices: Rc<dyn MediaDevicesProvider>,
        registry: StreamRegistry,
        events: EventBus<PermissionEvent>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            media_devices,
            registry,
            events,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub async fn request_camera(
        &self,
    ) -> Result<Option<Rc<dyn MediaStreamHandle>>, MediaAccessError> {
        Ok(self.request(RequestMode::Camera).await?.into_stream())
    }

    pub async fn request_microphone(
        &self,
    ) -> Result<Option<Rc<dyn MediaStreamHandle>>, MediaAccessError> {
        Ok(self.request(RequestMode::Microphone).await?.into_stream())
    }

    pub async fn request_both(&self) -> Result<Option<Rc<dyn MediaStreamHandle>>, MediaAccessError> {
        Ok(self.request(RequestMode::Both).await?.into_stream())
    }

    /// Requests the kinds covered by `mode`.
    ///
    /// Only a platform without capture support is an `Err`; denials and
    /// transient failures are reported through events and the outcome.
    pub async fn request(&self, mode: RequestMode) -> Result<RequestOutcome, MediaAccessError> {
        if !self.media_devices.supports_capture() {
            let err = MediaAccessError::Unsupported {
                capability: "media capture",
            };
            error!("Cannot request {mode} access: {err}");
            self.events.emit(PermissionEvent::RequestError {
                mode,
                message: err.to_string(),
                retried: false,
            });
            return Err(err);
        }

        self.events.emit(PermissionEvent::RequestStart { mode });
        let constraints = MediaConstraints::for_mode(mode);
        let mut attempt = 1;
        loop {
            match self.media_devices.get_user_media(constraints.clone()).await {
                Ok(stream) => {
                    let track_count = stream.tracks().len();
                    info!("{mode} access granted with {track_count} track(s)");
                    self.registry.register(stream.clone());
                    self.events
                        .emit(PermissionEvent::RequestSuccess { mode, track_count });
                    return Ok(RequestOutcome::Granted(stream));
                }
                Err(e) if e.is_denial() => {
                    warn!("{mode} access denied: {e}");
                    self.events.emit(PermissionEvent::RequestError {
                        mode,
                        message: e.to_string(),
                        retried: attempt > 1,
                    });
                    self.events.emit(PermissionEvent::PageReloadRequired {
                        context: mode,
                        message: e.message.clone(),
                    });
                    return Ok(RequestOutcome::Denied(MediaAccessError::Denied {
                        context: mode,
                        message: e.message,
                    }));
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "{mode} request failed (attempt {attempt}/{}): {e}, retrying in {:?}",
                        self.max_attempts, self.backoff
                    );
                    platform::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("{mode} request failed after {attempt} attempt(s): {e}");
                    self.events.emit(PermissionEvent::RequestError {
                        mode,
                        message: e.to_string(),
                        retried: attempt > 1,
                    });
                    return Ok(RequestOutcome::Failed(MediaAccessError::Transient(e)));
                }
            }
        }
    }
}
