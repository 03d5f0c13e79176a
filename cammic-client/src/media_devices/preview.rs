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

use cammic_types::{DeviceKind, RequestMode};
use log::{debug, error, info, warn};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::error::MediaAccessError;
use crate::event_bus::EventBus;
use crate::events::PermissionEvent;
use crate::media_devices::{MediaDeviceList, StreamRegistry};
use crate::platform;
use crate::providers::{MediaConstraints, MediaDevicesProvider, VideoSurface};

/// Drives the local camera preview on a video surface.
///
/// Starting a preview supersedes whatever the surface showed before: the old
/// stream is stopped through the registry before the new one is requested.
/// A start that is superseded or [cancelled](Self::cancel) while it waits
/// releases whatever it opened and never reports `Preview:Started`.
pub struct PreviewService {
    media_devices: Rc<dyn MediaDevicesProvider>,
    device_list: MediaDeviceList,
    registry: StreamRegistry,
    events: EventBus<PermissionEvent>,
    load_timeout: Duration,
    generation: Cell<u64>,
}

impl PreviewService {
    pub fn new(
        media_devices: Rc<dyn MediaDevicesProvider>,
        registry: StreamRegistry,
        events: EventBus<PermissionEvent>,
        load_timeout: Duration,
    ) -> Self {
        Self {
            device_list: MediaDeviceList::new(media_devices.clone(), events.clone()),
            media_devices,
            registry,
            events,
            load_timeout,
            generation: Cell::new(0),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.device_list = self.device_list.with_call_timeout(call_timeout);
        self
    }

    /// Abandons every start still in flight.
    pub fn cancel(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    /// Shows camera `device_id` on `surface`.
    ///
    /// Fails without touching the capture API when the id is empty, the
    /// surface is detached, or the device no longer enumerates. Every failure
    /// is also reported as `Preview:Error`.
    pub async fn start_preview(
        &self,
        surface: &Rc<dyn VideoSurface>,
        device_id: &str,
    ) -> Result<(), MediaAccessError> {
        match self.try_start(surface, device_id).await {
            Ok(true) => {
                info!("Preview started on camera {device_id}");
                self.events.emit(PermissionEvent::PreviewStarted {
                    device_id: device_id.to_string(),
                });
                Ok(())
            }
            Ok(false) => {
                debug!("Preview of {device_id} superseded before it started");
                Ok(())
            }
            Err(e) => {
                error!("Preview of camera {device_id:?} failed: {e}");
                self.events.emit(PermissionEvent::PreviewError {
                    device_id: device_id.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Detaches and stops the surface's stream, if any.
    pub fn stop_preview(&self, surface: &Rc<dyn VideoSurface>) {
        self.cancel();
        if let Some(current) = surface.current_stream_id() {
            surface.set_stream(None);
            self.registry.unregister(&current);
        }
    }

    /// `Ok(false)` when a newer start took over while this one was waiting.
    async fn try_start(
        &self,
        surface: &Rc<dyn VideoSurface>,
        device_id: &str,
    ) -> Result<bool, MediaAccessError> {
        if device_id.is_empty() {
            return Err(MediaAccessError::EmptyDeviceId);
        }
        if !surface.is_connected() {
            return Err(MediaAccessError::DetachedSurface);
        }
        let requested = self.generation.get();
        if !self.device_list.has_device(DeviceKind::Camera, device_id).await? {
            return Err(MediaAccessError::StaleDevice {
                device_id: device_id.to_string(),
            });
        }
        if self.generation.get() != requested {
            return Ok(false);
        }

        self.stop_preview(surface);
        let generation = self.generation.get();

        let stream = match self
            .media_devices
            .get_user_media(MediaConstraints::exact_video(device_id))
            .await
        {
            Ok(stream) => stream,
            Err(e) if e.is_denial() => {
                self.events.emit(PermissionEvent::PageReloadRequired {
                    context: RequestMode::Camera,
                    message: e.message.clone(),
                });
                return Err(MediaAccessError::Denied {
                    context: RequestMode::Camera,
                    message: e.message,
                });
            }
            Err(e) => return Err(MediaAccessError::Transient(e)),
        };

        let stream_id = stream.id();
        self.registry.register(stream.clone());
        if self.generation.get() != generation {
            self.registry.unregister(&stream_id);
            return Ok(false);
        }
        self.registry.retain(&stream_id);
        surface.set_stream(Some(&stream));

        if platform::timeout(self.load_timeout, surface.loaded_data())
            .await
            .is_err()
        {
            warn!(
                "No video data from {device_id} after {:?}, starting playback anyway",
                self.load_timeout
            );
        }
        if self.generation.get() != generation {
            return Ok(false);
        }

        match surface.play().await {
            Ok(()) => {}
            Err(e) if e.is_interrupted() => debug!("Playback of {device_id} interrupted: {e}"),
            Err(e) => return Err(MediaAccessError::Playback(e)),
        }
        Ok(self.generation.get() == generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::providers::{MediaStreamHandle, TrackConstraint};
    use crate::tests::mock_platform::{
        default_devices, run_local, MockDocument, MockMediaDevices, MockVideoSurface,
    };

    const CLEANUP: Duration = Duration::from_secs(300);

    struct Fixture {
        devices: Rc<MockMediaDevices>,
        registry: StreamRegistry,
        preview: PreviewService,
        surface: Rc<MockVideoSurface>,
        rx: async_broadcast::Receiver<PermissionEvent>,
    }

    impl Fixture {
        fn surface(&self) -> Rc<dyn VideoSurface> {
            self.surface.clone()
        }
    }

    fn fixture() -> Fixture {
        let devices = Rc::new(MockMediaDevices::new(default_devices()));
        let events = EventBus::new();
        let rx = events.subscribe();
        let registry = StreamRegistry::new(Rc::new(MockDocument::new()), events.clone(), CLEANUP);
        let preview = PreviewService::new(
            devices.clone(),
            registry.clone(),
            events,
            Duration::from_secs(2),
        );
        Fixture {
            devices,
            registry,
            preview,
            surface: MockVideoSurface::new(),
            rx,
        }
    }

    fn drain(rx: &mut async_broadcast::Receiver<PermissionEvent>) -> Vec<PermissionEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_device_never_reaches_capture() {
        run_local(async {
            let mut f = fixture();
            let err = f
                .preview
                .start_preview(&f.surface(), "deviceId-not-in-enumeration")
                .await
                .unwrap_err();

            assert_eq!(
                err,
                MediaAccessError::StaleDevice {
                    device_id: "deviceId-not-in-enumeration".into()
                }
            );
            assert_eq!(f.devices.request_count(), 0);
            assert!(drain(&mut f.rx)
                .iter()
                .any(|e| matches!(e, PermissionEvent::PreviewError { .. })));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_empty_id_and_detached_surface() {
        run_local(async {
            let f = fixture();
            assert_eq!(
                f.preview.start_preview(&f.surface(), "").await,
                Err(MediaAccessError::EmptyDeviceId)
            );

            f.surface.set_connected(false);
            assert_eq!(
                f.preview.start_preview(&f.surface(), "cam-1").await,
                Err(MediaAccessError::DetachedSurface)
            );
            assert_eq!(f.devices.enumeration_count(), 0);
            assert_eq!(f.devices.request_count(), 0);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_requests_exact_device_and_survives_cleanup() {
        run_local(async {
            let mut f = fixture();
            f.preview.start_preview(&f.surface(), "cam-2").await.unwrap();

            assert_eq!(
                f.devices.requests()[0].video,
                TrackConstraint::ExactDevice("cam-2".into())
            );
            assert!(!f.devices.requests()[0].audio.is_enabled());
            let stream_id = f.surface.current_stream_id().expect("attached");
            assert!(f.registry.contains(&stream_id));
            assert_eq!(f.surface.play_count(), 1);
            assert!(drain(&mut f.rx).contains(&PermissionEvent::PreviewStarted {
                device_id: "cam-2".into()
            }));

            platform::sleep(CLEANUP * 2).await;
            assert!(f.registry.contains(&stream_id));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_preview_stops_previous_stream() {
        run_local(async {
            let f = fixture();
            f.preview.start_preview(&f.surface(), "cam-1").await.unwrap();
            f.preview.start_preview(&f.surface(), "cam-2").await.unwrap();

            let opened = f.devices.opened_streams();
            assert_eq!(opened.len(), 2);
            assert!(opened[0].all_stopped());
            assert_eq!(opened[1].stop_count(), 0);
            assert_eq!(f.registry.len(), 1);
            assert_eq!(f.surface.current_stream_id(), Some(opened[1].id()));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_wait_is_bounded() {
        run_local(async {
            let f = fixture();
            f.surface.set_loads(false);
            let started = tokio::time::Instant::now();

            f.preview.start_preview(&f.surface(), "cam-1").await.unwrap();

            assert!(started.elapsed() >= Duration::from_secs(2));
            assert_eq!(f.surface.play_count(), 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_playback_is_swallowed() {
        run_local(async {
            let f = fixture();
            f.surface.fail_next_play(PlatformError::new(
                "AbortError",
                "The play() request was interrupted by a new load request.",
            ));
            assert!(f.preview.start_preview(&f.surface(), "cam-1").await.is_ok());

            f.surface
                .fail_next_play(PlatformError::new("NotAllowedError", "autoplay blocked"));
            let err = f.preview.start_preview(&f.surface(), "cam-1").await.unwrap_err();
            assert_eq!(err.reason(), "playback");
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_preview_detaches_and_stops() {
        run_local(async {
            let f = fixture();
            f.preview.start_preview(&f.surface(), "cam-1").await.unwrap();
            f.preview.stop_preview(&f.surface());

            assert_eq!(f.surface.current_stream_id(), None);
            assert!(f.registry.is_empty());
            assert!(f.devices.opened_streams()[0].all_stopped());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_requesting_releases_late_stream() {
        run_local(async {
            let mut f = fixture();
            f.devices.set_request_delay(Duration::from_millis(500));
            let surface = f.surface();
            let preview = Rc::new(f.preview);

            let task = tokio::task::spawn_local({
                let preview = preview.clone();
                let surface = surface.clone();
                async move { preview.start_preview(&surface, "cam-1").await }
            });
            platform::sleep(Duration::from_millis(100)).await;
            preview.cancel();
            f.registry.stop_all();

            assert_eq!(task.await.unwrap(), Ok(()));
            platform::sleep(Duration::from_secs(1)).await;

            let opened = f.devices.opened_streams();
            assert_eq!(opened.len(), 1);
            assert!(opened[0].all_stopped());
            assert!(f.registry.is_empty());
            assert_eq!(f.surface.current_stream_id(), None);
            assert_eq!(f.surface.play_count(), 0);
            assert!(!drain(&mut f.rx)
                .iter()
                .any(|e| matches!(e, PermissionEvent::PreviewStarted { .. })));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_loading_skips_playback() {
        run_local(async {
            let mut f = fixture();
            f.surface.set_loads(false);
            let surface = f.surface();
            let preview = Rc::new(f.preview);

            let task = tokio::task::spawn_local({
                let preview = preview.clone();
                let surface = surface.clone();
                async move { preview.start_preview(&surface, "cam-1").await }
            });
            platform::sleep(Duration::from_millis(500)).await;
            assert!(f.surface.current_stream_id().is_some());
            preview.cancel();
            surface.set_stream(None);
            f.registry.stop_all();

            assert_eq!(task.await.unwrap(), Ok(()));
            assert_eq!(f.surface.play_count(), 0);
            assert!(f.devices.opened_streams()[0].all_stopped());
            assert!(!drain(&mut f.rx)
                .iter()
                .any(|e| matches!(e, PermissionEvent::PreviewStarted { .. })));
        })
        .await;
    }
}
