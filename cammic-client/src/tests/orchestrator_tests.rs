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

//! End-to-end runs of [`CamMicPermissions`] against the mock platform.

use async_broadcast::Receiver;
use cammic_types::{DeviceKind, PermissionPair, PermissionState, RequestMode};
use std::time::Duration;

use super::mock_platform::*;
use crate::constants::EVENT_PREFIX;
use crate::error::PlatformError;
use crate::events::{Command, PermissionEvent};
use crate::orchestrator::{CamMicPermissions, OrchestratorState};
use crate::providers::{SelectWidget, TrackConstraint, VideoSurface};

fn drain(rx: &mut Receiver<PermissionEvent>) -> Vec<PermissionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn names(events: &[PermissionEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let name = event.name();
            name.strip_prefix(EVENT_PREFIX)
                .and_then(|rest| rest.strip_prefix(':'))
                .unwrap_or(&name)
                .to_string()
        })
        .collect()
}

/// Asserts `expected` appears in `actual` in order, other names in between allowed.
fn assert_in_order(actual: &[String], expected: &[&str]) {
    let mut rest = actual.iter();
    for name in expected {
        assert!(
            rest.any(|candidate| candidate == name),
            "{name} missing or out of order in {actual:?}"
        );
    }
}

fn count(events: &[PermissionEvent], predicate: impl Fn(&PermissionEvent) -> bool) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}

fn is_complete(event: &PermissionEvent) -> bool {
    matches!(event, PermissionEvent::OrchestrateComplete { .. })
}

fn is_reload(event: &PermissionEvent) -> bool {
    matches!(event, PermissionEvent::PageReloadRequired { .. })
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn exact_video_requests(platform: &MockPlatform, device_id: &str) -> usize {
    platform
        .media_devices
        .requests()
        .iter()
        .filter(|c| c.video == TrackConstraint::ExactDevice(device_id.to_string()))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_session_both_accepted() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Prompt, PermissionState::Prompt);
        let permissions = CamMicPermissions::create(platform.context());
        let mut rx = permissions.context().events.subscribe();
        permissions.init().await.unwrap();
        drain(&mut rx);

        let outcome = permissions.orchestrate(RequestMode::Both, true).await;

        let events = drain(&mut rx);
        assert_in_order(
            &names(&events),
            &[
                "BeforeCheck",
                "Checked",
                "ShowWaiting",
                "Request:Both:Start",
                "Request:Both:Success",
                "AllGranted",
                "OrchestrateComplete",
            ],
        );
        let first_check = events.iter().find_map(|event| match event {
            PermissionEvent::Checked(pair) => Some(*pair),
            _ => None,
        });
        assert_eq!(
            first_check,
            Some(PermissionPair::new(PermissionState::Prompt, PermissionState::Prompt))
        );
        assert_eq!(count(&events, is_complete), 1);

        assert!(outcome.success);
        assert!(outcome.preview_enabled);
        assert_eq!(permissions.state(), OrchestratorState::Complete);
        assert_eq!(platform.primary_select(DeviceKind::Camera).value(), "cam-1");
        assert_eq!(platform.primary_select(DeviceKind::Microphone).value(), "mic-1");
        assert_eq!(exact_video_requests(&platform, "cam-1"), 1);

        // Only the preview stream outlives the run.
        let preview = platform.preview_surface();
        assert_eq!(preview.play_count(), 1);
        let preview_id = preview.current_stream_id().unwrap();
        assert_eq!(permissions.registry().stream_ids(), vec![preview_id]);
        let probe = &platform.media_devices.opened_streams()[0];
        assert!(probe.all_stopped());

        let loader = platform.element(&platform.config.selectors.loader);
        let waiting = platform.element(&platform.config.selectors.waiting_banner);
        assert!(!loader.is_visible());
        assert!(!waiting.is_visible());
        assert_eq!(
            platform
                .element(&platform.config.selectors.status_item_camera)
                .text(),
            "granted"
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_previously_denied_camera_escalates_once() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Denied, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        permissions.bind();
        let mut rx = permissions.context().events.subscribe();

        let stream = permissions.request(RequestMode::Camera).await;
        settle().await;

        assert!(stream.is_none());
        assert_eq!(platform.media_devices.request_count(), 1);
        let events = drain(&mut rx);
        let escalations: Vec<_> = events.iter().filter(|e| is_reload(e)).collect();
        assert_eq!(escalations.len(), 1);
        assert!(matches!(
            escalations[0],
            PermissionEvent::PageReloadRequired {
                context: RequestMode::Camera,
                ..
            }
        ));
        assert!(events.iter().any(|event| matches!(
            event,
            PermissionEvent::RequestError { retried: false, .. }
        )));

        assert_eq!(permissions.state(), OrchestratorState::ReloadRequired);
        assert_eq!(platform.document.alerts().len(), 1);
        assert_eq!(platform.document.reload_count(), 1);
        assert!(platform
            .element(&platform.config.selectors.reload_banner)
            .is_visible());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_mirror_selection_drives_primary_and_preview() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let mut devices = default_devices();
        devices.push(camera("abc", "Desk Camera"));
        platform.media_devices.set_devices(devices);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();

        platform.mirror_select(DeviceKind::Camera).user_select("abc");
        settle().await;

        assert_eq!(platform.primary_select(DeviceKind::Camera).value(), "abc");
        assert_eq!(
            permissions.preferences().preferred_device(DeviceKind::Camera),
            Some("abc".to_string())
        );
        assert_eq!(exact_video_requests(&platform, "abc"), 1);
        assert!(platform.preview_surface().current_stream_id().is_some());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_ended_track_unregisters_stream() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());

        let stream = permissions.request(RequestMode::Camera).await.unwrap();
        let id = stream.id();
        assert!(permissions.registry().has_pending_cleanup(&id));

        let mock = platform.media_devices.opened_streams()[0].clone();
        mock.end_track(0);
        settle().await;

        assert!(!permissions.registry().contains(&id));
        assert!(!permissions.registry().has_pending_cleanup(&id));
        let stops = mock.stop_count();
        assert_eq!(permissions.stop_streams(), 0);
        assert_eq!(mock.stop_count(), stops);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_escalation_twice_alerts_once() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        permissions.bind();

        let events = &permissions.context().events;
        for context in [RequestMode::Camera, RequestMode::Microphone] {
            events.emit(PermissionEvent::PageReloadRequired {
                context,
                message: "Permission denied".to_string(),
            });
        }
        settle().await;

        assert_eq!(platform.document.alerts().len(), 1);
        assert_eq!(platform.document.reload_count(), 1);
        assert_eq!(permissions.state(), OrchestratorState::ReloadRequired);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_every_orchestration_completes_exactly_once() {
    let starts = [
        (PermissionState::Granted, PermissionState::Granted, true),
        (PermissionState::Prompt, PermissionState::Prompt, true),
        (PermissionState::Prompt, PermissionState::Prompt, false),
        (PermissionState::Denied, PermissionState::Granted, true),
        (PermissionState::Granted, PermissionState::Denied, true),
        (PermissionState::Prompt, PermissionState::Denied, true),
    ];
    for (camera_state, microphone_state, accept) in starts {
        for mode in [RequestMode::Both, RequestMode::Camera, RequestMode::Microphone] {
            for enable_preview in [true, false] {
                run_local(async {
                    let platform = MockPlatform::new(camera_state, microphone_state);
                    platform.media_devices.set_accept_prompts(accept);
                    let permissions = CamMicPermissions::create(platform.context());
                    permissions.init().await.unwrap();
                    let mut rx = permissions.context().events.subscribe();

                    let outcome = permissions.orchestrate(mode, enable_preview).await;

                    let events = drain(&mut rx);
                    let case = format!(
                        "{camera_state}/{microphone_state} accept={accept} {mode} preview={enable_preview}"
                    );
                    assert_eq!(count(&events, is_complete), 1, "{case}");
                    let expected = mode
                        .kinds()
                        .iter()
                        .all(|kind| platform.permissions.state(*kind).is_granted());
                    assert_eq!(outcome.success, expected, "{case}");
                    assert!(
                        events.iter().any(|event| matches!(
                            event,
                            PermissionEvent::OrchestrateComplete { success, .. } if *success == expected
                        )),
                        "{case}"
                    );
                    assert_eq!(
                        outcome.preview_enabled,
                        enable_preview && mode != RequestMode::Microphone,
                        "{case}"
                    );
                })
                .await;
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_microphone_only_never_previews() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        let mut rx = permissions.context().events.subscribe();

        let outcome = permissions.orchestrate(RequestMode::Microphone, true).await;

        assert!(outcome.success);
        assert!(!outcome.preview_enabled);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, PermissionEvent::AllGranted { .. })));
        assert!(platform
            .media_devices
            .requests()
            .iter()
            .all(|c| !c.video.is_enabled()));
        assert!(platform.preview_surface().current_stream_id().is_none());
        assert_eq!(platform.primary_select(DeviceKind::Microphone).value(), "mic-1");
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_request_is_retried_for_missing_kinds() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Prompt, PermissionState::Prompt);
        for _ in 0..2 {
            platform.media_devices.fail_next_request(PlatformError::new(
                "NotReadableError",
                "Could not start video source",
            ));
        }
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();

        let outcome = permissions.orchestrate(RequestMode::Both, false).await;

        assert_eq!(platform.media_devices.request_count(), 3);
        assert!(outcome.success);
        assert_eq!(permissions.state(), OrchestratorState::Complete);
        assert!(permissions.registry().is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_unpainted_waiting_banner_is_polled_a_bounded_number_of_times() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Prompt, PermissionState::Prompt);
        let banner = platform.element(&platform.config.selectors.waiting_banner);
        banner.set_paints(false);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();

        let outcome = permissions.orchestrate(RequestMode::Both, false).await;

        assert!(outcome.success);
        assert_eq!(
            banner.render_checks(),
            platform.config.paint_poll_attempts as usize
        );
        assert!(!banner.is_visible());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_hidden_tab_does_not_stall_orchestration() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Prompt, PermissionState::Prompt);
        platform
            .document
            .remove_element(&platform.config.selectors.waiting_banner);
        platform.document.set_hidden(true);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();

        let outcome = permissions.orchestrate(RequestMode::Camera, false).await;

        assert!(outcome.success);
        assert_eq!(platform.document.frame_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_denied_orchestration_ends_in_reload_required() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Denied, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        permissions.bind();
        let mut rx = permissions.context().events.subscribe();

        let outcome = permissions.orchestrate(RequestMode::Both, true).await;
        settle().await;

        assert!(!outcome.success);
        assert_eq!(platform.media_devices.request_count(), 1);
        assert_eq!(permissions.state(), OrchestratorState::ReloadRequired);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, PermissionEvent::AllGranted { .. })));
        assert_eq!(count(&events, is_complete), 1);
        assert_eq!(platform.document.alerts().len(), 1);

        // Absorbing: a second run neither leaves the state nor alerts again.
        permissions.orchestrate(RequestMode::Camera, false).await;
        settle().await;
        assert_eq!(permissions.state(), OrchestratorState::ReloadRequired);
        assert_eq!(platform.document.alerts().len(), 1);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_streams_twice() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        permissions.orchestrate(RequestMode::Both, true).await;
        assert!(!permissions.registry().is_empty());

        assert_eq!(permissions.stop_streams(), 1);
        assert!(permissions.registry().is_empty());
        assert!(platform.preview_surface().current_stream_id().is_none());
        assert!(platform
            .media_devices
            .opened_streams()
            .iter()
            .all(|stream| stream.all_stopped()));

        assert_eq!(permissions.stop_streams(), 0);
        assert!(permissions.registry().is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_unbind_all_is_safe_before_init_and_repeated() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        let mut rx = permissions.context().events.subscribe();

        permissions.unbind_all();
        permissions.unbind_all();

        assert_eq!(
            drain(&mut rx),
            vec![
                PermissionEvent::StreamsStopped { count: 0 },
                PermissionEvent::StreamsStopped { count: 0 },
            ]
        );
        permissions.dispose();
        assert_eq!(permissions.state(), OrchestratorState::Idle);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_unbind_all_releases_everything() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        permissions.bind();
        permissions.orchestrate(RequestMode::Both, true).await;
        assert!(permissions.is_watching());
        assert_eq!(platform.permissions.watcher_count(), 2);

        permissions.unbind_all();
        settle().await;

        assert!(!permissions.is_watching());
        assert_eq!(platform.permissions.watcher_count(), 0);
        assert_eq!(platform.mirror_select(DeviceKind::Camera).change_listener_count(), 0);
        assert_eq!(platform.primary_select(DeviceKind::Camera).change_listener_count(), 0);
        assert!(permissions.registry().is_empty());

        // Commands are no longer heard.
        permissions.context().commands.emit(Command::WatchStart);
        settle().await;
        assert!(!permissions.is_watching());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_init_requires_status_elements() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        platform
            .document
            .remove_element(&platform.config.selectors.status_item_camera);
        let permissions = CamMicPermissions::create(platform.context());

        let err = permissions.init().await.err().unwrap();
        assert_eq!(err.reason(), "missing-element");
        assert!(permissions.selectors().is_none());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_over_the_bus() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Prompt);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.bind();
        let mut rx = permissions.context().events.subscribe();
        let commands = permissions.context().commands.clone();

        commands.emit(Command::Init);
        settle().await;
        assert_eq!(
            platform
                .element(&platform.config.selectors.status_item_microphone)
                .text(),
            "prompt"
        );

        commands.emit(Command::WatchStart);
        settle().await;
        assert!(permissions.is_watching());
        platform
            .permissions
            .set_state(DeviceKind::Microphone, PermissionState::Denied);
        assert_eq!(
            platform
                .element(&platform.config.selectors.status_item_microphone)
                .text(),
            "denied"
        );

        commands.emit(Command::Orchestrate {
            mode: RequestMode::Camera,
            enable_preview: false,
        });
        settle().await;
        let events = drain(&mut rx);
        assert!(events.iter().any(|event| matches!(
            event,
            PermissionEvent::OrchestrateComplete {
                mode: RequestMode::Camera,
                success: true,
                ..
            }
        )));

        commands.emit(Command::WatchStop);
        settle().await;
        assert!(!permissions.is_watching());
        assert!(drain(&mut rx).contains(&PermissionEvent::WatchStopped));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_camera_falls_back_to_next_device() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        assert_eq!(platform.primary_select(DeviceKind::Camera).value(), "cam-1");

        platform.media_devices.set_devices(vec![
            camera("cam-2", "USB Camera"),
            microphone("mic-1", "Built-in Microphone"),
        ]);
        permissions.preview_camera("cam-1").await.unwrap();

        assert_eq!(exact_video_requests(&platform, "cam-1"), 0);
        assert_eq!(exact_video_requests(&platform, "cam-2"), 1);
        assert_eq!(platform.primary_select(DeviceKind::Camera).value(), "cam-2");
        assert_eq!(
            platform.primary_select(DeviceKind::Camera).option_ids(),
            vec!["cam-2".to_string()]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_camera_without_fallback_fails() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();

        platform
            .media_devices
            .set_devices(vec![microphone("mic-1", "Built-in Microphone")]);
        let err = permissions.preview_camera("cam-1").await.err().unwrap();

        assert_eq!(err.reason(), "stale-device");
        assert_eq!(platform.media_devices.request_count(), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_dispose_during_preview_start_leaves_no_live_stream() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        let mut rx = permissions.context().events.subscribe();
        platform
            .media_devices
            .set_request_delay(Duration::from_millis(500));

        let starting = permissions.clone();
        let preview =
            tokio::task::spawn_local(async move { starting.preview_camera("cam-1").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        permissions.dispose();
        assert!(preview.await.unwrap().is_ok());
        settle().await;

        assert!(permissions.registry().is_empty());
        assert!(platform.preview_surface().current_stream_id().is_none());
        let opened = platform.media_devices.opened_streams();
        assert_eq!(opened.len(), 1);
        assert!(opened.iter().all(|stream| stream.all_stopped()));
        assert_eq!(
            count(&drain(&mut rx), |event| matches!(
                event,
                PermissionEvent::PreviewStarted { .. }
            )),
            0
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_streams_during_preview_load_skips_playback() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        let surface = platform.preview_surface();
        surface.set_loads(false);

        let starting = permissions.clone();
        let preview =
            tokio::task::spawn_local(async move { starting.preview_camera("cam-1").await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(surface.current_stream_id().is_some());
        assert_eq!(permissions.stop_streams(), 1);
        assert!(preview.await.unwrap().is_ok());

        assert_eq!(surface.play_count(), 0);
        assert!(surface.current_stream_id().is_none());
        assert!(permissions.registry().is_empty());
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_hung_permission_query_still_completes() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = CamMicPermissions::create(platform.context());
        permissions.init().await.unwrap();
        let mut rx = permissions.context().events.subscribe();
        platform
            .permissions
            .set_query_delay(Duration::from_secs(24 * 60 * 60));

        let outcome = tokio::time::timeout(
            Duration::from_secs(600),
            permissions.orchestrate(RequestMode::Both, false),
        )
        .await
        .expect("orchestration is bounded");

        assert!(!outcome.success);
        assert_eq!(outcome.permissions, PermissionPair::error());
        let events = drain(&mut rx);
        assert_eq!(count(&events, is_complete), 1);
        assert_eq!(
            count(&events, |event| matches!(event, PermissionEvent::AllGranted { .. })),
            0
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_watch_stop_during_subscribe_wins() {
    run_local(async {
        let platform = MockPlatform::new(PermissionState::Granted, PermissionState::Granted);
        platform.permissions.set_watch_delay(Duration::from_millis(200));
        let permissions = CamMicPermissions::create(platform.context());
        permissions.bind();
        let mut rx = permissions.context().events.subscribe();
        let commands = permissions.context().commands.clone();

        commands.emit(Command::WatchStart);
        tokio::time::sleep(Duration::from_millis(50)).await;
        commands.emit(Command::WatchStop);
        settle().await;

        assert!(!permissions.is_watching());
        assert_eq!(platform.permissions.watcher_count(), 0);
        assert!(!drain(&mut rx).contains(&PermissionEvent::WatchStarted));

        // A later start is not affected.
        commands.emit(Command::WatchStart);
        settle().await;
        assert!(permissions.is_watching());
        assert_eq!(platform.permissions.watcher_count(), 2);
    })
    .await;
}
