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

//! Top-level camera/microphone permission controller.
//!
//! [`CamMicPermissions`] sequences permission checks, the waiting UI, capture
//! requests, selector population and the preview for one
//! [`AppContext`]. Its lifecycle is explicit:
//!
//! ```ignore
//! let permissions = CamMicPermissions::create(ctx);
//! permissions.init().await?;   // capture the DOM contract, first check
//! permissions.bind();          // listen for commands and denials
//! // ...
//! permissions.dispose();
//! ```

use async_broadcast::RecvError;
use cammic_types::{DeviceKind, PermissionPair, PermissionState, RequestMode};
use futures::future::{abortable, AbortHandle};
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::AppContext;
use crate::error::MediaAccessError;
use crate::events::{Command, PermissionEvent};
use crate::media_devices::{
    MediaDeviceAccess, MediaDeviceList, PermissionQuery, PermissionWatch, PreferenceStore,
    PreviewService, RequestOutcome, StreamRegistry,
};
use crate::platform;
use crate::providers::MediaStreamHandle;
use crate::ui::{ReloadRequiredHandler, SelectorSync, UiElements};

/// Where the orchestrator is in its current run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    CheckingPermission,
    AwaitingPrompt,
    Requesting,
    PopulatingDevices,
    Previewing,
    Complete,
    /// Absorbing: once access was denied, only a reload leaves this state.
    ReloadRequired,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What one [`orchestrate`](CamMicPermissions::orchestrate) run ended with.
/// Mirrors the `OrchestrateComplete` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestrationOutcome {
    pub mode: RequestMode,
    pub success: bool,
    pub permissions: PermissionPair,
    pub preview_enabled: bool,
}

struct Inner {
    ctx: AppContext,
    query: PermissionQuery,
    registry: StreamRegistry,
    access: MediaDeviceAccess,
    devices: MediaDeviceList,
    preview: PreviewService,
    preferences: PreferenceStore,
    reload: ReloadRequiredHandler,
    state: Cell<OrchestratorState>,
    elements: RefCell<Option<Rc<UiElements>>>,
    selectors: RefCell<Option<SelectorSync>>,
    watch: RefCell<Option<PermissionWatch>>,
    /// Bumped by every stop so a start still subscribing can tell it lost.
    watch_epoch: Cell<u64>,
    tasks: RefCell<Vec<AbortHandle>>,
}

/// The camera/microphone permission orchestrator. Cheap to clone; clones
/// share one instance.
#[derive(Clone)]
pub struct CamMicPermissions {
    inner: Rc<Inner>,
}

impl CamMicPermissions {
    pub fn create(ctx: AppContext) -> Self {
        let config = ctx.config.clone();
        let registry = StreamRegistry::new(
            ctx.document.clone(),
            ctx.events.clone(),
            config.stream_cleanup(),
        );
        Self {
            inner: Rc::new(Inner {
                query: PermissionQuery::new(
                    ctx.permissions.clone(),
                    ctx.events.clone(),
                    config.check_wait_timeout(),
                )
                .with_call_timeout(config.platform_call_timeout()),
                access: MediaDeviceAccess::new(
                    ctx.media_devices.clone(),
                    registry.clone(),
                    ctx.events.clone(),
                    config.max_request_attempts,
                    config.retry_backoff(),
                ),
                devices: MediaDeviceList::new(ctx.media_devices.clone(), ctx.events.clone())
                    .with_call_timeout(config.platform_call_timeout()),
                preview: PreviewService::new(
                    ctx.media_devices.clone(),
                    registry.clone(),
                    ctx.events.clone(),
                    config.preview_load_timeout(),
                )
                .with_call_timeout(config.platform_call_timeout()),
                preferences: PreferenceStore::new(ctx.storage.clone()),
                reload: ReloadRequiredHandler::new(
                    ctx.document.clone(),
                    config.reload_message.clone(),
                    config.frame_timeout(),
                ),
                registry,
                state: Cell::new(OrchestratorState::Idle),
                elements: RefCell::new(None),
                selectors: RefCell::new(None),
                watch: RefCell::new(None),
                watch_epoch: Cell::new(0),
                tasks: RefCell::new(Vec::new()),
                ctx,
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.ctx
    }

    pub fn state(&self) -> OrchestratorState {
        self.inner.state.get()
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.inner.preferences
    }

    pub fn selectors(&self) -> Option<SelectorSync> {
        self.inner.selectors.borrow().clone()
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watch.borrow().is_some()
    }

    fn set_state(&self, state: OrchestratorState) {
        let current = self.inner.state.get();
        if current == OrchestratorState::ReloadRequired || current == state {
            return;
        }
        debug!("Orchestrator {current} -> {state}");
        self.inner.state.set(state);
    }

    fn elements(&self) -> Option<Rc<UiElements>> {
        self.inner.elements.borrow().clone()
    }

    // === Lifecycle ===

    /// Captures the DOM contract, binds the device selectors and runs the
    /// first permission check. Kinds already granted get their selectors
    /// populated right away.
    pub async fn init(&self) -> Result<PermissionPair, MediaAccessError> {
        let ctx = &self.inner.ctx;
        let elements = Rc::new(UiElements::capture(
            ctx.document.as_ref(),
            &ctx.config.selectors,
        )?);

        // Re-initialising replaces the previous bindings.
        let previous = self.inner.selectors.borrow_mut().take();
        if let Some(previous) = previous {
            previous.unbind();
        }
        let selectors = SelectorSync::new(
            ctx.document.clone(),
            self.inner.preferences.clone(),
            &ctx.config.selectors,
            [elements.camera_label.clone(), elements.microphone_label.clone()],
            ctx.config.selector_debounce(),
        );
        let weak = Rc::downgrade(&self.inner);
        selectors.set_on_selected(Rc::new(move |kind: DeviceKind, device_id: String| {
            if kind != DeviceKind::Camera {
                return;
            }
            let Some(this) = Self::from_weak(&weak) else {
                return;
            };
            platform::spawn_local(async move {
                let _ = this.preview_camera(&device_id).await;
            });
        }));
        selectors.bind();

        *self.inner.elements.borrow_mut() = Some(elements);
        *self.inner.selectors.borrow_mut() = Some(selectors);
        info!("Camera/microphone permissions initialised");

        let permissions = self.check().await;
        for kind in DeviceKind::ALL {
            if permissions.get(kind).is_granted() {
                self.populate(kind).await;
            }
        }
        Ok(permissions)
    }

    /// Starts listening for inbound commands and for denials. Calling it
    /// again while bound is a no-op.
    pub fn bind(&self) {
        if !self.inner.tasks.borrow().is_empty() {
            return;
        }
        let weak = Rc::downgrade(&self.inner);

        let mut commands = self.inner.ctx.commands.subscribe();
        let command_weak = weak.clone();
        let (command_loop, command_handle) = abortable(async move {
            loop {
                match commands.recv().await {
                    Ok(command) => {
                        let Some(this) = Self::from_weak(&command_weak) else {
                            break;
                        };
                        // Commands run concurrently; a long orchestration must
                        // not hold back a stop or watch command.
                        platform::spawn_local(async move { this.handle(command).await });
                    }
                    Err(RecvError::Overflowed(missed)) => {
                        warn!("Command bus overflowed, {missed} command(s) dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut events = self.inner.ctx.events.subscribe();
        let (escalation_loop, escalation_handle) = abortable(async move {
            loop {
                match events.recv().await {
                    Ok(PermissionEvent::PageReloadRequired { context, .. }) => {
                        let Some(this) = Self::from_weak(&weak) else {
                            break;
                        };
                        this.set_state(OrchestratorState::ReloadRequired);
                        this.inner.reload.handle(this.elements(), context).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Overflowed(missed)) => {
                        debug!("Escalation listener skipped {missed} event(s)");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        platform::spawn_local(async move {
            let _ = command_loop.await;
        });
        platform::spawn_local(async move {
            let _ = escalation_loop.await;
        });
        self.inner
            .tasks
            .borrow_mut()
            .extend([command_handle, escalation_handle]);
        debug!("Command and escalation listeners bound");
    }

    /// Removes every listener, stops watching, and stops every stream. Safe
    /// to call repeatedly and before [`init`](Self::init).
    pub fn unbind_all(&self) {
        for task in self.inner.tasks.borrow_mut().drain(..) {
            task.abort();
        }
        self.stop_watching();
        if let Some(selectors) = self.selectors() {
            selectors.unbind();
        }
        self.stop_streams();
    }

    /// Tears the instance down. The page has to `init` again to reuse it.
    pub fn dispose(&self) {
        self.unbind_all();
        self.inner.selectors.borrow_mut().take();
        self.inner.elements.borrow_mut().take();
        self.inner.state.set(OrchestratorState::Idle);
        info!("Camera/microphone permissions disposed");
    }

    /// Runs one inbound command.
    pub async fn handle(&self, command: Command) {
        debug!("Handling {}", command.name());
        match command {
            Command::Init => {
                if let Err(e) = self.init().await {
                    error!("Initialisation failed: {e}");
                }
            }
            Command::Check => {
                self.check().await;
            }
            Command::RequestCamera => {
                self.request(RequestMode::Camera).await;
            }
            Command::RequestMicrophone => {
                self.request(RequestMode::Microphone).await;
            }
            Command::RequestBoth => {
                self.request(RequestMode::Both).await;
            }
            Command::StopStreams => {
                self.stop_streams();
            }
            Command::Orchestrate {
                mode,
                enable_preview,
            } => {
                self.orchestrate(mode, enable_preview).await;
            }
            Command::WatchStart => self.start_watching().await,
            Command::WatchStop => self.stop_watching(),
            Command::StartPreview { device_id } => {
                let _ = self.preview_camera(&device_id).await;
            }
        }
    }

    // === Operations ===

    /// Checks both kinds and shows the result in the status elements.
    pub async fn check(&self) -> PermissionPair {
        let permissions = self.inner.query.check_both().await;
        if let Some(elements) = self.elements() {
            elements.show_permissions(&permissions);
        }
        permissions
    }

    /// Requests `mode` outside an orchestration run. The stream, if any, is
    /// owned by the registry.
    pub async fn request(&self, mode: RequestMode) -> Option<Rc<dyn MediaStreamHandle>> {
        let outcome = self.request_with_loader(mode).await;
        self.check().await;
        outcome.and_then(RequestOutcome::into_stream)
    }

    /// Stops every registered stream and detaches the preview. A preview
    /// still starting is abandoned.
    pub fn stop_streams(&self) -> usize {
        self.inner.preview.cancel();
        if let Some(surface) = self.elements().and_then(|e| e.preview_video.clone()) {
            if surface.current_stream_id().is_some() {
                surface.set_stream(None);
            }
        }
        self.inner.registry.stop_all()
    }

    /// Subscribes to permission changes unless already watching.
    pub async fn start_watching(&self) {
        if self.is_watching() {
            return;
        }
        let epoch = self.inner.watch_epoch.get();
        let weak = Rc::downgrade(&self.inner);
        let watch = self
            .inner
            .query
            .subscribe(Rc::new(move |kind: DeviceKind, state: PermissionState| {
                if let Some(this) = Self::from_weak(&weak) {
                    this.on_permission_changed(kind, state);
                }
            }))
            .await;
        if self.inner.watch_epoch.get() != epoch {
            debug!("Watching was stopped while subscribing");
            return;
        }
        let mut slot = self.inner.watch.borrow_mut();
        if slot.is_some() {
            // A concurrent start won; this one is dropped.
            return;
        }
        *slot = Some(watch);
        drop(slot);
        self.inner.ctx.events.emit(PermissionEvent::WatchStarted);
    }

    pub fn stop_watching(&self) {
        self.inner.watch_epoch.set(self.inner.watch_epoch.get() + 1);
        let watch = self.inner.watch.borrow_mut().take();
        if let Some(watch) = watch {
            watch.unsubscribe();
            self.inner.ctx.events.emit(PermissionEvent::WatchStopped);
        }
    }

    /// Shows camera `device_id` on the preview surface.
    ///
    /// A device that no longer enumerates is replaced by the next attached
    /// camera, which is then previewed instead.
    pub async fn preview_camera(&self, device_id: &str) -> Result<(), MediaAccessError> {
        let surface = self
            .elements()
            .and_then(|e| e.preview_video.clone())
            .ok_or_else(|| MediaAccessError::MissingElement {
                name: "previewVideo",
                selector: self.inner.ctx.config.selectors.preview_video.clone(),
            })?;

        match self.inner.preview.start_preview(&surface, device_id).await {
            Err(MediaAccessError::StaleDevice { .. }) => {
                warn!("Camera {device_id} is gone, falling back to the next one");
                let Some(fallback) = self.populate(DeviceKind::Camera).await else {
                    return Err(MediaAccessError::StaleDevice {
                        device_id: device_id.to_string(),
                    });
                };
                if fallback == device_id {
                    return Err(MediaAccessError::StaleDevice {
                        device_id: device_id.to_string(),
                    });
                }
                self.inner.preview.start_preview(&surface, &fallback).await
            }
            result => result,
        }
    }

    /// Runs one full permission orchestration for `mode`.
    ///
    /// Never fails: the outcome, also emitted as `OrchestrateComplete`, tells
    /// whether every kind of `mode` ended up granted.
    pub async fn orchestrate(&self, mode: RequestMode, enable_preview: bool) -> OrchestrationOutcome {
        let kinds = mode.kinds();
        let preview_enabled = enable_preview && mode.includes(DeviceKind::Camera);
        info!("Orchestrating {mode} (preview: {preview_enabled})");

        self.set_state(OrchestratorState::CheckingPermission);
        let initial = self.check().await;

        if initial.any_in(kinds, PermissionState::Prompt) {
            self.set_state(OrchestratorState::AwaitingPrompt);
            self.show_waiting(mode).await;
        }

        self.start_watching().await;

        self.set_state(OrchestratorState::Requesting);
        let mut probes = Vec::new();
        let mut denied = false;
        let first = self.request_with_loader(mode).await;
        denied |= first.as_ref().is_some_and(RequestOutcome::is_denied);
        probes.extend(first.as_ref().and_then(|o| o.stream()).map(|s| s.id()));

        let after_request = self.check().await;
        let missing: Vec<DeviceKind> = kinds
            .iter()
            .copied()
            .filter(|kind| {
                let state = after_request.get(*kind);
                !state.is_granted() && state != PermissionState::Denied
            })
            .collect();
        if !denied && first.is_some() && !missing.is_empty() {
            let retry_mode = match missing.as_slice() {
                [kind] => RequestMode::from(*kind),
                _ => RequestMode::Both,
            };
            info!("{retry_mode} still not granted, requesting once more");
            let retry = self.request_with_loader(retry_mode).await;
            denied |= retry.as_ref().is_some_and(RequestOutcome::is_denied);
            probes.extend(retry.as_ref().and_then(|o| o.stream()).map(|s| s.id()));
        }

        self.set_state(OrchestratorState::PopulatingDevices);
        let permissions = self.check().await;
        for kind in kinds {
            if permissions.get(*kind).is_granted() {
                self.populate(*kind).await;
            }
        }
        if let Some(elements) = self.elements() {
            elements.set_waiting(false);
        }

        // Streams opened only to raise the prompt; a preview opens its own.
        for stream_id in probes {
            self.inner.registry.unregister(&stream_id);
        }

        let success = permissions.all_granted(kinds);
        if success && mode != RequestMode::Microphone {
            self.inner.ctx.events.emit(PermissionEvent::AllGranted {
                camera: permissions.camera.is_granted(),
                microphone: permissions.microphone.is_granted(),
                auto_preview: preview_enabled,
            });
            if preview_enabled {
                self.set_state(OrchestratorState::Previewing);
                self.preview_selected_camera().await;
            }
        }

        self.set_state(if denied {
            OrchestratorState::ReloadRequired
        } else {
            OrchestratorState::Complete
        });
        if success {
            info!("Orchestration of {mode} complete");
        } else {
            warn!(
                "Orchestration of {mode} ended without access (camera: {}, microphone: {})",
                permissions.camera, permissions.microphone
            );
        }
        let outcome = OrchestrationOutcome {
            mode,
            success,
            permissions,
            preview_enabled,
        };
        self.inner
            .ctx
            .events
            .emit(PermissionEvent::OrchestrateComplete {
                mode,
                success,
                permissions,
                preview_enabled,
            });
        outcome
    }

    // === Steps ===

    /// `None` when capture is unsupported; that error is already reported.
    async fn request_with_loader(&self, mode: RequestMode) -> Option<RequestOutcome> {
        let elements = self.elements();
        if let Some(elements) = &elements {
            elements.set_loading(true);
        }
        let outcome = self.inner.access.request(mode).await;
        if let Some(elements) = &elements {
            elements.set_loading(false);
        }
        outcome.ok()
    }

    /// Announces the upcoming prompt and waits, bounded, until the waiting
    /// banner reports it is on screen.
    async fn show_waiting(&self, mode: RequestMode) {
        self.inner
            .ctx
            .events
            .emit(PermissionEvent::ShowWaiting { mode });
        let config = &self.inner.ctx.config;
        let banner = self.elements().and_then(|e| e.waiting_banner.clone());
        let Some(banner) = banner else {
            // Give event listeners one frame to react.
            self.next_frame().await;
            return;
        };
        banner.set_visible(true);
        for _ in 0..config.paint_poll_attempts {
            if banner.is_rendered() {
                debug!("Waiting banner rendered");
                return;
            }
            self.next_frame().await;
        }
        warn!(
            "Waiting banner not rendered after {} frame(s), requesting anyway",
            config.paint_poll_attempts
        );
    }

    async fn next_frame(&self) {
        let _ = platform::timeout(
            self.inner.ctx.config.frame_timeout(),
            self.inner.ctx.document.next_animation_frame(),
        )
        .await;
    }

    /// Refreshes the selector of `kind` from a fresh enumeration and returns
    /// its selection.
    async fn populate(&self, kind: DeviceKind) -> Option<String> {
        let devices = match self.inner.devices.inputs(kind).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Could not list {kind} devices: {e}");
                return None;
            }
        };
        match self.selectors() {
            Some(selectors) => selectors.populate(kind, devices),
            None => {
                debug!("No selectors bound, skipping {kind} population");
                devices.first().map(|d| d.device_id.clone())
            }
        }
    }

    async fn preview_selected_camera(&self) {
        let selected = self
            .selectors()
            .and_then(|s| s.selected(DeviceKind::Camera));
        match selected {
            Some(device_id) => {
                let _ = self.preview_camera(&device_id).await;
            }
            None => warn!("No camera to preview"),
        }
    }

    fn on_permission_changed(&self, kind: DeviceKind, state: PermissionState) {
        if let Some(elements) = self.elements() {
            elements.status(kind).set_text(state.as_str());
        }
    }
}

impl fmt::Debug for CamMicPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CamMicPermissions")
            .field("state", &self.state())
            .field("streams", &self.inner.registry.len())
            .field("watching", &self.is_watching())
            .finish()
    }
}
