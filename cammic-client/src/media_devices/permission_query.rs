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

use cammic_types::{DeviceKind, PermissionPair, PermissionState};
use futures::channel::oneshot;
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use web_time::Instant;

use crate::constants::PLATFORM_CALL_TIMEOUT_MS;
use crate::event_bus::EventBus;
use crate::events::PermissionEvent;
use crate::platform;
use crate::providers::{ListenerHandle, PermissionsProvider};

/// Reads camera/microphone grant state from the platform.
///
/// Platform queries are serialised: a caller arriving while a query is in
/// flight waits for it (bounded by `wait_timeout`) and then issues its own
/// fresh query, since the state may have changed meanwhile. Each platform
/// call is itself bounded by `call_timeout`.
pub struct PermissionQuery {
    provider: Rc<dyn PermissionsProvider>,
    events: EventBus<PermissionEvent>,
    wait_timeout: Duration,
    call_timeout: Duration,
    in_flight: Cell<bool>,
    waiters: RefCell<Vec<oneshot::Sender<()>>>,
}

/// Releases the query slot and wakes every waiter.
struct QuerySlot<'a> {
    query: &'a PermissionQuery,
}

impl Drop for QuerySlot<'_> {
    fn drop(&mut self) {
        self.query.in_flight.set(false);
        for waiter in self.query.waiters.borrow_mut().drain(..) {
            let _ = waiter.send(());
        }
    }
}

impl PermissionQuery {
    pub fn new(
        provider: Rc<dyn PermissionsProvider>,
        events: EventBus<PermissionEvent>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            events,
            wait_timeout,
            call_timeout: Duration::from_millis(PLATFORM_CALL_TIMEOUT_MS),
            in_flight: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.provider.is_supported()
    }

    /// True while a platform query is running.
    pub fn is_checking(&self) -> bool {
        self.in_flight.get()
    }

    /// Current state of `kind`. Never fails: a missing capability reads as
    /// `Unsupported`, a failing or timed-out query as `Error`.
    pub async fn permission_state(&self, kind: DeviceKind) -> PermissionState {
        if !self.provider.is_supported() {
            return PermissionState::Unsupported;
        }
        let Some(_slot) = self.acquire().await else {
            warn!("Gave up waiting for an in-flight permission check ({kind})");
            return PermissionState::Error;
        };
        self.query_one(kind).await
    }

    /// Checks both kinds, emitting `BeforeCheck` and `Checked`.
    pub async fn check_both(&self) -> PermissionPair {
        self.events.emit(PermissionEvent::BeforeCheck);
        let pair = if !self.provider.is_supported() {
            PermissionPair::new(PermissionState::Unsupported, PermissionState::Unsupported)
        } else {
            match self.acquire().await {
                Some(_slot) => {
                    let camera = self.query_one(DeviceKind::Camera).await;
                    let microphone = self.query_one(DeviceKind::Microphone).await;
                    PermissionPair::new(camera, microphone)
                }
                None => {
                    warn!("Gave up waiting for an in-flight permission check");
                    PermissionPair::error()
                }
            }
        };
        debug!(
            "Permission check: camera={}, microphone={}",
            pair.camera, pair.microphone
        );
        self.events.emit(PermissionEvent::Checked(pair));
        pair
    }

    /// Attaches change listeners for both kinds.
    ///
    /// Each change emits `Changed` and calls `on_change`. Dropping the returned
    /// watch removes every listener. Kinds whose status cannot be watched are
    /// skipped.
    pub async fn subscribe(
        &self,
        on_change: Rc<dyn Fn(DeviceKind, PermissionState)>,
    ) -> PermissionWatch {
        let mut listeners = Vec::new();
        if !self.provider.is_supported() {
            debug!("Permission queries unsupported, nothing to watch");
            return PermissionWatch { listeners };
        }
        for kind in DeviceKind::ALL {
            let events = self.events.clone();
            let on_change = on_change.clone();
            let callback: Rc<dyn Fn(PermissionState)> = Rc::new(move |state: PermissionState| {
                debug!("Permission {kind} changed to {state}");
                events.emit(PermissionEvent::Changed { kind, state });
                on_change(kind, state);
            });
            match platform::timeout(self.call_timeout, self.provider.watch(kind, callback)).await {
                Ok(Ok(listener)) => listeners.push(listener),
                Ok(Err(e)) => warn!("Could not watch {kind} permission: {e}"),
                Err(_) => warn!(
                    "Watching {kind} permission timed out after {:?}",
                    self.call_timeout
                ),
            }
        }
        PermissionWatch { listeners }
    }

    async fn query_one(&self, kind: DeviceKind) -> PermissionState {
        match platform::timeout(self.call_timeout, self.provider.query(kind)).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                warn!("Permission query for {kind} failed: {e}");
                PermissionState::Error
            }
            Err(_) => {
                warn!(
                    "Permission query for {kind} timed out after {:?}",
                    self.call_timeout
                );
                PermissionState::Error
            }
        }
    }

    /// Waits for the query slot. `None` once `wait_timeout` elapsed.
    async fn acquire(&self) -> Option<QuerySlot<'_>> {
        let started = Instant::now();
        while self.in_flight.get() {
            let remaining = self.wait_timeout.checked_sub(started.elapsed())?;
            let (tx, rx) = oneshot::channel();
            self.waiters.borrow_mut().push(tx);
            if platform::timeout(remaining, rx).await.is_err() {
                return None;
            }
        }
        self.in_flight.set(true);
        Some(QuerySlot { query: self })
    }
}

/// Live permission-change subscription.
#[derive(Debug, Default)]
pub struct PermissionWatch {
    listeners: Vec<ListenerHandle>,
}

impl PermissionWatch {
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn unsubscribe(self) {
        // Dropping the handles detaches them.
    }
}
