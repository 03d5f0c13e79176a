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

//! Browser bindings.
//!
//! Implements the provider traits with `web-sys` and relays the event buses
//! to `window`: every [`PermissionEvent`] is dispatched as a `CustomEvent`
//! carrying its JSON detail, and every inbound command name is listened for.
//! A page that loads the module calls `install()` once:
//!
//! ```js
//! import init, { install } from "./cammic_client.js";
//! await init();
//! install(JSON.stringify({ maxRequestAttempts: 2 }));
//! window.dispatchEvent(new CustomEvent("CamMicPermissions:Init"));
//! ```

mod dom;
mod media;

pub use dom::{WebDocument, WebElement, WebSelect, WebStorage, WebVideoSurface};
pub use media::{WebMediaDevices, WebMediaStream, WebPermissions, WebTrack};

use async_broadcast::RecvError;
use futures::future::{abortable, AbortHandle};
use gloo::events::EventListener;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CustomEvent, CustomEventInit};

use crate::config::PermissionsConfig;
use crate::context::AppContext;
use crate::error::PlatformError;
use crate::events::{Command, PermissionEvent};
use crate::orchestrator::CamMicPermissions;
use crate::platform;

/// Converts a rejected promise or thrown value.
pub(crate) fn platform_error(value: JsValue) -> PlatformError {
    if let Some(exception) = value.dyn_ref::<web_sys::DomException>() {
        return PlatformError::new(exception.name(), exception.message());
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return PlatformError::new(String::from(error.name()), String::from(error.message()));
    }
    let message = value.as_string().unwrap_or_else(|| format!("{value:?}"));
    PlatformError::new("", message)
}

fn dispatch(event: &PermissionEvent) {
    let name = event.name();
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    let detail = match event.detail().serialize(&serializer) {
        Ok(detail) => detail,
        Err(e) => {
            error!("Could not serialize {name}: {e}");
            return;
        }
    };
    let init = CustomEventInit::new();
    init.set_detail(&detail);
    match CustomEvent::new_with_event_init_dict(&name, &init) {
        Ok(custom) => {
            if let Err(e) = gloo::utils::window().dispatch_event(&custom) {
                error!("Could not dispatch {name}: {}", platform_error(e));
            }
        }
        Err(e) => error!("Could not create {name}: {}", platform_error(e)),
    }
}

fn command_from(name: &'static str, event: &web_sys::Event) -> Option<Command> {
    let detail = event
        .dyn_ref::<CustomEvent>()
        .map(CustomEvent::detail)
        .filter(|detail| !detail.is_undefined() && !detail.is_null())
        .and_then(|detail| serde_wasm_bindgen::from_value::<serde_json::Value>(detail).ok());
    Command::from_event_name(name, detail.as_ref())
}

/// Relays one context's buses to and from `window` while alive.
pub struct EventBridge {
    _listeners: Vec<EventListener>,
    outbound: AbortHandle,
}

impl EventBridge {
    pub fn attach(ctx: &AppContext) -> Self {
        let window = gloo::utils::window();
        let listeners = Command::EVENT_NAMES
            .into_iter()
            .map(|name| {
                let commands = ctx.commands.clone();
                EventListener::new(&window, name, move |event| match command_from(name, event) {
                    Some(command) => commands.emit(command),
                    None => warn!("Ignoring {name} without a usable detail"),
                })
            })
            .collect();

        let mut events = ctx.events.subscribe();
        let (relay, outbound) = abortable(async move {
            loop {
                match events.recv().await {
                    Ok(event) => dispatch(&event),
                    Err(RecvError::Overflowed(missed)) => {
                        warn!("{missed} event(s) not relayed to the page");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        platform::spawn_local(async move {
            let _ = relay.await;
        });
        debug!("Event bridge attached");

        Self {
            _listeners: listeners,
            outbound,
        }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.outbound.abort();
    }
}

struct Installed {
    permissions: CamMicPermissions,
    _bridge: EventBridge,
}

thread_local! {
    static INSTANCE: RefCell<Option<Installed>> = const { RefCell::new(None) };
}

/// Creates the page's orchestrator and wires it to `window`. Installing again
/// replaces the previous instance.
#[wasm_bindgen]
pub fn install(config_json: Option<String>) -> Result<(), JsValue> {
    let config = match config_json {
        Some(json) => {
            PermissionsConfig::from_json(&json).map_err(|e| JsValue::from_str(&format!("{e:#}")))?
        }
        None => PermissionsConfig::default(),
    };
    let document = WebDocument::new().ok_or_else(|| JsValue::from_str("no document"))?;
    let storage = WebStorage::local().ok_or_else(|| JsValue::from_str("localStorage unavailable"))?;

    uninstall();
    let ctx = AppContext::new(
        Rc::new(WebPermissions::new()),
        Rc::new(WebMediaDevices::new()),
        Rc::new(document),
        Rc::new(storage),
        config,
    );
    let permissions = CamMicPermissions::create(ctx);
    permissions.bind();
    let bridge = EventBridge::attach(permissions.context());
    INSTANCE.with(|slot| {
        *slot.borrow_mut() = Some(Installed {
            permissions,
            _bridge: bridge,
        });
    });
    info!("Camera/microphone permissions installed");
    Ok(())
}

/// Disposes the installed orchestrator, if any.
#[wasm_bindgen]
pub fn uninstall() {
    let previous = INSTANCE.with(|slot| slot.borrow_mut().take());
    if let Some(installed) = previous {
        installed.permissions.dispose();
    }
}
