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

use std::rc::Rc;

use crate::config::PermissionsConfig;
use crate::event_bus::EventBus;
use crate::events::{Command, PermissionEvent};
use crate::providers::{
    DocumentProvider, KeyValueStorage, MediaDevicesProvider, PermissionsProvider,
};

/// Everything the permission core needs from its host, passed explicitly to
/// every service instead of being read from globals.
#[derive(Clone)]
pub struct AppContext {
    pub permissions: Rc<dyn PermissionsProvider>,
    pub media_devices: Rc<dyn MediaDevicesProvider>,
    pub document: Rc<dyn DocumentProvider>,
    pub storage: Rc<dyn KeyValueStorage>,
    pub config: Rc<PermissionsConfig>,
    /// Outbound events.
    pub events: EventBus<PermissionEvent>,
    /// Inbound commands.
    pub commands: EventBus<Command>,
}

impl AppContext {
    pub fn new(
        permissions: Rc<dyn PermissionsProvider>,
        media_devices: Rc<dyn MediaDevicesProvider>,
        document: Rc<dyn DocumentProvider>,
        storage: Rc<dyn KeyValueStorage>,
        config: PermissionsConfig,
    ) -> Self {
        Self {
            permissions,
            media_devices,
            document,
            storage,
            config: Rc::new(config),
            events: EventBus::new(),
            commands: EventBus::new(),
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("events", &self.events)
            .field("commands", &self.commands)
            .finish()
    }
}
