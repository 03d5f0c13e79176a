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

use cammic_types::{preferred_device_key, DeviceKind};
use log::debug;
use std::rc::Rc;

use crate::providers::KeyValueStorage;

/// Last-chosen device id per kind, persisted under `Preferred-<kind>`.
///
/// Stale ids are not invalidated here; selector population falls back to
/// the first attached device when the stored one is gone.
#[derive(Clone)]
pub struct PreferenceStore {
    storage: Rc<dyn KeyValueStorage>,
}

impl PreferenceStore {
    pub fn new(storage: Rc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn preferred_device(&self, kind: DeviceKind) -> Option<String> {
        self.storage
            .get(&preferred_device_key(kind))
            .filter(|id| !id.is_empty())
    }

    /// Stores `device_id`; `None` or an empty id clears the preference.
    pub fn set_preferred_device(&self, kind: DeviceKind, device_id: Option<&str>) {
        let key = preferred_device_key(kind);
        match device_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                debug!("Preferred {kind} is now {id}");
                self.storage.set(&key, id);
            }
            None => {
                debug!("Cleared preferred {kind}");
                self.storage.remove(&key);
            }
        }
    }
}
