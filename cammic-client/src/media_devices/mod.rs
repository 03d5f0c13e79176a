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

mod media_device_access;
mod media_device_list;
mod permission_query;
mod preferences;
mod preview;
mod stream_registry;

pub use media_device_access::{MediaDeviceAccess, RequestOutcome};
pub use media_device_list::{MediaDeviceList, SelectableDevices};
pub use permission_query::{PermissionQuery, PermissionWatch};
pub use preferences::PreferenceStore;
pub use preview::PreviewService;
pub use stream_registry::StreamRegistry;
