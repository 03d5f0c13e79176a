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

//! Shared data model for the camera/microphone permission core.
//!
//! Nothing in here touches a browser API, so these types can be used by the
//! core, by UI crates, and by native tests alike. Wire spellings follow the
//! strings the page already uses (`"granted"`, `"videoinput"`, `"both"`...).

pub mod device;
pub mod permission;
pub mod request;

pub use device::{preferred_device_key, DeviceDescriptor, DeviceKind, MediaDeviceKind};
pub use permission::{PermissionPair, PermissionState};
pub use request::{OrchestrationRequest, RequestMode};

/// Prefix of the durable storage key holding the last chosen device of a kind.
pub const PREFERRED_DEVICE_KEY_PREFIX: &str = "Preferred-";
