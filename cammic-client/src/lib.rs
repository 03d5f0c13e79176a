//! This crate implements the camera/microphone permission flow of a browser page. It checks the
//! platform permission state, raises the capture prompt, keeps device selectors in sync, shows a
//! local camera preview and, when access is denied, walks the user through a page reload.
//!
//! The crate makes no assumptions about the page beyond a small DOM contract (see
//! [`ElementSelectors`]). Every browser capability is reached through the traits in
//! [`providers`], so the whole flow runs natively against in-memory doubles in tests. With the
//! `wasm` feature the `web` module implements those traits with `web-sys` and bridges
//! [`PermissionEvent`]s and [`Command`]s to `CustomEvent`s on `window`.
//!
//! # Outline of usage
//!
//! ## Orchestrator creation:
//! ```ignore
//! let ctx = AppContext::new(permissions, media_devices, document, storage, config);
//! let permissions = CamMicPermissions::create(ctx);
//!
//! permissions.init().await?;
//! permissions.bind();
//! ```
//!
//! ## Running a permission flow:
//! ```ignore
//! let outcome = permissions.orchestrate(RequestMode::Both, true).await;
//! if outcome.success {
//!     // both kinds granted, selectors populated, preview playing
//! }
//! permissions.stop_streams();
//! ```
//!
//! ## Driving it from the page:
//! ```ignore
//! window.dispatchEvent(new CustomEvent("CamMicPermissions:OrchestrateBoth"));
//! window.addEventListener("CamMicPermissions:OrchestrateComplete", (e) => { ... });
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod media_devices;
pub mod orchestrator;
pub mod platform;
pub mod providers;
pub mod ui;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod web;

#[cfg(test)]
pub(crate) mod tests;

pub use cammic_types::{
    DeviceDescriptor, DeviceKind, PermissionPair, PermissionState, RequestMode,
};
pub use config::{ElementSelectors, PermissionsConfig};
pub use context::AppContext;
pub use error::{MediaAccessError, PlatformError};
pub use event_bus::EventBus;
pub use events::{Command, PermissionEvent};
pub use media_devices::{
    MediaDeviceAccess, MediaDeviceList, PermissionQuery, PreferenceStore, PreviewService,
    RequestOutcome, SelectableDevices, StreamRegistry,
};
pub use orchestrator::{CamMicPermissions, OrchestrationOutcome, OrchestratorState};

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
    log::info!("cammic-client loaded");
}
