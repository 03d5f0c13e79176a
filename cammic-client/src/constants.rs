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

pub const MAX_REQUEST_ATTEMPTS: u32 = 2;
pub const RETRY_BACKOFF_MS: u64 = 500;

// 5 minutes
pub const STREAM_CLEANUP_MS: u64 = 5 * 60 * 1000;

pub const PREVIEW_LOAD_TIMEOUT_MS: u64 = 2000;
pub const CHECK_WAIT_TIMEOUT_MS: u64 = 5000;

// Permission queries and device enumeration, never prompts.
pub const PLATFORM_CALL_TIMEOUT_MS: u64 = 5000;

pub const PAINT_POLL_ATTEMPTS: u32 = 10;
pub const FRAME_TIMEOUT_MS: u64 = 100;

pub const SELECTOR_DEBOUNCE_MS: u64 = 100;

pub const RELOAD_MESSAGE: &str =
    "Camera or microphone access was blocked. Allow access in your browser settings, then press OK to reload the page.";

pub const EVENT_BUS_CAPACITY: usize = 256;

/// Prefix of every event name dispatched on `window`.
pub const EVENT_PREFIX: &str = "CamMicPermissions";
