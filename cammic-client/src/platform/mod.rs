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

//! Platform abstraction layer for cammic-client.
//!
//! This module provides cross-platform primitives that abstract over the differences
//! between WASM (browser) and native (test) environments:
//!
//! - **`now_ms()`** — current time in milliseconds since the Unix epoch
//! - **`sleep(duration)`** — suspend the current task
//! - **`spawn_local(future)`** — spawn a `!Send` task on the platform's executor
//! - **`Timeout`** — a one-shot timer that is cancelled when dropped
//! - **`timeout(duration, future)`** — race a future against a deadline
//!
//! The correct implementation is selected at compile time via `cfg(target_arch = "wasm32")`.
//! Native code must run inside a tokio `LocalSet`.

#[cfg(not(target_arch = "wasm32"))]
mod native;
#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(not(target_arch = "wasm32"))]
pub use native::*;
#[cfg(target_arch = "wasm32")]
pub use web::*;

use futures::future::{abortable, select, AbortHandle, Either};
use futures::pin_mut;
use std::future::Future;
use std::time::Duration;

/// Returned by [`timeout`] when the deadline passed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline elapsed")]
pub struct Elapsed;

/// Runs `future` until it completes or `duration` passes, whichever is first.
pub async fn timeout<F: Future>(duration: Duration, future: F) -> Result<F::Output, Elapsed> {
    let deadline = sleep(duration);
    pin_mut!(future);
    pin_mut!(deadline);
    match select(future, deadline).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(_) => Err(Elapsed),
    }
}

/// A one-shot timer.
///
/// The callback runs once after `delay` on the local executor. Dropping the
/// handle (or calling [`cancel`](Self::cancel)) before then prevents it from
/// running.
#[derive(Debug)]
pub struct Timeout {
    handle: AbortHandle,
}

impl Timeout {
    pub fn new<F: FnOnce() + 'static>(delay: Duration, callback: F) -> Self {
        let (task, handle) = abortable(async move {
            sleep(delay).await;
            callback();
        });
        spawn_local(async move {
            let _ = task.await;
        });
        Self { handle }
    }

    pub fn cancel(self) {
        // Drop does the work.
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
