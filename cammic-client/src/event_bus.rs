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

//! Event bus for framework-agnostic permission events.
//!
//! This module provides a MPMC (multi-producer, multi-consumer) broadcast channel.
//! Any component can subscribe to receive messages, and any component holding the
//! bus can emit them. Unlike a process-wide global, a bus belongs to one
//! [`AppContext`](crate::AppContext), so two orchestrators never hear each other.
//!
//! # Example
//!
//! ```ignore
//! use cammic_client::{EventBus, PermissionEvent};
//!
//! let bus = EventBus::<PermissionEvent>::new();
//! let mut rx = bus.subscribe();
//! wasm_bindgen_futures::spawn_local(async move {
//!     while let Ok(event) = rx.recv().await {
//!         match event {
//!             PermissionEvent::AllGranted { .. } => {
//!                 // Handle all granted
//!             }
//!             _ => {}
//!         }
//!     }
//! });
//!
//! bus.emit(PermissionEvent::WatchStarted);
//! ```

use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};
use std::fmt;

use crate::constants::EVENT_BUS_CAPACITY;

/// A cloneable handle to one broadcast channel.
pub struct EventBus<T: Clone> {
    sender: Sender<T>,
    // Keeps the channel open while nobody is subscribed.
    _keep_open: InactiveReceiver<T>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (mut sender, receiver) = broadcast(capacity);
        // When full, the oldest message is dropped to make room.
        sender.set_overflow(true);
        Self {
            sender,
            _keep_open: receiver.deactivate(),
        }
    }

    /// Subscribe to messages.
    ///
    /// Returns a receiver that will receive all future messages.
    /// Each subscriber receives all messages independently (broadcast pattern).
    pub fn subscribe(&self) -> Receiver<T> {
        self.sender.new_receiver()
    }

    /// Emit a message to all subscribers.
    ///
    /// This is a non-blocking operation. Emitting with no active subscriber is
    /// not an error.
    pub fn emit(&self, message: T) {
        let _ = self.sender.try_broadcast(message);
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            _keep_open: self._keep_open.clone(),
        }
    }
}

impl<T: Clone> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
