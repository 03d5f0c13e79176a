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

use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::event_bus::EventBus;
use crate::events::PermissionEvent;
use crate::platform::{self, Timeout};
use crate::providers::{DocumentProvider, ListenerHandle, MediaStreamHandle};

/// Owner of every stream the core has opened.
///
/// A stream is stopped exactly once: on [`stop_all`](Self::stop_all), on
/// [`unregister`](Self::unregister), when all its tracks end, or when the
/// inactivity safety net fires. Nothing else may stop its tracks.
#[derive(Clone)]
pub struct StreamRegistry {
    shared: Rc<Shared>,
}

struct Shared {
    document: Rc<dyn DocumentProvider>,
    events: EventBus<PermissionEvent>,
    cleanup_after: Duration,
    streams: RefCell<HashMap<String, StreamEntry>>,
}

struct StreamEntry {
    stream: Rc<dyn MediaStreamHandle>,
    track_listeners: Vec<ListenerHandle>,
    cleanup: Option<Timeout>,
    visibility: Option<ListenerHandle>,
    /// Attached to a preview surface; the safety net leaves it alone.
    retained: bool,
}

impl StreamEntry {
    /// Stops the tracks and releases timers. Listener handles are returned so
    /// the caller can detach them outside any platform callback.
    fn finish(self) -> Vec<ListenerHandle> {
        for track in self.stream.tracks() {
            track.stop();
        }
        drop(self.cleanup);
        let mut listeners = self.track_listeners;
        listeners.extend(self.visibility);
        listeners
    }
}

/// Detaches listeners on a later tick. A listener may be the one currently
/// being dispatched, and browsers do not allow freeing a closure mid-call.
fn detach_later(listeners: Vec<ListenerHandle>) {
    if listeners.is_empty() {
        return;
    }
    platform::spawn_local(async move {
        drop(listeners);
    });
}

impl StreamRegistry {
    pub fn new(
        document: Rc<dyn DocumentProvider>,
        events: EventBus<PermissionEvent>,
        cleanup_after: Duration,
    ) -> Self {
        Self {
            shared: Rc::new(Shared {
                document,
                events,
                cleanup_after,
                streams: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Takes ownership of `stream`. Registering the same stream twice is a no-op.
    pub fn register(&self, stream: Rc<dyn MediaStreamHandle>) {
        let id = stream.id();
        if self.contains(&id) {
            debug!("Stream {id} already registered");
            return;
        }

        let track_listeners = stream
            .tracks()
            .iter()
            .map(|track| {
                let weak = Rc::downgrade(&self.shared);
                let stream_id = id.clone();
                track.on_ended(Rc::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        Shared::on_track_ended(&shared, &stream_id);
                    }
                }))
            })
            .collect();

        debug!(
            "Registering stream {id} with {} track(s)",
            stream.tracks().len()
        );
        self.shared.streams.borrow_mut().insert(
            id.clone(),
            StreamEntry {
                stream,
                track_listeners,
                cleanup: None,
                visibility: None,
                retained: false,
            },
        );
        Shared::arm_cleanup(&self.shared, &id);
    }

    /// Stops and forgets one stream. Returns false if it was not registered.
    pub fn unregister(&self, stream_id: &str) -> bool {
        Shared::unregister(&self.shared, stream_id)
    }

    /// Stops every registered stream and returns how many there were.
    pub fn stop_all(&self) -> usize {
        let entries: Vec<StreamEntry> = self
            .shared
            .streams
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let count = entries.len();
        let mut listeners = Vec::new();
        for entry in entries {
            listeners.extend(entry.finish());
        }
        detach_later(listeners);
        if count > 0 {
            info!("Stopped {count} stream(s)");
        }
        self.shared
            .events
            .emit(PermissionEvent::StreamsStopped { count });
        count
    }

    /// Marks a stream as in use by a preview.
    pub fn retain(&self, stream_id: &str) {
        if let Some(entry) = self.shared.streams.borrow_mut().get_mut(stream_id) {
            entry.retained = true;
        }
    }

    pub fn release(&self, stream_id: &str) {
        if let Some(entry) = self.shared.streams.borrow_mut().get_mut(stream_id) {
            entry.retained = false;
        }
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.shared.streams.borrow().contains_key(stream_id)
    }

    pub fn len(&self) -> usize {
        self.shared.streams.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stream_ids(&self) -> Vec<String> {
        self.shared.streams.borrow().keys().cloned().collect()
    }

    /// True while the safety-net timer of `stream_id` is armed.
    pub fn has_pending_cleanup(&self, stream_id: &str) -> bool {
        self.shared
            .streams
            .borrow()
            .get(stream_id)
            .map(|entry| entry.cleanup.is_some())
            .unwrap_or(false)
    }
}

impl Shared {
    fn unregister(this: &Rc<Self>, stream_id: &str) -> bool {
        let entry = this.streams.borrow_mut().remove(stream_id);
        match entry {
            Some(entry) => {
                debug!("Stopping stream {stream_id}");
                detach_later(entry.finish());
                true
            }
            None => false,
        }
    }

    fn on_track_ended(this: &Rc<Self>, stream_id: &str) {
        let all_ended = match this.streams.borrow().get(stream_id) {
            Some(entry) => entry.stream.tracks().iter().all(|track| !track.is_live()),
            None => return,
        };
        if all_ended {
            debug!("All tracks of stream {stream_id} ended");
            Self::unregister(this, stream_id);
        }
    }

    fn arm_cleanup(this: &Rc<Self>, stream_id: &str) {
        let weak: Weak<Self> = Rc::downgrade(this);
        let id = stream_id.to_string();
        let timer = Timeout::new(this.cleanup_after, move || {
            if let Some(shared) = weak.upgrade() {
                Self::on_cleanup_due(&shared, &id);
            }
        });
        if let Some(entry) = this.streams.borrow_mut().get_mut(stream_id) {
            // Replacing the previous timer cancels it.
            entry.cleanup = Some(timer);
        }
    }

    fn on_cleanup_due(this: &Rc<Self>, stream_id: &str) {
        let retained = match this.streams.borrow_mut().get_mut(stream_id) {
            Some(entry) => {
                entry.cleanup = None;
                entry.retained
            }
            None => return,
        };

        if this.document.is_hidden() {
            debug!("Tab hidden, deferring cleanup check of stream {stream_id}");
            Self::defer_until_visible(this, stream_id);
        } else if retained {
            Self::arm_cleanup(this, stream_id);
        } else {
            info!("Stream {stream_id} idle, stopping it");
            Self::unregister(this, stream_id);
        }
    }

    fn defer_until_visible(this: &Rc<Self>, stream_id: &str) {
        let weak = Rc::downgrade(this);
        let id = stream_id.to_string();
        let listener = this.document.on_visible(Rc::new(move || {
            let weak = weak.clone();
            let id = id.clone();
            platform::spawn_local(async move {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let visibility = match shared.streams.borrow_mut().get_mut(&id) {
                    Some(entry) => entry.visibility.take(),
                    None => return,
                };
                drop(visibility);
                // A fresh full period: the stream was not idle while unseen.
                Self::arm_cleanup(&shared, &id);
            });
        }));
        if let Some(entry) = this.streams.borrow_mut().get_mut(stream_id) {
            entry.visibility = Some(listener);
        }
    }
}
