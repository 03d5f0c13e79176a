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

//! Keeps every device `<select>` of a kind in lockstep.
//!
//! One [`SelectableDevices`] model per kind is the source of truth. The
//! primary select and its mirrors only render that model and report user
//! changes back to it; they never read each other. Our own writes are done
//! with the mutation observer disconnected, and DOM rewrites by the host page
//! trigger a debounced rescan that binds new mirrors and renders into them.

use cammic_types::{DeviceDescriptor, DeviceKind};
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::config::ElementSelectors;
use crate::media_devices::{PreferenceStore, SelectableDevices};
use crate::platform::Timeout;
use crate::providers::{
    same_object, DocumentProvider, ListenerHandle, MutationWatch, SelectWidget, UiElement,
};

/// Called with the kind and device id after the user picked a device.
pub type SelectionCallback = Rc<dyn Fn(DeviceKind, String)>;

struct BoundWidget {
    widget: Rc<dyn SelectWidget>,
    _listener: ListenerHandle,
}

struct SelectorGroup {
    kind: DeviceKind,
    primary: String,
    mirrors: String,
    label: Option<Rc<dyn UiElement>>,
    model: RefCell<SelectableDevices>,
    widgets: RefCell<Vec<BoundWidget>>,
}

struct SyncShared {
    document: Rc<dyn DocumentProvider>,
    preferences: PreferenceStore,
    camera: SelectorGroup,
    microphone: SelectorGroup,
    debounce: Duration,
    writing: Cell<bool>,
    watch: RefCell<Option<Box<dyn MutationWatch>>>,
    rescan: RefCell<Option<Timeout>>,
    on_selected: RefCell<Option<SelectionCallback>>,
}

#[derive(Clone)]
pub struct SelectorSync {
    shared: Rc<SyncShared>,
}

impl SelectorSync {
    pub fn new(
        document: Rc<dyn DocumentProvider>,
        preferences: PreferenceStore,
        selectors: &ElementSelectors,
        labels: [Option<Rc<dyn UiElement>>; 2],
        debounce: Duration,
    ) -> Self {
        let [camera_label, microphone_label] = labels;
        let group = |kind, primary: &String, mirrors: &String, label| SelectorGroup {
            kind,
            primary: primary.clone(),
            mirrors: mirrors.clone(),
            label,
            model: RefCell::new(SelectableDevices::new()),
            widgets: RefCell::new(Vec::new()),
        };
        Self {
            shared: Rc::new(SyncShared {
                camera: group(
                    DeviceKind::Camera,
                    &selectors.video_select,
                    &selectors.camera_mirrors,
                    camera_label,
                ),
                microphone: group(
                    DeviceKind::Microphone,
                    &selectors.audio_select,
                    &selectors.microphone_mirrors,
                    microphone_label,
                ),
                document,
                preferences,
                debounce,
                writing: Cell::new(false),
                watch: RefCell::new(None),
                rescan: RefCell::new(None),
                on_selected: RefCell::new(None),
            }),
        }
    }

    pub fn set_on_selected(&self, callback: SelectionCallback) {
        *self.shared.on_selected.borrow_mut() = Some(callback);
    }

    /// Binds the current widgets and starts observing the document.
    pub fn bind(&self) {
        SyncShared::rescan(&self.shared);
        if self.shared.watch.borrow().is_some() {
            return;
        }
        let weak = Rc::downgrade(&self.shared);
        let watch = self.shared.document.observe_mutations(Rc::new(move || {
            if let Some(shared) = weak.upgrade() {
                SyncShared::schedule_rescan(&shared);
            }
        }));
        *self.shared.watch.borrow_mut() = Some(watch);
    }

    /// Detaches every listener, the observer, and any pending rescan.
    pub fn unbind(&self) {
        self.shared.rescan.borrow_mut().take();
        self.shared.watch.borrow_mut().take();
        for kind in DeviceKind::ALL {
            self.shared.group(kind).widgets.borrow_mut().clear();
        }
    }

    /// Rebuilds the options of `kind` from `devices` and renders them.
    ///
    /// The stored preference is selected if still attached, else the first
    /// device. Returns the selected device id.
    pub fn populate(&self, kind: DeviceKind, devices: Vec<DeviceDescriptor>) -> Option<String> {
        let preferred = self.shared.preferences.preferred_device(kind);
        let group = self.shared.group(kind);
        group
            .model
            .borrow_mut()
            .set_devices(devices, preferred.as_deref());
        self.shared.render(group);
        let selected = self.selected(kind);
        debug!(
            "Populated {kind} selector with {} device(s), selected {selected:?}",
            group.model.borrow().devices().len()
        );
        selected
    }

    pub fn selected(&self, kind: DeviceKind) -> Option<String> {
        self.shared
            .group(kind)
            .model
            .borrow()
            .selected()
            .map(str::to_string)
    }

    pub fn devices(&self, kind: DeviceKind) -> Vec<DeviceDescriptor> {
        self.shared.group(kind).model.borrow().devices().to_vec()
    }

    /// Number of widgets currently bound for `kind`.
    pub fn widget_count(&self, kind: DeviceKind) -> usize {
        self.shared.group(kind).widgets.borrow().len()
    }

    /// Selects `device_id` as if the user had picked it.
    pub fn select(&self, kind: DeviceKind, device_id: &str) -> bool {
        SyncShared::user_selected(&self.shared, kind, device_id)
    }
}

impl SyncShared {
    fn group(&self, kind: DeviceKind) -> &SelectorGroup {
        match kind {
            DeviceKind::Camera => &self.camera,
            DeviceKind::Microphone => &self.microphone,
        }
    }

    /// Runs `write` with the mutation observer disconnected.
    fn paused_writes(&self, write: impl FnOnce()) {
        let was_writing = self.writing.replace(true);
        let watch = self.watch.borrow();
        if let Some(watch) = watch.as_ref() {
            watch.disconnect();
        }
        write();
        if let Some(watch) = watch.as_ref() {
            watch.reconnect();
        }
        self.writing.set(was_writing);
    }

    fn render(&self, group: &SelectorGroup) {
        let model = group.model.borrow();
        let selected = model.selected().unwrap_or_default();
        self.paused_writes(|| {
            for bound in group.widgets.borrow().iter() {
                bound.widget.set_options(model.devices());
                bound.widget.set_value(selected);
            }
        });
        if let (Some(label), Some(text)) = (&group.label, model.selected_label()) {
            label.set_text(&text);
        }
    }

    fn schedule_rescan(this: &Rc<Self>) {
        if this.writing.get() {
            return;
        }
        let weak: Weak<Self> = Rc::downgrade(this);
        // Replacing the pending timer restarts the debounce window.
        *this.rescan.borrow_mut() = Some(Timeout::new(this.debounce, move || {
            if let Some(shared) = weak.upgrade() {
                shared.rescan.borrow_mut().take();
                Self::rescan(&shared);
            }
        }));
    }

    /// Binds widgets that appeared, drops those that vanished, and renders
    /// the model into any new ones.
    fn rescan(this: &Rc<Self>) {
        for group in [&this.camera, &this.microphone] {
            let kind = group.kind;
            let mut found = this.document.select_widgets(&group.primary);
            found.extend(this.document.select_widgets(&group.mirrors));

            let mut widgets = group.widgets.borrow_mut();
            let before = widgets.len();
            widgets.retain(|bound| found.iter().any(|w| same_object(w, &bound.widget)));
            let removed = before - widgets.len();

            let mut added = 0;
            for widget in found {
                if widgets.iter().any(|bound| same_object(&bound.widget, &widget)) {
                    continue;
                }
                let weak = Rc::downgrade(this);
                let listener = widget.on_change(Rc::new(move |value: String| {
                    if let Some(shared) = weak.upgrade() {
                        Self::user_selected(&shared, kind, &value);
                    }
                }));
                widgets.push(BoundWidget {
                    widget,
                    _listener: listener,
                });
                added += 1;
            }
            drop(widgets);

            if added > 0 || removed > 0 {
                debug!("{kind} selectors: {added} bound, {removed} dropped");
                if !group.model.borrow().devices().is_empty() {
                    this.render(group);
                }
            }
        }
    }

    fn user_selected(this: &Rc<Self>, kind: DeviceKind, device_id: &str) -> bool {
        if this.writing.get() || device_id.is_empty() {
            return false;
        }
        let group = this.group(kind);
        if group.model.borrow().selected() == Some(device_id) {
            return false;
        }
        let selected = group.model.borrow_mut().select(device_id);
        if !selected {
            warn!("Ignoring selection of unknown {kind} {device_id}");
            this.render(group);
            return false;
        }

        debug!("User selected {kind} {device_id}");
        this.preferences.set_preferred_device(kind, Some(device_id));
        this.render(group);
        let callback = this.on_selected.borrow().clone();
        if let Some(callback) = callback {
            callback(kind, device_id.to_string());
        }
        true
    }
}
