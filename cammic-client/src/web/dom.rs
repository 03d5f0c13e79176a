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

//! Document, elements and `localStorage`.

use cammic_types::DeviceDescriptor;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use gloo::events::EventListener;
use log::{error, warn};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, HtmlElement, HtmlOptionElement, HtmlSelectElement, HtmlVideoElement, MutationObserver,
    MutationObserverInit, Node, Storage, Window,
};

use super::media::WebMediaStream;
use super::platform_error;
use crate::providers::{
    DocumentProvider, KeyValueStorage, ListenerHandle, MediaStreamHandle, MutationWatch,
    ProviderFuture, SelectWidget, UiElement, VideoSurface,
};

/// `HAVE_CURRENT_DATA`
const HAVE_CURRENT_DATA: u16 = 2;

pub struct WebDocument {
    window: Window,
    document: Document,
    // Wrappers are reused so a select keeps its identity across lookups.
    selects: RefCell<Vec<Rc<WebSelect>>>,
}

impl WebDocument {
    pub fn new() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self {
            window,
            document,
            selects: RefCell::new(Vec::new()),
        })
    }

    fn query(&self, selector: &str) -> Option<web_sys::Element> {
        match self.document.query_selector(selector) {
            Ok(element) => element,
            Err(e) => {
                warn!("Invalid selector {selector}: {}", platform_error(e));
                None
            }
        }
    }
}

impl DocumentProvider for WebDocument {
    fn is_hidden(&self) -> bool {
        self.document.hidden()
    }

    fn on_visible(&self, callback: Rc<dyn Fn()>) -> ListenerHandle {
        let document = self.document.clone();
        let listener = EventListener::new(&self.document, "visibilitychange", move |_| {
            if !document.hidden() {
                callback();
            }
        });
        ListenerHandle::new(move || drop(listener))
    }

    fn next_animation_frame(&self) -> LocalBoxFuture<'_, ()> {
        let (tx, rx) = oneshot::channel();
        let frame = gloo::render::request_animation_frame(move |_| {
            let _ = tx.send(());
        });
        async move {
            let _ = rx.await;
            drop(frame);
        }
        .boxed_local()
    }

    fn alert(&self, message: &str) {
        if let Err(e) = self.window.alert_with_message(message) {
            error!("alert failed: {}", platform_error(e));
        }
    }

    fn reload(&self) {
        if let Err(e) = self.window.location().reload() {
            error!("reload failed: {}", platform_error(e));
        }
    }

    fn select_widgets(&self, selector: &str) -> Vec<Rc<dyn SelectWidget>> {
        let nodes = match self.document.query_selector_all(selector) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Invalid selector {selector}: {}", platform_error(e));
                return Vec::new();
            }
        };
        let mut cache = self.selects.borrow_mut();
        cache.retain(|select| select.element.is_connected());

        let mut found = Vec::new();
        for index in 0..nodes.length() {
            let Some(element) = nodes
                .get(index)
                .and_then(|node| node.dyn_into::<HtmlSelectElement>().ok())
            else {
                continue;
            };
            let select = match cache.iter().find(|select| select.element == element) {
                Some(select) => select.clone(),
                None => {
                    let select = Rc::new(WebSelect { element });
                    cache.push(select.clone());
                    select
                }
            };
            found.push(select as Rc<dyn SelectWidget>);
        }
        found
    }

    fn element(&self, selector: &str) -> Option<Rc<dyn UiElement>> {
        let element = self.query(selector)?.dyn_into::<HtmlElement>().ok()?;
        Some(Rc::new(WebElement { element }))
    }

    fn video_surface(&self, selector: &str) -> Option<Rc<dyn VideoSurface>> {
        let video = self.query(selector)?.dyn_into::<HtmlVideoElement>().ok()?;
        Some(Rc::new(WebVideoSurface { video }))
    }

    fn observe_mutations(&self, callback: Rc<dyn Fn()>) -> Box<dyn MutationWatch> {
        let target: Node = match self.document.body() {
            Some(body) => body.into(),
            None => self.document.clone().into(),
        };
        let closure = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, _observer: MutationObserver| callback(),
        );
        let observer = match MutationObserver::new(closure.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                warn!("MutationObserver unavailable: {}", platform_error(e));
                return Box::new(DetachedWatch);
            }
        };
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        let watch = WebMutationWatch {
            observer,
            target,
            init,
            _closure: closure,
        };
        watch.reconnect();
        Box::new(watch)
    }
}

struct WebMutationWatch {
    observer: MutationObserver,
    target: Node,
    init: MutationObserverInit,
    _closure: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
}

impl MutationWatch for WebMutationWatch {
    fn disconnect(&self) {
        self.observer.disconnect();
    }

    fn reconnect(&self) {
        if let Err(e) = self.observer.observe_with_options(&self.target, &self.init) {
            warn!("Could not observe mutations: {}", platform_error(e));
        }
    }
}

impl Drop for WebMutationWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

struct DetachedWatch;

impl MutationWatch for DetachedWatch {
    fn disconnect(&self) {}
    fn reconnect(&self) {}
}

pub struct WebSelect {
    element: HtmlSelectElement,
}

impl SelectWidget for WebSelect {
    fn set_options(&self, devices: &[DeviceDescriptor]) {
        self.element.set_length(0);
        for (index, device) in devices.iter().enumerate() {
            let option = match HtmlOptionElement::new_with_text_and_value(
                &device.display_label(index),
                &device.device_id,
            ) {
                Ok(option) => option,
                Err(e) => {
                    warn!("Could not create option: {}", platform_error(e));
                    continue;
                }
            };
            if let Err(e) = self.element.append_child(&option) {
                warn!("Could not append option: {}", platform_error(e));
            }
        }
    }

    fn set_value(&self, device_id: &str) {
        self.element.set_value(device_id);
    }

    fn value(&self) -> String {
        self.element.value()
    }

    fn on_change(&self, callback: Rc<dyn Fn(String)>) -> ListenerHandle {
        let element = self.element.clone();
        let listener = EventListener::new(&self.element, "change", move |_| {
            callback(element.value());
        });
        ListenerHandle::new(move || drop(listener))
    }
}

pub struct WebElement {
    element: HtmlElement,
}

impl UiElement for WebElement {
    fn set_visible(&self, visible: bool) {
        self.element.set_hidden(!visible);
    }

    fn set_text(&self, text: &str) {
        self.element.set_text_content(Some(text));
    }

    fn is_rendered(&self) -> bool {
        !self.element.hidden()
            && (self.element.offset_width() > 0 || self.element.offset_height() > 0)
    }
}

pub struct WebVideoSurface {
    video: HtmlVideoElement,
}

impl VideoSurface for WebVideoSurface {
    fn is_connected(&self) -> bool {
        self.video.is_connected()
    }

    fn current_stream_id(&self) -> Option<String> {
        self.video.src_object().map(|stream| stream.id())
    }

    fn set_stream(&self, stream: Option<&Rc<dyn MediaStreamHandle>>) {
        let media_stream = stream.and_then(|stream| {
            let web = stream.as_any().downcast_ref::<WebMediaStream>();
            if web.is_none() {
                warn!("Stream {} is not a browser stream", stream.id());
            }
            web.map(|web| web.stream().clone())
        });
        self.video.set_src_object(media_stream.as_ref());
    }

    fn loaded_data(&self) -> LocalBoxFuture<'_, ()> {
        if self.video.ready_state() >= HAVE_CURRENT_DATA {
            return async {}.boxed_local();
        }
        let (tx, rx) = oneshot::channel();
        let listener = EventListener::once(&self.video, "loadeddata", move |_| {
            let _ = tx.send(());
        });
        async move {
            let _ = rx.await;
            drop(listener);
        }
        .boxed_local()
    }

    fn play(&self) -> ProviderFuture<'_, ()> {
        let promise = self.video.play();
        async move {
            let promise = promise.map_err(platform_error)?;
            JsFuture::from(promise).await.map_err(platform_error)?;
            Ok(())
        }
        .boxed_local()
    }
}

/// `window.localStorage`.
pub struct WebStorage {
    storage: Storage,
}

impl WebStorage {
    /// `None` where storage is blocked, e.g. some private modes.
    pub fn local() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(Self { storage })
    }
}

impl KeyValueStorage for WebStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set_item(key, value) {
            warn!("Could not store {key}: {}", platform_error(e));
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove_item(key) {
            warn!("Could not remove {key}: {}", platform_error(e));
        }
    }
}
