/// chrome.* extension APIs used by the content script, background and panel

use super::{describe, to_js};
use crate::relay::{Envelope, RelayError};
use js_sys::Function;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

#[wasm_bindgen]
extern "C" {
    /// `chrome.runtime.Port`
    #[wasm_bindgen(extends = js_sys::Object)]
    #[derive(Debug, Clone)]
    pub type Port;

    #[wasm_bindgen(method, getter)]
    pub fn name(this: &Port) -> String;

    #[wasm_bindgen(method, catch, js_name = postMessage)]
    fn post_raw(this: &Port, message: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(method, getter, js_name = onMessage)]
    fn on_message_event(this: &Port) -> ChromeEvent;

    #[wasm_bindgen(method, getter, js_name = onDisconnect)]
    fn on_disconnect_event(this: &Port) -> ChromeEvent;

    /// `chrome.events.Event`
    #[wasm_bindgen(extends = js_sys::Object)]
    #[derive(Debug, Clone)]
    type ChromeEvent;

    #[wasm_bindgen(method, js_name = addListener)]
    fn add_listener(this: &ChromeEvent, callback: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = connect)]
    fn runtime_connect(info: &JsValue) -> Port;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
    async fn runtime_send_message(message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = sendMessage)]
    async fn tabs_send_message(tab_id: i32, message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    fn add_runtime_message_listener(callback: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onConnect"], js_name = addListener)]
    fn add_connect_listener(callback: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "tabs", "onRemoved"], js_name = addListener)]
    fn add_tab_removed_listener(callback: &Function);

    #[wasm_bindgen(catch, js_namespace = ["chrome", "devtools", "panels"], js_name = create)]
    fn devtools_panels_create(title: &str, icon_path: &str, page_path: &str) -> Result<(), JsValue>;
}

impl Port {
    /// Post a serializable message; failures (a disconnected port) are logged.
    pub fn send<T: serde::Serialize>(&self, message: &T) {
        let result = to_js(message).and_then(|value| {
            self.post_raw(&value)
                .map_err(|e| RelayError::Delivery(describe(&e)))
        });
        if let Err(e) = result {
            log::warn!("Could not post to port {}: {}", self.name(), e);
        }
    }

    pub fn on_message(&self, handler: impl FnMut(JsValue) + 'static) {
        let closure = Closure::<dyn FnMut(JsValue)>::new(handler);
        self.on_message_event()
            .add_listener(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    pub fn on_disconnect(&self, handler: impl FnMut() + 'static) {
        let closure = Closure::<dyn FnMut()>::new(handler);
        self.on_disconnect_event()
            .add_listener(closure.as_ref().unchecked_ref());
        closure.forget();
    }
}

/// Open a named long-lived connection to the background
pub fn connect(name: &str) -> Port {
    let info = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&info, &JsValue::from_str("name"), &JsValue::from_str(name));
    runtime_connect(&info)
}

/// One-shot message to the extension runtime; nobody listening is normal
/// and only logged at debug level.
pub fn send_to_runtime(envelope: &Envelope) {
    let kind = envelope.payload.kind();
    match to_js(envelope) {
        Ok(message) => spawn_local(async move {
            if let Err(e) = runtime_send_message(message).await {
                log::debug!("No receiver for {}: {}", kind, describe(&e));
            }
        }),
        Err(e) => log::warn!("Could not encode {}: {}", kind, e),
    }
}

/// One-shot message to the content script of `tab_id`
pub fn send_to_tab(tab_id: i32, envelope: &Envelope) {
    let kind = envelope.payload.kind();
    match to_js(envelope) {
        Ok(message) => spawn_local(async move {
            if let Err(e) = tabs_send_message(tab_id, message).await {
                log::debug!("Tab {} did not take {}: {}", tab_id, kind, describe(&e));
            }
        }),
        Err(e) => log::warn!("Could not encode {}: {}", kind, e),
    }
}

/// `chrome.runtime.onMessage`, with the sending tab's id when there is one
pub fn on_runtime_message(mut handler: impl FnMut(JsValue, Option<i32>) + 'static) {
    let closure = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |message: JsValue, sender: JsValue| {
        let tab_id = js_sys::Reflect::get(&sender, &JsValue::from_str("tab"))
            .ok()
            .filter(|tab| tab.is_object())
            .and_then(|tab| js_sys::Reflect::get(&tab, &JsValue::from_str("id")).ok())
            .and_then(|id| id.as_f64())
            .map(|id| id as i32);
        handler(message, tab_id);
    });
    add_runtime_message_listener(closure.as_ref().unchecked_ref());
    closure.forget();
}

pub fn on_connect(handler: impl FnMut(Port) + 'static) {
    let closure = Closure::<dyn FnMut(Port)>::new(handler);
    add_connect_listener(closure.as_ref().unchecked_ref());
    closure.forget();
}

pub fn on_tab_removed(mut handler: impl FnMut(i32) + 'static) {
    let closure = Closure::<dyn FnMut(JsValue)>::new(move |tab_id: JsValue| {
        if let Some(tab_id) = tab_id.as_f64() {
            handler(tab_id as i32);
        }
    });
    add_tab_removed_listener(closure.as_ref().unchecked_ref());
    closure.forget();
}

/// Register the panel page with the browser's developer tools
pub fn create_panel(title: &str, page_path: &str) -> Result<(), String> {
    devtools_panels_create(title, "", page_path).map_err(|e| format!("Failed to create panel: {:?}", e))
}

/// Tab the devtools window is attached to
pub fn inspected_tab_id() -> Option<i32> {
    super::global_path(&["chrome", "devtools", "inspectedWindow", "tabId"])
        .and_then(|id| id.as_f64())
        .map(|id| id as i32)
}

