/// wasm-bindgen glue between the host traits and the browser
///
/// Everything in here is only meaningful inside a browser realm. The pure
/// modules never import from `bridge`; entry points in `lib.rs` and the
/// `run` functions of each context are the only callers.

pub mod chrome;
pub mod dom;
pub mod js;

use crate::relay::{Envelope, MessageSink, RelayError};
use js_sys::Reflect;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Best-effort description of a thrown JS value
pub fn describe(error: &JsValue) -> String {
    if let Some(text) = error.as_string() {
        return text;
    }
    if let Some(error) = error.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{:?}", error)
}

/// Serialize for the JS side. Maps become plain objects so the value
/// survives `postMessage` structured cloning.
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, RelayError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| RelayError::Encode(e.to_string()))
}

pub fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, RelayError> {
    serde_wasm_bindgen::from_value(value).map_err(|e| RelayError::Decode(e.to_string()))
}

/// Decode an envelope; anything else is unrelated traffic and only traced.
pub fn envelope(value: JsValue) -> Option<Envelope> {
    match from_js::<Envelope>(value) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            log::trace!("Ignoring message: {}", e);
            None
        }
    }
}

/// Read `globalThis.a.b.c`; `None` as soon as a segment is missing or a
/// getter throws.
pub fn global_path(path: &[&str]) -> Option<JsValue> {
    let mut value: JsValue = js_sys::global().into();
    for segment in path {
        if !value.is_object() && !value.is_function() {
            return None;
        }
        value = Reflect::get(&value, &JsValue::from_str(segment)).ok()?;
        if value.is_null() || value.is_undefined() {
            return None;
        }
    }
    Some(value)
}

/// Posts envelopes to the page's own window
pub struct WindowSink {
    window: web_sys::Window,
}

impl WindowSink {
    pub fn new(window: web_sys::Window) -> Self {
        WindowSink { window }
    }
}

impl MessageSink for WindowSink {
    fn post(&self, envelope: Envelope) {
        let kind = envelope.payload.kind();
        let result = to_js(&envelope).and_then(|message| {
            self.window
                .post_message(&message, "*")
                .map_err(|e| RelayError::Delivery(describe(&e)))
        });
        if let Err(e) = result {
            log::warn!("Could not post {}: {}", kind, e);
        }
    }
}
