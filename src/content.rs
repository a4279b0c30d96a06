/// Content script: the hop between the page window and the extension
///
/// The page agent cannot reach extension APIs and the background cannot
/// reach the page, so this context forwards in both directions and filters
/// by source tag on the way.

use crate::bridge::{self, WindowSink, chrome};
use crate::relay::{Context, Direction, Envelope, MessageSink, Payload};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Page -> extension: only upstream traffic from the page agent passes,
/// unchanged so the panel still sees the page session.
pub fn from_page(envelope: Envelope) -> Option<Envelope> {
    (envelope.is_from(Context::Page) && envelope.payload.direction() == Direction::Upstream).then_some(envelope)
}

/// Extension -> page: panel commands, re-stamped with our own tag since
/// that is the only source the page agent listens to.
pub fn from_extension(envelope: &Envelope) -> Option<Envelope> {
    if !envelope.is_from(Context::Panel) || envelope.payload.direction() != Direction::Downstream {
        log::trace!("Not forwarding {} from {} into the page", envelope.payload.kind(), envelope.source);
        return None;
    }
    Some(envelope.relabel(Context::ContentScript))
}

pub fn loaded() -> Envelope {
    Envelope::new(Context::ContentScript, Payload::ContentScriptLoaded)
}

/// Start relaying in the current tab
pub fn run() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    chrome::send_to_runtime(&loaded());

    let on_message = {
        let window = window.clone();
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            let from_window = event
                .source()
                .is_some_and(|source| js_sys::Object::is(&source, &window));
            if !from_window {
                return;
            }
            if let Some(envelope) = bridge::envelope(event.data()).and_then(from_page) {
                chrome::send_to_runtime(&envelope);
            }
        })
    };
    window.add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;
    on_message.forget();

    let page = WindowSink::new(window);
    chrome::on_runtime_message(move |message, _| {
        if let Some(envelope) = bridge::envelope(message).as_ref().and_then(from_extension) {
            page.post(envelope);
        }
    });

    log::debug!("Content script relay running");
    Ok(())
}
