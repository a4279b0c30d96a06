/// Fiber Lens - React component inspector for Chrome DevTools
/// Built with Rust + WASM + Yew
///
/// One wasm module serves every extension context; each page of the
/// extension calls the matching `start_*` export.

pub mod agent;
pub mod background;
pub mod bridge;
pub mod config;
pub mod content;
pub mod detector;
pub mod fiber;
pub mod hook;
pub mod relay;
pub mod serialized;
pub mod serializer;
pub mod ui;

#[cfg(test)]
mod testing;

use config::DevtoolsConfig;
use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Decode an optional JS config object; `undefined` means defaults.
fn config_from(value: JsValue) -> Result<DevtoolsConfig, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(DevtoolsConfig::default());
    }
    bridge::from_js(value).map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))
}

// Runs in the page's main world, ahead of React
#[wasm_bindgen]
pub fn start_page_agent(config: JsValue) -> Result<(), JsValue> {
    agent::run(config_from(config)?)
}

#[wasm_bindgen]
pub fn start_content_script() -> Result<(), JsValue> {
    content::run()
}

#[wasm_bindgen]
pub fn start_background(config: JsValue) -> Result<(), JsValue> {
    background::run(config_from(config)?);
    Ok(())
}

// Registers the panel with the devtools window
#[wasm_bindgen]
pub fn start_devtools_page() -> Result<(), JsValue> {
    bridge::chrome::create_panel("Fiber Lens", "panel.html").map_err(|e| JsValue::from_str(&e))
}

// Start the Yew app for the devtools panel
#[wasm_bindgen]
pub fn start_panel() {
    yew::Renderer::<ui::panel::Panel>::new().render();
}
