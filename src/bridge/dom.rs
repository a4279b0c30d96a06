/// Document-facing pieces of the page agent: probes, timers, highlighting

use super::{describe, js::JsFiber};
use crate::agent::Inspector;
use crate::detector::{Probe, ProbeError, ProbeTarget, REACT_ATTRIBUTES, Scheduler, is_react_internal_key};
use js_sys::{Array, Object, Reflect};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlElement, MutationObserver, MutationObserverInit, Window};

const HIGHLIGHT_OUTLINE: &str = "2px solid #61dafb";

fn truthy(target: &JsValue, key: &str) -> Result<bool, String> {
    Reflect::get(target, &JsValue::from_str(key))
        .map(|value| value.is_truthy())
        .map_err(|e| describe(&e))
}

/// First own enumerable key React uses to tie a DOM node to its fiber
fn internal_key(element: &Element) -> Option<String> {
    Object::keys(element)
        .iter()
        .filter_map(|key| key.as_string())
        .find(|key| is_react_internal_key(key))
}

/// Fiber React attached to `element`, if any
pub fn fiber_for_element(element: &Element) -> Option<JsFiber> {
    let key = Object::keys(element)
        .iter()
        .filter_map(|key| key.as_string())
        .find(|key| key.starts_with("__reactFiber$") || key.starts_with("__reactInternalInstance$"))?;
    let fiber = Reflect::get(element, &JsValue::from_str(&key)).ok()?;
    (fiber.is_object()).then_some(JsFiber(fiber))
}

/// The page window and document as probe target
pub struct DomProbeTarget {
    window: Window,
}

impl DomProbeTarget {
    pub fn new(window: Window) -> Self {
        DomProbeTarget { window }
    }

    fn document(&self) -> Result<Document, String> {
        self.window.document().ok_or_else(|| "no document".to_string())
    }

    fn all_elements(&self) -> Result<Vec<Element>, String> {
        let nodes = self.document()?.query_selector_all("*").map_err(|e| describe(&e))?;
        Ok((0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect())
    }

    fn evaluate(&self, probe: Probe) -> Result<bool, String> {
        match probe {
            Probe::GlobalReact => truthy(&self.window, "React"),
            Probe::GlobalReactDom => truthy(&self.window, "ReactDOM"),
            Probe::DevtoolsHook => truthy(&self.window, "__REACT_DEVTOOLS_GLOBAL_HOOK__"),
            Probe::LegacyDevtoolsHook => truthy(&self.window, "_REACT_DEVTOOLS_GLOBAL_HOOK"),
            Probe::RootAttribute | Probe::ReactIdAttribute => {
                let attribute = if probe == Probe::RootAttribute {
                    REACT_ATTRIBUTES[0]
                } else {
                    REACT_ATTRIBUTES[1]
                };
                let found = self
                    .document()?
                    .query_selector(&format!("[{}]", attribute))
                    .map_err(|e| describe(&e))?;
                Ok(found.is_some())
            }
            Probe::InternalKeys => Ok(self.all_elements()?.iter().any(|el| internal_key(el).is_some())),
            Probe::RootContainer => {
                let document: JsValue = self.document()?.into();
                truthy(&document, "_reactRootContainer")
            }
            Probe::DevtoolsAttach => truthy(&self.window, "__REACT_DEVTOOLS_ATTACH__"),
        }
    }
}

impl ProbeTarget for DomProbeTarget {
    fn probe(&self, probe: Probe) -> Result<bool, ProbeError> {
        self.evaluate(probe).map_err(|reason| ProbeError { probe, reason })
    }

    fn count_roots(&self, limit: usize) -> Result<usize, ProbeError> {
        let failed = |reason: String| ProbeError {
            probe: Probe::RootAttribute,
            reason,
        };
        let document = self.document().map_err(failed)?;
        let marked = document
            .query_selector_all(&format!("[{}]", REACT_ATTRIBUTES[0]))
            .map_err(|e| failed(describe(&e)))?
            .length() as usize;
        if marked >= limit {
            return Ok(limit);
        }

        let mut count = marked;
        for element in self.all_elements().map_err(failed)? {
            if count >= limit {
                break;
            }
            if internal_key(&element).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn react_version(&self) -> Option<String> {
        let react = Reflect::get(&self.window, &JsValue::from_str("React")).ok()?;
        if !react.is_object() {
            return None;
        }
        Reflect::get(&react, &JsValue::from_str("version")).ok()?.as_string()
    }
}

/// `setTimeout` retries and a MutationObserver on the document element
pub struct DomScheduler {
    window: Window,
    on_timer: Rc<dyn Fn(usize)>,
    on_mutation: Rc<dyn Fn()>,
    // The callback is kept alive until the scheduler is dropped; a
    // disconnect may happen from inside it.
    observer: RefCell<Option<(MutationObserver, Closure<dyn FnMut()>)>>,
    /// Callbacks of scheduled retries, released on cancel
    timers: RefCell<HashMap<i32, Closure<dyn FnMut()>>>,
}

impl DomScheduler {
    pub fn new(window: Window, on_timer: impl Fn(usize) + 'static, on_mutation: impl Fn() + 'static) -> Self {
        DomScheduler {
            window,
            on_timer: Rc::new(on_timer),
            on_mutation: Rc::new(on_mutation),
            observer: RefCell::new(None),
            timers: RefCell::new(HashMap::new()),
        }
    }

    fn start_observer(&self) -> Result<(), JsValue> {
        let target = self
            .window
            .document()
            .and_then(|document| document.document_element())
            .ok_or_else(|| JsValue::from_str("no document element"))?;

        let on_mutation = Rc::clone(&self.on_mutation);
        let callback = Closure::<dyn FnMut()>::new(move || on_mutation());
        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;

        let filter: Array = REACT_ATTRIBUTES.iter().map(|name| JsValue::from_str(name)).collect();
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_attributes(true);
        init.set_attribute_filter(&filter);
        observer.observe_with_options(&target, &init)?;

        *self.observer.borrow_mut() = Some((observer, callback));
        Ok(())
    }
}

impl Scheduler for DomScheduler {
    type Timer = i32;

    fn schedule(&self, delay: Duration, attempt: usize) -> i32 {
        let on_timer = Rc::clone(&self.on_timer);
        let callback = Closure::once(move || on_timer(attempt));
        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), millis)
        {
            Ok(timer) => {
                self.timers.borrow_mut().insert(timer, callback);
                timer
            }
            Err(e) => {
                log::warn!("Could not schedule retry {}: {}", attempt + 1, describe(&e));
                -1
            }
        }
    }

    // wasm-bindgen defers freeing a closure dropped while it runs, so a
    // timer may cancel itself.
    fn cancel(&self, timer: i32) {
        self.window.clear_timeout_with_handle(timer);
        let released = self.timers.borrow_mut().remove(&timer);
        drop(released);
    }

    fn observe(&self) {
        if self.observer.borrow().is_some() {
            return;
        }
        if let Err(e) = self.start_observer() {
            log::warn!("Could not observe the document: {}", describe(&e));
        }
    }

    fn disconnect(&self) {
        if let Some((observer, _)) = self.observer.borrow().as_ref() {
            observer.disconnect();
        }
    }
}

struct Outline {
    element: HtmlElement,
    previous: String,
}

/// Outlines the DOM node of a fiber and turns clicks into fiber picks
pub struct DomInspector {
    document: Document,
    /// How far below a fiber to look for its DOM node
    max_depth: usize,
    outline: RefCell<Option<Outline>>,
    inspecting: Cell<bool>,
    listeners: RefCell<Vec<(&'static str, Closure<dyn FnMut(web_sys::MouseEvent)>)>>,
}

impl DomInspector {
    /// `on_pick` receives the fiber behind each element clicked while
    /// inspecting.
    pub fn new(document: Document, max_depth: usize, on_pick: impl Fn(JsFiber) + 'static) -> Rc<Self> {
        let inspector = Rc::new(DomInspector {
            document,
            max_depth,
            outline: RefCell::new(None),
            inspecting: Cell::new(false),
            listeners: RefCell::new(Vec::new()),
        });

        let weak = Rc::downgrade(&inspector);
        let on_hover = move |event: web_sys::MouseEvent| {
            let Some(inspector) = weak.upgrade() else { return };
            if !inspector.inspecting.get() {
                return;
            }
            if let Some(element) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) {
                inspector.outline_element(&element);
            }
        };

        let weak = Rc::downgrade(&inspector);
        let on_click = move |event: web_sys::MouseEvent| {
            let Some(inspector) = weak.upgrade() else { return };
            if !inspector.inspecting.get() {
                return;
            }
            event.prevent_default();
            event.stop_propagation();
            inspector.inspecting.set(false);
            inspector.clear_highlight();

            let fiber = event
                .target()
                .and_then(|t| t.dyn_into::<Element>().ok())
                .and_then(|element| nearest_fiber(&element));
            match fiber {
                Some(fiber) => on_pick(fiber),
                None => log::debug!("Clicked element has no React fiber"),
            }
        };

        inspector.listen("mouseover", on_hover);
        inspector.listen("click", on_click);
        inspector
    }

    fn listen(&self, event: &'static str, handler: impl FnMut(web_sys::MouseEvent) + 'static) {
        let closure = Closure::<dyn FnMut(web_sys::MouseEvent)>::new(handler);
        if let Err(e) = self
            .document
            .add_event_listener_with_callback_and_bool(event, closure.as_ref().unchecked_ref(), true)
        {
            log::warn!("Could not listen for {}: {}", event, describe(&e));
            return;
        }
        self.listeners.borrow_mut().push((event, closure));
    }

    fn outline_element(&self, element: &Element) {
        self.clear_highlight();
        let Some(element) = element.dyn_ref::<HtmlElement>() else {
            return;
        };
        let style = element.style();
        let previous = style.get_property_value("outline").unwrap_or_default();
        if let Err(e) = style.set_property("outline", HIGHLIGHT_OUTLINE) {
            log::warn!("Could not outline element: {}", describe(&e));
            return;
        }
        *self.outline.borrow_mut() = Some(Outline {
            element: element.clone(),
            previous,
        });
    }
}

// Text nodes and elements React does not own: walk up to the closest
// element that has a fiber.
fn nearest_fiber(element: &Element) -> Option<JsFiber> {
    let mut cursor = Some(element.clone());
    while let Some(element) = cursor {
        if let Some(fiber) = fiber_for_element(&element) {
            return Some(fiber);
        }
        cursor = element.parent_element();
    }
    None
}

impl Inspector<JsFiber> for DomInspector {
    fn highlight(&self, fiber: &JsFiber) -> bool {
        match fiber.host_node(self.max_depth) {
            Some(element) => {
                self.outline_element(&element);
                true
            }
            None => false,
        }
    }

    fn clear_highlight(&self) {
        if let Some(outline) = self.outline.borrow_mut().take() {
            let _ = outline.element.style().set_property("outline", &outline.previous);
        }
    }

    fn set_inspecting(&self, active: bool) {
        self.inspecting.set(active);
        if !active {
            self.clear_highlight();
        }
    }
}

impl Drop for DomInspector {
    fn drop(&mut self) {
        for (event, closure) in self.listeners.borrow_mut().drain(..) {
            let _ = self.document.remove_event_listener_with_callback_and_bool(
                event,
                closure.as_ref().unchecked_ref(),
                true,
            );
        }
    }
}
