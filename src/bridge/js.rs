/// Page-realm JS objects behind the fiber and hook traits
///
/// Every property read goes through `Reflect` so a throwing getter or a
/// revoked proxy turns into an `AccessError` instead of a wasm trap.

use super::describe;
use crate::fiber::{AccessError, Entry, FiberField, FiberLike, FiberRoot, ForeignValue, Listing, ValueKind, find_down};
use crate::hook::{CommitObserver, DevtoolsHook, ForeignHook, InjectObserver, PageScope, Renderer};
use crate::relay::RendererId;
use crate::serialized::safe_integer;
use js_sys::{Array, Function, Object, Reflect};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

fn read(target: &JsValue, key: &str) -> Result<JsValue, AccessError> {
    Reflect::get(target, &JsValue::from_str(key)).map_err(|e| AccessError::threw(key, describe(&e)))
}

fn present(value: JsValue) -> Option<JsValue> {
    if value.is_null() || value.is_undefined() {
        None
    } else {
        Some(value)
    }
}

fn read_present(target: &JsValue, key: &str) -> Result<Option<JsValue>, AccessError> {
    if !target.is_object() && !target.is_function() {
        return Err(AccessError::NotAnObject);
    }
    read(target, key).map(present)
}

fn as_id(value: &JsValue) -> Option<RendererId> {
    value
        .as_f64()
        .filter(|id| id.fract() == 0.0 && *id >= 0.0 && *id <= f64::from(u32::MAX))
        .map(|id| id as RendererId)
}

/// Any value reachable from a fiber
#[derive(Debug, Clone)]
pub struct JsForeign(pub JsValue);

impl ForeignValue for JsForeign {
    fn kind(&self) -> Result<ValueKind, AccessError> {
        let value = &self.0;
        if value.is_null() || value.is_undefined() {
            return Ok(ValueKind::Null);
        }
        if let Some(flag) = value.as_bool() {
            return Ok(ValueKind::Bool(flag));
        }
        if let Some(number) = value.as_f64() {
            return Ok(ValueKind::Number(number));
        }
        if let Some(text) = value.as_string() {
            return Ok(ValueKind::String(text));
        }
        if value.is_symbol() {
            let symbol: &js_sys::Symbol = value.unchecked_ref();
            return Ok(ValueKind::Symbol(String::from(symbol.to_string())));
        }
        if value.is_bigint() {
            return Ok(ValueKind::String(format!("{:?}", value)));
        }
        if value.is_function() {
            let name = read(value, "name")?.as_string();
            return Ok(ValueKind::Function(name));
        }
        if let Some(node) = value.dyn_ref::<web_sys::Node>() {
            return Ok(ValueKind::Host(node.node_name()));
        }
        if Array::is_array(value) {
            return Ok(ValueKind::Array);
        }
        Ok(ValueKind::Object)
    }

    fn get(&self, key: &str) -> Result<Option<Self>, AccessError> {
        Ok(read_present(&self.0, key)?.map(JsForeign))
    }

    fn entries(&self, limit: usize) -> Result<Listing<Entry<Self>>, AccessError> {
        if !self.0.is_object() {
            return Err(AccessError::NotAnObject);
        }
        let keys = Reflect::own_keys(&self.0).map_err(|e| AccessError::threw("ownKeys", describe(&e)))?;
        let names: Vec<String> = keys.iter().filter_map(|key| key.as_string()).collect();
        let items = names
            .iter()
            .take(limit)
            .map(|name| (name.clone(), read(&self.0, name).map(JsForeign)))
            .collect();
        Ok(Listing {
            items,
            total: names.len(),
        })
    }

    fn elements(&self, limit: usize) -> Result<Listing<Result<Self, AccessError>>, AccessError> {
        let total = read(&self.0, "length")?.as_f64().unwrap_or(0.0).max(0.0) as usize;
        let items = (0..total.min(limit))
            .map(|index| {
                Reflect::get_u32(&self.0, index as u32)
                    .map(JsForeign)
                    .map_err(|e| AccessError::threw(index.to_string(), describe(&e)))
            })
            .collect();
        Ok(Listing { items, total })
    }
}

/// A React fiber object
#[derive(Debug, Clone)]
pub struct JsFiber(pub JsValue);

impl JsFiber {
    fn link(&self, key: &str) -> Result<Option<JsFiber>, AccessError> {
        Ok(read_present(&self.0, key)?.map(JsFiber))
    }

    /// The DOM node of the nearest host component at or below this fiber,
    /// no more than `max_depth` levels down
    pub fn host_node(&self, max_depth: usize) -> Option<web_sys::Element> {
        find_down(self.clone(), max_depth, |fiber| {
            read_present(&fiber.0, "stateNode")
                .ok()
                .flatten()
                .and_then(|node| node.dyn_into::<web_sys::Element>().ok())
        })
    }
}

impl FiberLike for JsFiber {
    type Value = JsForeign;

    fn tag(&self) -> Result<Option<i64>, AccessError> {
        let tag = read_present(&self.0, "tag")?.and_then(|tag| tag.as_f64());
        Ok(tag.and_then(|tag| {
            let integer = safe_integer(tag);
            if integer.is_none() {
                log::warn!("Ignoring fiber tag {}", tag);
            }
            integer
        }))
    }

    fn key(&self) -> Result<Option<String>, AccessError> {
        Ok(read_present(&self.0, "key")?.map(|key| key.as_string().unwrap_or_else(|| format!("{:?}", key))))
    }

    fn field(&self, field: FiberField) -> Result<Option<JsForeign>, AccessError> {
        Ok(read_present(&self.0, field.property())?.map(JsForeign))
    }

    fn child(&self) -> Result<Option<JsFiber>, AccessError> {
        self.link("child")
    }

    fn sibling(&self) -> Result<Option<JsFiber>, AccessError> {
        self.link("sibling")
    }
}

/// A `FiberRootNode`
#[derive(Debug, Clone)]
pub struct JsRoot(pub JsValue);

impl FiberRoot for JsRoot {
    type Fiber = JsFiber;

    fn current(&self) -> Result<Option<JsFiber>, AccessError> {
        Ok(read_present(&self.0, "current")?.map(JsFiber))
    }

    fn is_same(&self, other: &Self) -> bool {
        Object::is(&self.0, &other.0)
    }
}

/// The internals object a renderer passes to `inject`
#[derive(Debug, Clone)]
pub struct JsRenderer(pub JsValue);

impl Renderer for JsRenderer {
    type Root = JsRoot;

    fn mounted_roots(&self) -> Option<Vec<JsRoot>> {
        let method = read_present(&self.0, "getMountedRootInstances").ok()??;
        let method = method.dyn_into::<Function>().ok()?;
        match method.call0(&self.0) {
            Ok(roots) => Some(iterate(&roots).into_iter().map(JsRoot).collect()),
            Err(e) => {
                log::warn!("getMountedRootInstances threw: {}", describe(&e));
                None
            }
        }
    }

    fn version(&self) -> Option<String> {
        read_present(&self.0, "version").ok()?.and_then(|v| v.as_string())
    }
}

// Arrays, Sets and anything else iterable; empty when it is none of them.
fn iterate(value: &JsValue) -> Vec<JsValue> {
    match js_sys::try_iter(value) {
        Ok(Some(iter)) => iter.filter_map(Result::ok).collect(),
        Ok(None) => Vec::new(),
        Err(e) => {
            log::warn!("Could not iterate: {}", describe(&e));
            Vec::new()
        }
    }
}

/// A hook object another tool published before us
pub struct JsForeignHook {
    object: JsValue,
}

impl JsForeignHook {
    fn method(&self, name: &str) -> Option<Function> {
        read_present(&self.object, name).ok()??.dyn_into::<Function>().ok()
    }

    fn replace(&self, name: &str, replacement: &Function) {
        if let Err(e) = Reflect::set(&self.object, &JsValue::from_str(name), replacement) {
            log::warn!("Could not replace {} on existing hook: {}", name, describe(&e));
        }
    }
}

// Arguments as the caller passed them, minus the trailing `undefined`s a
// fixed-arity closure fills in.
fn passed_args(args: &[&JsValue]) -> Array {
    let len = args.iter().rposition(|arg| !arg.is_undefined()).map_or(0, |last| last + 1);
    let array = Array::new();
    for arg in &args[..len] {
        array.push(arg);
    }
    array
}

impl ForeignHook<JsRenderer> for JsForeignHook {
    fn observe_inject(&self, after: InjectObserver<JsRenderer>) -> bool {
        let Some(original) = self.method("inject") else {
            return false;
        };
        let object = self.object.clone();
        let closure = Closure::<dyn Fn(JsValue) -> JsValue>::new(move |renderer: JsValue| {
            let returned = original.call1(&object, &renderer).unwrap_or_else(|e| {
                log::warn!("Existing hook's inject threw: {}", describe(&e));
                JsValue::UNDEFINED
            });
            after(&JsRenderer(renderer), as_id(&returned));
            returned
        });
        self.replace("inject", closure.as_ref().unchecked_ref());
        closure.forget();
        true
    }

    fn observe_commit(&self, after: CommitObserver<JsRenderer>) -> bool {
        let Some(original) = self.method("onCommitFiberRoot") else {
            return false;
        };
        let object = self.object.clone();
        let closure = Closure::<dyn Fn(JsValue, JsValue, JsValue, JsValue) -> JsValue>::new(
            move |renderer_id: JsValue, root: JsValue, priority: JsValue, did_error: JsValue| {
                let args = passed_args(&[&renderer_id, &root, &priority, &did_error]);
                let returned = original.apply(&object, &args).unwrap_or_else(|e| {
                    log::warn!("Existing hook's onCommitFiberRoot threw: {}", describe(&e));
                    JsValue::UNDEFINED
                });
                after(as_id(&renderer_id), &JsRoot(root), priority.as_f64().map(|p| p as i32));
                returned
            },
        );
        self.replace("onCommitFiberRoot", closure.as_ref().unchecked_ref());
        closure.forget();
        true
    }

    fn renderers(&self) -> Vec<(RendererId, JsRenderer)> {
        let Some(renderers) = read_present(&self.object, "renderers").ok().flatten() else {
            return Vec::new();
        };
        let Some(map) = renderers.dyn_ref::<js_sys::Map>() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        map.for_each(&mut |renderer, id| {
            if let Some(id) = as_id(&id) {
                found.push((id, JsRenderer(renderer)));
            }
        });
        found
    }

    fn fiber_roots(&self, renderer_id: RendererId) -> Vec<JsRoot> {
        let Some(method) = self.method("getFiberRoots") else {
            return Vec::new();
        };
        match method.call1(&self.object, &JsValue::from(renderer_id)) {
            Ok(roots) => iterate(&roots).into_iter().map(JsRoot).collect(),
            Err(e) => {
                log::warn!("getFiberRoots({}) threw: {}", renderer_id, describe(&e));
                Vec::new()
            }
        }
    }
}

/// The page window as a place to publish and look up hooks
pub struct WindowScope {
    global: JsValue,
    /// JS face of the last published hook, shared by every key it goes under
    published: RefCell<Option<(Weak<DevtoolsHook<JsRenderer>>, Object)>>,
}

impl WindowScope {
    pub fn new(window: &web_sys::Window) -> Self {
        WindowScope {
            global: window.clone().into(),
            published: RefCell::new(None),
        }
    }

    fn object_for(&self, hook: &Rc<DevtoolsHook<JsRenderer>>) -> Object {
        let mut published = self.published.borrow_mut();
        if let Some((known, object)) = published.as_ref() {
            if Weak::ptr_eq(known, &Rc::downgrade(hook)) {
                return object.clone();
            }
        }
        let object = hook_object(hook);
        *published = Some((Rc::downgrade(hook), object.clone()));
        object
    }
}

impl PageScope<JsRenderer> for WindowScope {
    fn has_global(&self, key: &str) -> bool {
        read_present(&self.global, key).ok().flatten().is_some()
    }

    fn publish(&self, key: &str, hook: &Rc<DevtoolsHook<JsRenderer>>) {
        let object = self.object_for(hook);
        let descriptor = Object::new();
        let _ = Reflect::set(&descriptor, &JsValue::from_str("value"), &object);
        let _ = Reflect::set(&descriptor, &JsValue::from_str("configurable"), &JsValue::TRUE);
        let _ = Reflect::set(&descriptor, &JsValue::from_str("writable"), &JsValue::TRUE);
        let _ = Reflect::set(&descriptor, &JsValue::from_str("enumerable"), &JsValue::FALSE);
        if let Err(e) = Reflect::define_property(self.global.unchecked_ref::<Object>(), &JsValue::from_str(key), &descriptor) {
            log::warn!("Could not publish hook under {}: {}", key, describe(&e));
        }
    }

    fn foreign_hook(&self, keys: &[String]) -> Option<Rc<dyn ForeignHook<JsRenderer>>> {
        keys.iter().find_map(|key| {
            let object = read_present(&self.global, key).ok()??;
            object.is_object().then(|| {
                log::debug!("Found existing hook under {}", key);
                Rc::new(JsForeignHook { object }) as Rc<dyn ForeignHook<JsRenderer>>
            })
        })
    }
}

fn set_method(object: &Object, name: &str, function: &JsValue) {
    let _ = Reflect::set(object, &JsValue::from_str(name), function);
}

// The JS face of our hook: what renderers look for at startup. Closures keep
// only a weak reference so a replaced hook can be dropped.
fn hook_object(hook: &Rc<DevtoolsHook<JsRenderer>>) -> Object {
    let object = Object::new();

    // `renderers` mirrors the registry on every read, so it follows
    // `reset` and evictions. The Map itself stays the same object.
    let ours = Rc::downgrade(hook);
    let map = js_sys::Map::new();
    let renderers = Closure::<dyn Fn() -> JsValue>::new(move || {
        map.clear();
        if let Some(hook) = ours.upgrade() {
            for (id, renderer) in hook.renderers() {
                map.set(&JsValue::from(id), &renderer.0);
            }
        }
        map.clone().into()
    });

    let ours = Rc::downgrade(hook);
    let inject = Closure::<dyn Fn(JsValue) -> JsValue>::new(move |renderer: JsValue| {
        let Some(hook) = ours.upgrade() else {
            return JsValue::UNDEFINED;
        };
        JsValue::from(hook.inject(JsRenderer(renderer)))
    });

    let ours = Rc::downgrade(hook);
    let commit = Closure::<dyn Fn(JsValue, JsValue, JsValue)>::new(
        move |renderer_id: JsValue, root: JsValue, priority: JsValue| {
            let (Some(hook), Some(renderer_id)) = (ours.upgrade(), as_id(&renderer_id)) else {
                return;
            };
            hook.on_commit_fiber_root(renderer_id, &JsRoot(root), priority.as_f64().map(|p| p as i32));
        },
    );

    let ours = Rc::downgrade(hook);
    let fiber_roots = Closure::<dyn Fn(JsValue) -> JsValue>::new(move |renderer_id: JsValue| {
        let roots = js_sys::Set::new(&JsValue::UNDEFINED);
        if let (Some(hook), Some(renderer_id)) = (ours.upgrade(), as_id(&renderer_id)) {
            for root in hook.raw_roots(renderer_id) {
                roots.add(&root.0);
            }
        }
        roots.into()
    });
    let noop = Function::new_no_args("");

    let getter = Object::new();
    let _ = Reflect::set(&getter, &JsValue::from_str("get"), renderers.as_ref());
    let _ = Reflect::set(&getter, &JsValue::from_str("enumerable"), &JsValue::TRUE);
    if let Err(e) = Reflect::define_property(&object, &JsValue::from_str("renderers"), &getter) {
        log::warn!("Could not define hook renderers: {}", describe(&e));
    }
    let _ = Reflect::set(&object, &JsValue::from_str("supportsFiber"), &JsValue::TRUE);
    set_method(&object, "inject", inject.as_ref());
    set_method(&object, "onCommitFiberRoot", commit.as_ref());
    set_method(&object, "getFiberRoots", fiber_roots.as_ref());
    set_method(&object, "onCommitFiberUnmount", &noop);
    set_method(&object, "onPostCommitFiberRoot", &noop);
    set_method(&object, "checkDCE", &noop);
    renderers.forget();
    inject.forget();
    commit.forget();
    fiber_roots.forget();
    object
}
