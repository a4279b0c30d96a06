/// The page agent: detection, hook installation and panel commands
///
/// Runs inside the page realm. `PageAgent` holds the logic and works on any
/// renderer type; `run` wires it to the real window.

use crate::bridge::dom::{DomInspector, DomProbeTarget, DomScheduler};
use crate::bridge::js::{JsRenderer, WindowScope};
use crate::bridge::{self, WindowSink, describe};
use crate::config::DevtoolsConfig;
use crate::detector::{Detector, RootScanner};
use crate::hook::{self, DevtoolsHook, FiberOf, Installation, PageScope, Renderer};
use crate::relay::{Context, Direction, Envelope, MessageSink, Payload};
use crate::serializer::Serializer;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use uuid::Uuid;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Visual side of highlight and inspect commands
pub trait Inspector<F> {
    /// Outline the host node of `fiber`; false when it has none.
    fn highlight(&self, fiber: &F) -> bool;

    fn clear_highlight(&self);

    fn set_inspecting(&self, active: bool);
}

pub struct PageAgent<R: Renderer> {
    config: DevtoolsConfig,
    session: Uuid,
    sink: Rc<dyn MessageSink>,
    hook: RefCell<Option<Rc<DevtoolsHook<R>>>>,
    attempted: Cell<bool>,
}

impl<R: Renderer + 'static> PageAgent<R> {
    /// A fresh agent with a new page session
    pub fn new(config: DevtoolsConfig, sink: Rc<dyn MessageSink>) -> Self {
        Self::with_session(config, Uuid::new_v4(), sink)
    }

    pub fn with_session(config: DevtoolsConfig, session: Uuid, sink: Rc<dyn MessageSink>) -> Self {
        PageAgent {
            config,
            session,
            sink,
            hook: RefCell::new(None),
            attempted: Cell::new(false),
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn config(&self) -> &DevtoolsConfig {
        &self.config
    }

    pub fn sink(&self) -> Rc<dyn MessageSink> {
        Rc::clone(&self.sink)
    }

    /// Tell the extension this page load has an agent
    pub fn announce(&self) {
        log::debug!("Page agent running, session {}", self.session);
        self.post(Payload::InjectScriptLoaded);
    }

    /// Install the hook into `scope`. Only the first call does anything;
    /// returns whether our hook is now active.
    pub fn install<P: PageScope<R> + ?Sized>(&self, scope: &P) -> bool {
        if self.attempted.replace(true) {
            return self.hook.borrow().is_some();
        }

        let hook = DevtoolsHook::new(
            self.session,
            Serializer::new(self.config.serializer),
            Rc::clone(&self.sink),
        );
        match hook::install(scope, &self.config.hook, hook) {
            Installation::AlreadyInstalled => {
                log::debug!("Another agent owns the hook on this page");
                false
            }
            Installation::Fresh(hook) => {
                *self.hook.borrow_mut() = Some(hook);
                true
            }
            Installation::Wrapped { hook, replayed } => {
                log::debug!("Wrapped existing hook, replayed {} roots", replayed);
                *self.hook.borrow_mut() = Some(hook);
                true
            }
        }
    }

    pub fn hook(&self) -> Option<Rc<DevtoolsHook<R>>> {
        self.hook.borrow().clone()
    }

    /// Act on a panel command relayed by the content script. Returns
    /// whether the envelope was a command for us.
    pub fn handle<I>(&self, envelope: &Envelope, inspector: &I) -> bool
    where
        I: Inspector<FiberOf<R>> + ?Sized,
    {
        if !envelope.is_from(Context::ContentScript) || envelope.payload.direction() != Direction::Downstream {
            return false;
        }

        match &envelope.payload {
            Payload::GetFiberRoots => match self.hook() {
                Some(hook) => hook.post_fiber_roots(),
                None => {
                    log::debug!("Fiber roots requested before the hook was installed");
                    self.post(Payload::FiberRoots(Vec::new()));
                }
            },
            Payload::HighlightNode(node) => match self.hook().and_then(|hook| hook.resolve_node(node)) {
                Some(fiber) => {
                    if !inspector.highlight(&fiber) {
                        log::debug!("No host node to highlight for {:?}", node);
                    }
                }
                None => {
                    log::debug!("Node {:?} no longer exists", node);
                    inspector.clear_highlight();
                }
            },
            Payload::ClearHighlight => inspector.clear_highlight(),
            Payload::StartInspecting => inspector.set_inspecting(true),
            Payload::StopInspecting => inspector.set_inspecting(false),
            _ => return false,
        }
        true
    }

    /// Report the fiber the user picked while inspecting
    pub fn report_inspected(&self, fiber: &FiberOf<R>) {
        let node = Serializer::new(self.config.serializer).serialize_detached(fiber);
        log::debug!("Inspected {}", node.display_name());
        self.post(Payload::InspectedElement(Box::new(node)));
    }

    /// The page is going away; drop every renderer registration.
    pub fn page_hidden(&self) {
        if let Some(hook) = self.hook() {
            hook.reset();
        }
    }

    fn post(&self, payload: Payload) {
        self.sink
            .post(Envelope::new(Context::Page, payload).with_session(self.session));
    }
}

type PageDetector = Detector<DomProbeTarget, DomScheduler>;

// Install once a probe fired. Called outside any detector borrow.
fn activate(agent: &PageAgent<JsRenderer>, scope: &WindowScope, detector: &RefCell<PageDetector>) {
    if agent.install(scope) {
        log::debug!("Hook installed");
    }
    detector.borrow_mut().mark_installed();
}

/// Start the agent in the current window
pub fn run(config: DevtoolsConfig) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;

    let sink: Rc<dyn MessageSink> = Rc::new(WindowSink::new(window.clone()));
    let agent = Rc::new(PageAgent::<JsRenderer>::new(config.clone(), sink));
    agent.announce();
    let scope = Rc::new(WindowScope::new(&window));

    let detector: Rc<RefCell<PageDetector>> = Rc::new_cyclic(|weak: &Weak<RefCell<PageDetector>>| {
        let on_timer = {
            let (weak, agent, scope) = (weak.clone(), Rc::clone(&agent), Rc::clone(&scope));
            move |attempt: usize| {
                let Some(detector) = weak.upgrade() else { return };
                let found = detector.borrow_mut().on_timer(attempt);
                if found.is_some() {
                    activate(&agent, &scope, &detector);
                }
            }
        };
        let on_mutation = {
            let (weak, agent, scope) = (weak.clone(), Rc::clone(&agent), Rc::clone(&scope));
            move || {
                let Some(detector) = weak.upgrade() else { return };
                let found = detector.borrow_mut().on_mutation();
                if found.is_some() {
                    activate(&agent, &scope, &detector);
                }
            }
        };
        RefCell::new(Detector::new(
            DomProbeTarget::new(window.clone()),
            DomScheduler::new(window.clone(), on_timer, on_mutation),
            config.detector.retry_delays(),
            agent.sink(),
            agent.session(),
        ))
    });
    let found = detector.borrow_mut().start();
    if found.is_some() {
        activate(&agent, &scope, &detector);
    }

    let scanner = Rc::new(RefCell::new(RootScanner::new(
        config.detector.max_rescans,
        config.detector.max_roots,
    )));
    start_rescan(&window, &agent, &scanner)?;

    let inspector = {
        let agent = Rc::downgrade(&agent);
        DomInspector::new(document, config.serializer.fiber_depth, move |fiber| {
            if let Some(agent) = agent.upgrade() {
                agent.report_inspected(&fiber);
            }
        })
    };

    let on_message = {
        let (agent, window) = (Rc::clone(&agent), window.clone());
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            let from_window = event
                .source()
                .is_some_and(|source| js_sys::Object::is(&source, &window));
            if !from_window {
                return;
            }
            if let Some(envelope) = bridge::envelope(event.data()) {
                agent.handle(&envelope, &*inspector);
            }
        })
    };
    window.add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())?;
    on_message.forget();

    let on_pagehide = {
        let (agent, scanner) = (Rc::clone(&agent), Rc::clone(&scanner));
        Closure::<dyn FnMut()>::new(move || {
            log::debug!("Page hidden, dropping renderer registrations");
            agent.page_hidden();
            scanner.borrow_mut().cancel();
        })
    };
    window.add_event_listener_with_callback("pagehide", on_pagehide.as_ref().unchecked_ref())?;
    on_pagehide.forget();

    // Keeps the detector alive for its timers and observer.
    std::mem::forget(detector);
    Ok(())
}

fn start_rescan(
    window: &web_sys::Window,
    agent: &Rc<PageAgent<JsRenderer>>,
    scanner: &Rc<RefCell<RootScanner>>,
) -> Result<(), JsValue> {
    let target = DomProbeTarget::new(window.clone());
    let handle: Rc<Cell<Option<i32>>> = Rc::default();

    let tick = {
        let (agent, scanner, handle, window) =
            (Rc::clone(agent), Rc::clone(scanner), Rc::clone(&handle), window.clone());
        Closure::<dyn FnMut()>::new(move || {
            let mut scanner = scanner.borrow_mut();
            if let Some(count) = scanner.tick(&target) {
                agent.post(Payload::ReactRootsFound(count));
            }
            if scanner.is_finished() {
                if let Some(handle) = handle.take() {
                    log::debug!("Root re-scan finished");
                    window.clear_interval_with_handle(handle);
                }
            }
        })
    };
    let interval = i32::try_from(agent.config().detector.rescan_interval().as_millis()).unwrap_or(i32::MAX);
    let id = window
        .set_interval_with_callback_and_timeout_and_arguments_0(tick.as_ref().unchecked_ref(), interval)
        .map_err(|e| JsValue::from_str(&format!("Failed to start root re-scan: {}", describe(&e))))?;
    handle.set(Some(id));
    tick.forget();
    Ok(())
}
