/// In-memory stand-ins for the page realm, used by unit tests

use crate::detector::{Probe, ProbeError, ProbeTarget, Scheduler};
use crate::fiber::{AccessError, Entry, FiberField, FiberLike, FiberRoot, ForeignValue, Listing, ValueKind};
use crate::hook::{CommitObserver, DevtoolsHook, ForeignHook, InjectObserver, PageScope, Renderer};
use crate::relay::{Envelope, MessageSink, Payload, RendererId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

type Shared<T> = Rc<RefCell<T>>;
type Fields = Vec<(String, Result<MockValue, AccessError>)>;
type InjectFn = Rc<dyn Fn(&MockRenderer) -> Option<RendererId>>;
type CommitFn = Rc<dyn Fn(Option<RendererId>, &MockRoot, Option<i32>)>;

#[derive(Debug, Clone)]
pub enum MockValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Symbol(String),
    Function(Option<String>),
    Host(String),
    Array(Vec<MockValue>),
    Object(Shared<Fields>),
}

impl MockValue {
    pub fn string(s: &str) -> Self {
        MockValue::Str(s.to_string())
    }

    pub fn symbol(s: &str) -> Self {
        MockValue::Symbol(s.to_string())
    }

    pub fn function(name: Option<&str>) -> Self {
        MockValue::Function(name.map(str::to_string))
    }

    pub fn host(node_name: &str) -> Self {
        MockValue::Host(node_name.to_string())
    }

    pub fn array(items: Vec<MockValue>) -> Self {
        MockValue::Array(items)
    }

    pub fn object(fields: Vec<(&str, MockValue)>) -> Self {
        Self::object_with(fields.into_iter().map(|(k, v)| (k, Ok(v))).collect())
    }

    pub fn object_with(fields: Vec<(&str, Result<MockValue, AccessError>)>) -> Self {
        let fields = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        MockValue::Object(Rc::new(RefCell::new(fields)))
    }

    /// An object whose `key` field points back at itself
    pub fn cyclic_object(key: &str) -> Self {
        let fields: Shared<Fields> = Rc::new(RefCell::new(Vec::new()));
        let value = MockValue::Object(Rc::clone(&fields));
        fields.borrow_mut().push((key.to_string(), Ok(value.clone())));
        value
    }
}

impl ForeignValue for MockValue {
    fn kind(&self) -> Result<ValueKind, AccessError> {
        Ok(match self {
            MockValue::Null => ValueKind::Null,
            MockValue::Bool(b) => ValueKind::Bool(*b),
            MockValue::Number(n) => ValueKind::Number(*n),
            MockValue::Str(s) => ValueKind::String(s.clone()),
            MockValue::Symbol(s) => ValueKind::Symbol(s.clone()),
            MockValue::Function(name) => ValueKind::Function(name.clone()),
            MockValue::Host(name) => ValueKind::Host(name.clone()),
            MockValue::Array(_) => ValueKind::Array,
            MockValue::Object(_) => ValueKind::Object,
        })
    }

    fn get(&self, key: &str) -> Result<Option<Self>, AccessError> {
        let MockValue::Object(fields) = self else {
            return Err(AccessError::NotAnObject);
        };
        match fields.borrow().iter().find(|(k, _)| k == key) {
            None | Some((_, Ok(MockValue::Null))) => Ok(None),
            Some((_, result)) => result.clone().map(Some),
        }
    }

    fn entries(&self, limit: usize) -> Result<Listing<Entry<Self>>, AccessError> {
        match self {
            MockValue::Object(fields) => {
                let fields = fields.borrow();
                Ok(Listing {
                    items: fields.iter().take(limit).cloned().collect(),
                    total: fields.len(),
                })
            }
            _ => Err(AccessError::NotAnObject),
        }
    }

    fn elements(&self, limit: usize) -> Result<Listing<Result<Self, AccessError>>, AccessError> {
        match self {
            MockValue::Array(items) => Ok(Listing {
                items: items.iter().take(limit).cloned().map(Ok).collect(),
                total: items.len(),
            }),
            _ => Err(AccessError::NotAnObject),
        }
    }
}

#[derive(Default)]
struct FiberData {
    tag: i64,
    key: Option<String>,
    fields: Vec<(FiberField, Result<MockValue, AccessError>)>,
    child: Option<MockFiber>,
    child_error: Option<String>,
    sibling: Option<MockFiber>,
    parent: Option<MockFiber>,
}

/// Fiber node with shared, mutable links so tests can build cycles
#[derive(Clone)]
pub struct MockFiber(Shared<FiberData>);

impl MockFiber {
    pub fn new(tag: i64) -> Self {
        MockFiber(Rc::new(RefCell::new(FiberData {
            tag,
            ..Default::default()
        })))
    }

    pub fn with_key(self, key: &str) -> Self {
        self.0.borrow_mut().key = Some(key.to_string());
        self
    }

    fn with_field(self, field: FiberField, value: Result<MockValue, AccessError>) -> Self {
        {
            let mut data = self.0.borrow_mut();
            data.fields.retain(|(f, _)| *f != field);
            data.fields.push((field, value));
        }
        self
    }

    pub fn with_props(self, props: MockValue) -> Self {
        self.with_field(FiberField::MemoizedProps, Ok(props))
    }

    pub fn with_state(self, state: MockValue) -> Self {
        self.with_field(FiberField::MemoizedState, Ok(state))
    }

    pub fn with_type(self, value: MockValue) -> Self {
        self.with_field(FiberField::ElementType, Ok(value.clone()))
            .with_field(FiberField::Type, Ok(value))
    }

    pub fn with_state_node(self, value: MockValue) -> Self {
        self.with_field(FiberField::StateNode, Ok(value))
    }

    pub fn failing_field(self, field: FiberField, reason: &str) -> Self {
        self.with_field(field, Err(AccessError::threw(field.property(), reason)))
    }

    pub fn set_child(&self, child: Option<&MockFiber>) {
        self.0.borrow_mut().child = child.cloned();
    }

    pub fn fail_child(&self, reason: &str) {
        self.0.borrow_mut().child_error = Some(reason.to_string());
    }

    pub fn set_sibling(&self, sibling: Option<&MockFiber>) {
        self.0.borrow_mut().sibling = sibling.cloned();
    }

    /// Parent back-reference; never read by traversal code
    pub fn set_return(&self, parent: Option<&MockFiber>) {
        self.0.borrow_mut().parent = parent.cloned();
    }

    pub fn ptr_eq(&self, other: &MockFiber) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl FiberLike for MockFiber {
    type Value = MockValue;

    fn tag(&self) -> Result<Option<i64>, AccessError> {
        Ok(Some(self.0.borrow().tag))
    }

    fn key(&self) -> Result<Option<String>, AccessError> {
        Ok(self.0.borrow().key.clone())
    }

    fn field(&self, field: FiberField) -> Result<Option<MockValue>, AccessError> {
        match self.0.borrow().fields.iter().find(|(f, _)| *f == field) {
            None => Ok(None),
            Some((_, Ok(MockValue::Null))) => Ok(None),
            Some((_, result)) => result.clone().map(Some),
        }
    }

    fn child(&self) -> Result<Option<MockFiber>, AccessError> {
        let data = self.0.borrow();
        match &data.child_error {
            Some(reason) => Err(AccessError::threw("child", reason.clone())),
            None => Ok(data.child.clone()),
        }
    }

    fn sibling(&self) -> Result<Option<MockFiber>, AccessError> {
        Ok(self.0.borrow().sibling.clone())
    }
}

#[derive(Clone)]
pub struct MockRoot {
    current: Rc<Result<Option<MockFiber>, AccessError>>,
}

impl MockRoot {
    pub fn new(current: Option<MockFiber>) -> Self {
        MockRoot {
            current: Rc::new(Ok(current)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        MockRoot {
            current: Rc::new(Err(AccessError::threw("current", reason))),
        }
    }
}

impl FiberRoot for MockRoot {
    type Fiber = MockFiber;

    fn current(&self) -> Result<Option<MockFiber>, AccessError> {
        (*self.current).clone()
    }

    fn is_same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.current, &other.current)
    }
}

#[derive(Clone, Default)]
pub struct MockRenderer {
    roots: Option<Vec<MockRoot>>,
    version: Option<String>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roots(mut self, roots: Vec<MockRoot>) -> Self {
        self.roots = Some(roots);
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }
}

impl Renderer for MockRenderer {
    type Root = MockRoot;

    fn mounted_roots(&self) -> Option<Vec<MockRoot>> {
        self.roots.clone()
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }
}

/// Sink that keeps every envelope and notes `ours:<type>` in a shared log
#[derive(Clone, Default)]
pub struct RecordingSink {
    envelopes: Shared<Vec<Envelope>>,
    log: Shared<Vec<String>>,
}

impl RecordingSink {
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.borrow().clone()
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.envelopes.borrow().iter().map(|e| e.payload.clone()).collect()
    }

    pub fn log(&self) -> Shared<Vec<String>> {
        Rc::clone(&self.log)
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl MessageSink for RecordingSink {
    fn post(&self, envelope: Envelope) {
        self.log
            .borrow_mut()
            .push(format!("ours:{}", envelope.payload.kind()));
        self.envelopes.borrow_mut().push(envelope);
    }
}

/// Another devtools hook that was on the page before ours
pub struct MockForeignHook {
    inject: RefCell<Option<InjectFn>>,
    commit: RefCell<Option<CommitFn>>,
    renderers: Shared<Vec<(RendererId, MockRenderer)>>,
    roots: RefCell<HashMap<RendererId, Vec<MockRoot>>>,
}

impl MockForeignHook {
    /// Original methods write `original:inject` / `original:commit` to `log`;
    /// renderer ids start at 100.
    pub fn new(log: Shared<Vec<String>>) -> Rc<Self> {
        Self::build(log, true)
    }

    /// Like `new`, but `inject` returns nothing, as minimal hooks do
    pub fn without_ids(log: Shared<Vec<String>>) -> Rc<Self> {
        Self::build(log, false)
    }

    fn build(log: Shared<Vec<String>>, hands_out_ids: bool) -> Rc<Self> {
        let renderers: Shared<Vec<(RendererId, MockRenderer)>> = Rc::default();

        let inject_log = Rc::clone(&log);
        let known = Rc::clone(&renderers);
        let inject: InjectFn = Rc::new(move |renderer: &MockRenderer| {
            inject_log.borrow_mut().push("original:inject".to_string());
            let id = 100 + known.borrow().len() as RendererId;
            known.borrow_mut().push((id, renderer.clone()));
            hands_out_ids.then_some(id)
        });
        let commit: CommitFn = Rc::new(move |_: Option<RendererId>, _: &MockRoot, _: Option<i32>| {
            log.borrow_mut().push("original:commit".to_string());
        });

        Rc::new(MockForeignHook {
            inject: RefCell::new(Some(inject)),
            commit: RefCell::new(Some(commit)),
            renderers,
            roots: RefCell::new(HashMap::new()),
        })
    }

    /// What a renderer does on startup
    pub fn call_inject(&self, renderer: &MockRenderer) -> Option<RendererId> {
        let inject = self.inject.borrow().clone();
        inject.and_then(|inject| inject(renderer))
    }

    /// What a renderer does after each commit, passing back whatever
    /// `inject` gave it
    pub fn call_commit(&self, renderer_id: Option<RendererId>, root: &MockRoot, priority: Option<i32>) {
        let commit = self.commit.borrow().clone();
        if let Some(commit) = commit {
            commit(renderer_id, root, priority);
        }
    }

    pub fn add_root(&self, renderer_id: RendererId, root: MockRoot) {
        self.roots.borrow_mut().entry(renderer_id).or_default().push(root);
    }

    pub fn known_renderer_ids(&self) -> Vec<RendererId> {
        self.renderers.borrow().iter().map(|(id, _)| *id).collect()
    }
}

impl ForeignHook<MockRenderer> for MockForeignHook {
    fn observe_inject(&self, after: InjectObserver<MockRenderer>) -> bool {
        let Some(original) = self.inject.borrow().clone() else {
            return false;
        };
        *self.inject.borrow_mut() = Some(Rc::new(move |renderer: &MockRenderer| {
            let returned = original(renderer);
            after(renderer, returned);
            returned
        }));
        true
    }

    fn observe_commit(&self, after: CommitObserver<MockRenderer>) -> bool {
        let Some(original) = self.commit.borrow().clone() else {
            return false;
        };
        *self.commit.borrow_mut() = Some(Rc::new(
            move |renderer_id: Option<RendererId>, root: &MockRoot, priority: Option<i32>| {
                original(renderer_id, root, priority);
                after(renderer_id, root, priority);
            },
        ));
        true
    }

    fn renderers(&self) -> Vec<(RendererId, MockRenderer)> {
        self.renderers.borrow().clone()
    }

    fn fiber_roots(&self, renderer_id: RendererId) -> Vec<MockRoot> {
        self.roots.borrow().get(&renderer_id).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
pub struct MockScope {
    globals: RefCell<HashMap<String, Rc<DevtoolsHook<MockRenderer>>>>,
    published: Cell<usize>,
    foreign: Option<Rc<MockForeignHook>>,
}

impl MockScope {
    pub fn with_foreign(foreign: Rc<MockForeignHook>) -> Self {
        MockScope {
            foreign: Some(foreign),
            ..Default::default()
        }
    }

    pub fn global(&self, key: &str) -> Option<Rc<DevtoolsHook<MockRenderer>>> {
        self.globals.borrow().get(key).cloned()
    }

    pub fn published_count(&self) -> usize {
        self.published.get()
    }
}

impl PageScope<MockRenderer> for MockScope {
    fn has_global(&self, key: &str) -> bool {
        self.globals.borrow().contains_key(key)
    }

    fn publish(&self, key: &str, hook: &Rc<DevtoolsHook<MockRenderer>>) {
        self.published.set(self.published.get() + 1);
        self.globals.borrow_mut().insert(key.to_string(), Rc::clone(hook));
    }

    fn foreign_hook(&self, _keys: &[String]) -> Option<Rc<dyn ForeignHook<MockRenderer>>> {
        self.foreign
            .clone()
            .map(|foreign| foreign as Rc<dyn ForeignHook<MockRenderer>>)
    }
}

/// Page whose `success` probe starts answering yes on the given attempt.
/// An attempt is one pass over the probe list.
pub struct MockProbeTarget {
    success: Option<(Probe, usize)>,
    failing: Option<Probe>,
    attempts: Cell<usize>,
    evaluated: RefCell<Vec<Probe>>,
    roots: Cell<usize>,
}

impl MockProbeTarget {
    pub fn new(success: Probe, on_attempt: usize) -> Self {
        MockProbeTarget {
            success: Some((success, on_attempt)),
            failing: None,
            attempts: Cell::new(0),
            evaluated: RefCell::new(Vec::new()),
            roots: Cell::new(0),
        }
    }

    pub fn never() -> Self {
        MockProbeTarget {
            success: None,
            ..Self::new(Probe::GlobalReact, 0)
        }
    }

    pub fn failing(mut self, probe: Probe) -> Self {
        self.failing = Some(probe);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }

    pub fn evaluated(&self) -> Vec<Probe> {
        self.evaluated.borrow().clone()
    }

    pub fn set_roots(&self, roots: usize) {
        self.roots.set(roots);
    }
}

impl ProbeTarget for MockProbeTarget {
    fn probe(&self, probe: Probe) -> Result<bool, ProbeError> {
        if probe == Probe::ALL[0] {
            self.attempts.set(self.attempts.get() + 1);
        }
        self.evaluated.borrow_mut().push(probe);

        if self.failing == Some(probe) {
            return Err(ProbeError {
                probe,
                reason: "getter threw".to_string(),
            });
        }
        Ok(matches!(
            self.success,
            Some((success, on_attempt)) if success == probe && self.attempts.get() >= on_attempt
        ))
    }

    fn count_roots(&self, limit: usize) -> Result<usize, ProbeError> {
        Ok(self.roots.get().min(limit))
    }

    fn react_version(&self) -> Option<String> {
        Some("18.2.0".to_string())
    }
}

/// Scheduler that records instead of waiting; timers are their attempt index
#[derive(Default)]
pub struct MockScheduler {
    scheduled: RefCell<Vec<Duration>>,
    cancelled: RefCell<Vec<usize>>,
    observe_calls: Cell<usize>,
    disconnect_calls: Cell<usize>,
}

impl MockScheduler {
    pub fn scheduled(&self) -> Vec<Duration> {
        self.scheduled.borrow().clone()
    }

    pub fn cancelled(&self) -> Vec<usize> {
        self.cancelled.borrow().clone()
    }

    pub fn observe_calls(&self) -> usize {
        self.observe_calls.get()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.get()
    }
}

impl Scheduler for MockScheduler {
    type Timer = usize;

    fn schedule(&self, delay: Duration, attempt: usize) -> usize {
        self.scheduled.borrow_mut().push(delay);
        attempt
    }

    fn cancel(&self, timer: usize) {
        self.cancelled.borrow_mut().push(timer);
    }

    fn observe(&self) {
        self.observe_calls.set(self.observe_calls.get() + 1);
    }

    fn disconnect(&self) {
        self.disconnect_calls.set(self.disconnect_calls.get() + 1);
    }
}
