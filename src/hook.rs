/// The renderer-registration hook
///
/// React renderers look up a well-known global at startup, call `inject`
/// on it once and then `onCommitFiberRoot` after every commit. This module
/// owns that contract: installing our hook (or wrapping one another tool
/// already installed), keeping the renderer registry, and turning each
/// commit into a serialized `commitFiberRoot` envelope.

use crate::config::HookSettings;
use crate::detector::Probe;
use crate::fiber::{FiberRoot, walk_path};
use crate::relay::{Commit, Context, Detection, Envelope, MessageSink, NodeRef, Payload, RendererId, RootSnapshot};
use crate::serializer::Serializer;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use uuid::Uuid;

/// A renderer as passed to `inject`
pub trait Renderer: Clone {
    type Root: FiberRoot + Clone;

    /// Currently mounted roots, or `None` when the renderer offers no way
    /// to enumerate them.
    fn mounted_roots(&self) -> Option<Vec<Self::Root>>;

    fn version(&self) -> Option<String>;
}

pub type FiberOf<R> = <<R as Renderer>::Root as FiberRoot>::Fiber;
/// Runs after the foreign `inject` returned, with its result if that was
/// a usable renderer id
pub type InjectObserver<R> = Rc<dyn Fn(&R, Option<RendererId>)>;
pub type CommitObserver<R> = Rc<dyn Fn(Option<RendererId>, &<R as Renderer>::Root, Option<i32>)>;

/// A hook object some other tool installed before us
pub trait ForeignHook<R: Renderer> {
    /// Replace `inject` with a function that calls the original with the
    /// caller's arguments, hands its result back untouched, and then runs
    /// `after`. False when the hook has no `inject`.
    fn observe_inject(&self, after: InjectObserver<R>) -> bool;
    /// Same for `onCommitFiberRoot`
    fn observe_commit(&self, after: CommitObserver<R>) -> bool;
    /// Renderers the foreign hook has already seen, under its own ids
    fn renderers(&self) -> Vec<(RendererId, R)>;
    /// The foreign hook's `getFiberRoots(id)`
    fn fiber_roots(&self, renderer_id: RendererId) -> Vec<R::Root>;
}

/// The page realm's global scope, as far as installation needs it
pub trait PageScope<R: Renderer> {
    fn has_global(&self, key: &str) -> bool;
    fn publish(&self, key: &str, hook: &Rc<DevtoolsHook<R>>);
    /// First foreign hook found under any of `keys`
    fn foreign_hook(&self, keys: &[String]) -> Option<Rc<dyn ForeignHook<R>>>;
}

/// Roots remembered per renderer from its commits
pub const MAX_TRACKED_ROOTS: usize = 32;

struct Registration<R: Renderer> {
    renderer: R,
    /// Id the wrapped foreign hook uses for this renderer
    foreign_id: Option<RendererId>,
    /// Roots seen in commits, oldest first
    committed: RefCell<Vec<R::Root>>,
}

impl<R: Renderer> Registration<R> {
    fn remember(&self, root: &R::Root) {
        let mut committed = self.committed.borrow_mut();
        if committed.iter().any(|known| known.is_same(root)) {
            return;
        }
        if committed.len() == MAX_TRACKED_ROOTS {
            committed.remove(0);
        }
        committed.push(root.clone());
    }
}

pub struct DevtoolsHook<R: Renderer> {
    session: Uuid,
    serializer: Serializer,
    sink: Rc<dyn MessageSink>,
    next_id: Cell<RendererId>,
    renderers: RefCell<BTreeMap<RendererId, Rc<Registration<R>>>>,
    foreign: RefCell<Option<Rc<dyn ForeignHook<R>>>>,
    version_reported: Cell<bool>,
}

impl<R: Renderer> DevtoolsHook<R> {
    pub fn new(session: Uuid, serializer: Serializer, sink: Rc<dyn MessageSink>) -> Self {
        DevtoolsHook {
            session,
            serializer,
            sink,
            next_id: Cell::new(1),
            renderers: RefCell::new(BTreeMap::new()),
            foreign: RefCell::new(None),
            version_reported: Cell::new(false),
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// Register a renderer under a fresh id.
    pub fn inject(&self, renderer: R) -> RendererId {
        self.register(renderer, None)
    }

    fn register(&self, renderer: R, foreign_id: Option<RendererId>) -> RendererId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let version = renderer.version();
        self.renderers.borrow_mut().insert(
            id,
            Rc::new(Registration {
                renderer,
                foreign_id,
                committed: RefCell::new(Vec::new()),
            }),
        );

        log::debug!("Renderer injected as {} (foreign id {:?})", id, foreign_id);
        self.post(Payload::RendererInjected(id));

        // Bundled React has no `window.React`, so detection ran without a
        // version. The first renderer that carries one fills it in.
        if let Some(version) = version {
            if !self.version_reported.replace(true) {
                log::debug!("React {} reported by renderer {}", version, id);
                self.post(Payload::ReactDetected(Detection {
                    method: Probe::DevtoolsHook.id(),
                    version: Some(version),
                }));
            }
        }
        id
    }

    /// Handle one commit. Never fails; problems are logged and the commit is
    /// reported with whatever could be read.
    pub fn on_commit_fiber_root(&self, renderer_id: RendererId, root: &R::Root, priority: Option<i32>) {
        let registration = self.renderers.borrow().get(&renderer_id).cloned();
        let root_index = registration.and_then(|registration| {
            registration.remember(root);
            self.roots_of(&registration)
                .iter()
                .position(|known| known.is_same(root))
                .and_then(|index| u32::try_from(index).ok())
        });

        let current = root.current().unwrap_or_else(|e| {
            log::warn!("Could not read current fiber of committed root: {}", e);
            None
        });
        let serialized = self.serializer.serialize(current.as_ref());

        log::debug!(
            "Commit from renderer {} ({} nodes)",
            renderer_id,
            serialized.as_ref().map_or(0, |n| n.count())
        );
        self.post(Payload::CommitFiberRoot(Commit {
            renderer_id,
            root_index,
            root: serialized,
            priority,
        }));
    }

    /// A commit seen through a wrapped foreign hook. Without a usable id it
    /// can only belong to the sole registered renderer.
    fn on_foreign_commit(&self, foreign_id: Option<RendererId>, root: &R::Root, priority: Option<i32>) {
        let renderer_id = match foreign_id {
            Some(foreign_id) => self.resolve_id(foreign_id),
            None => match self.renderer_ids().as_slice() {
                [only] => *only,
                ids => {
                    log::warn!("Commit without a renderer id and {} renderers registered, skipping", ids.len());
                    return;
                }
            },
        };
        self.on_commit_fiber_root(renderer_id, root, priority);
    }

    /// Translate an id used by a wrapped foreign hook into ours
    fn resolve_id(&self, caller_id: RendererId) -> RendererId {
        self.renderers
            .borrow()
            .iter()
            .find(|(_, registration)| registration.foreign_id == Some(caller_id))
            .map(|(id, _)| *id)
            .unwrap_or(caller_id)
    }

    pub fn renderer_ids(&self) -> Vec<RendererId> {
        self.renderers.borrow().keys().copied().collect()
    }

    /// Registered renderers under our ids
    pub fn renderers(&self) -> Vec<(RendererId, R)> {
        self.snapshot()
            .into_iter()
            .map(|(id, registration)| (id, registration.renderer.clone()))
            .collect()
    }

    /// Forget one renderer. Registrations are never dropped implicitly.
    pub fn evict_renderer(&self, renderer_id: RendererId) -> bool {
        self.renderers.borrow_mut().remove(&renderer_id).is_some()
    }

    /// Forget every renderer (page is going away)
    pub fn reset(&self) {
        self.renderers.borrow_mut().clear();
        self.version_reported.set(false);
    }

    // Copy out the registry so nothing stays borrowed while renderer or
    // foreign code runs; they may call back into `inject`.
    fn snapshot(&self) -> Vec<(RendererId, Rc<Registration<R>>)> {
        self.renderers
            .borrow()
            .iter()
            .map(|(id, registration)| (*id, Rc::clone(registration)))
            .collect()
    }

    // Renderer capability first, then the wrapped hook, then whatever
    // roots this renderer has committed so far.
    fn roots_of(&self, registration: &Registration<R>) -> Vec<R::Root> {
        if let Some(roots) = registration.renderer.mounted_roots() {
            return roots;
        }
        let foreign = self.foreign.borrow().clone();
        if let (Some(foreign_id), Some(foreign)) = (registration.foreign_id, foreign) {
            let roots = foreign.fiber_roots(foreign_id);
            if !roots.is_empty() {
                return roots;
            }
        }
        registration.committed.borrow().clone()
    }

    /// Live roots of one renderer, as `getFiberRoots` hands them out
    pub fn raw_roots(&self, renderer_id: RendererId) -> Vec<R::Root> {
        let registration = self.renderers.borrow().get(&renderer_id).cloned();
        registration.map_or_else(Vec::new, |registration| self.roots_of(&registration))
    }

    /// Serialize every root of every registered renderer
    pub fn fiber_roots(&self) -> Vec<RootSnapshot> {
        let mut snapshots = Vec::new();
        for (renderer_id, registration) in self.snapshot() {
            for root in self.roots_of(&registration) {
                let current = root.current().unwrap_or_else(|e| {
                    log::warn!("Could not read current fiber of renderer {}: {}", renderer_id, e);
                    None
                });
                snapshots.push(RootSnapshot {
                    renderer_id,
                    root: self.serializer.serialize(current.as_ref()),
                });
            }
        }
        snapshots
    }

    /// Answer a `getFiberRoots` request
    pub fn post_fiber_roots(&self) {
        let roots = self.fiber_roots();
        log::debug!("Sending {} fiber roots", roots.len());
        self.post(Payload::FiberRoots(roots));
    }

    /// Live fiber addressed by `node`, if it still exists
    pub fn resolve_node(&self, node: &NodeRef) -> Option<FiberOf<R>> {
        let registration = self.renderers.borrow().get(&node.renderer_id).cloned()?;
        let root = self
            .roots_of(&registration)
            .into_iter()
            .nth(node.root_index as usize)?;
        let current = match root.current() {
            Ok(current) => current?,
            Err(e) => {
                log::warn!("Could not read root for {:?}: {}", node, e);
                return None;
            }
        };
        walk_path(current, &node.path).unwrap_or_else(|e| {
            log::warn!("Could not walk to {:?}: {}", node, e);
            None
        })
    }

    pub fn post(&self, payload: Payload) {
        self.sink
            .post(Envelope::new(Context::Page, payload).with_session(self.session));
    }

    /// Take over the renderers a foreign hook registered before we got here
    /// and replay each of their current roots through our own commit path
    /// once. Returns the number of replayed roots.
    fn adopt(&self, foreign: &Rc<dyn ForeignHook<R>>) -> usize {
        *self.foreign.borrow_mut() = Some(Rc::clone(foreign));

        let mut replayed = 0;
        for (foreign_id, renderer) in foreign.renderers() {
            self.register(renderer, Some(foreign_id));
            for root in foreign.fiber_roots(foreign_id) {
                self.on_foreign_commit(Some(foreign_id), &root, None);
                replayed += 1;
            }
        }
        replayed
    }
}

/// Result of an installation attempt
pub enum Installation<R: Renderer> {
    /// Our hook was already present; nothing changed
    AlreadyInstalled,
    /// No other hook existed; ours is the only one
    Fresh(Rc<DevtoolsHook<R>>),
    /// Another hook existed and now calls through to ours
    Wrapped {
        hook: Rc<DevtoolsHook<R>>,
        replayed: usize,
    },
}

impl<R: Renderer> Installation<R> {
    pub fn hook(&self) -> Option<&Rc<DevtoolsHook<R>>> {
        match self {
            Installation::AlreadyInstalled => None,
            Installation::Fresh(hook) | Installation::Wrapped { hook, .. } => Some(hook),
        }
    }
}

/// Install `hook` into `scope`. Idempotent: a second call finds our key and
/// returns `AlreadyInstalled` without touching anything.
pub fn install<R, P>(scope: &P, settings: &HookSettings, hook: DevtoolsHook<R>) -> Installation<R>
where
    R: Renderer + 'static,
    P: PageScope<R> + ?Sized,
{
    if scope.has_global(&settings.hook_key) {
        log::debug!("Hook already exists, not re-initializing");
        return Installation::AlreadyInstalled;
    }

    let hook = Rc::new(hook);
    scope.publish(&settings.hook_key, &hook);

    let Some(foreign) = scope.foreign_hook(&settings.react_hook_keys) else {
        if settings.claim_react_hook {
            if let Some(key) = settings.react_hook_keys.first() {
                scope.publish(key, &hook);
            }
        }
        log::debug!("Hook installed fresh under {}", settings.hook_key);
        return Installation::Fresh(hook);
    };

    log::debug!("Existing DevTools hook found, wrapping its methods");
    wrap(&hook, &foreign);
    let replayed = hook.adopt(&foreign);
    Installation::Wrapped { hook, replayed }
}

fn wrap<R: Renderer + 'static>(hook: &Rc<DevtoolsHook<R>>, foreign: &Rc<dyn ForeignHook<R>>) {
    let ours = Rc::downgrade(hook);
    let wrapped_inject = foreign.observe_inject(Rc::new(move |renderer: &R, foreign_id| {
        if let Some(ours) = ours.upgrade() {
            ours.register(renderer.clone(), foreign_id);
        }
    }));

    let ours = Rc::downgrade(hook);
    let wrapped_commit = foreign.observe_commit(Rc::new(
        move |foreign_id: Option<RendererId>, root: &R::Root, priority: Option<i32>| {
            if let Some(ours) = ours.upgrade() {
                ours.on_foreign_commit(foreign_id, root, priority);
            }
        },
    ));

    if !(wrapped_inject && wrapped_commit) {
        log::warn!(
            "Existing hook is missing methods (inject: {}, onCommitFiberRoot: {})",
            wrapped_inject,
            wrapped_commit
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::FiberLike;
    use crate::relay::PAGE_SOURCE;
    use crate::testing::{
        MockFiber, MockForeignHook, MockRenderer, MockRoot, MockScope, MockValue, RecordingSink,
    };
    use serde_json::json;

    fn new_hook(sink: &RecordingSink) -> DevtoolsHook<MockRenderer> {
        DevtoolsHook::new(Uuid::new_v4(), Serializer::default(), Rc::new(sink.clone()))
    }

    fn commits(sink: &RecordingSink) -> Vec<Commit> {
        sink.payloads()
            .into_iter()
            .filter_map(|p| match p {
                Payload::CommitFiberRoot(commit) => Some(commit),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_end_to_end_commit() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);

        let id = hook.inject(MockRenderer::new());
        let fiber = MockFiber::new(5).with_props(MockValue::object(vec![("text", MockValue::string("hi"))]));
        hook.on_commit_fiber_root(id, &MockRoot::new(Some(fiber)), Some(1));

        let sent = sink.envelopes();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].payload, Payload::RendererInjected(1));

        let message = sent[1].to_json().unwrap();
        assert_eq!(message["source"], json!(PAGE_SOURCE));
        assert_eq!(message["payload"]["type"], json!("commitFiberRoot"));
        assert_eq!(message["payload"]["data"]["rendererId"], json!(1));
        assert_eq!(message["payload"]["data"]["priority"], json!(1));
        assert_eq!(
            message["payload"]["data"]["root"],
            json!({
                "tag": 5,
                "key": null,
                "elementType": null,
                "type": null,
                "stateNode": null,
                "props": {"text": "hi"},
                "state": null,
                "child": null,
                "sibling": null,
            })
        );
    }

    #[test]
    fn test_multiple_renderers_keep_their_registrations() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);

        let first = hook.inject(MockRenderer::new().with_version("18.2.0"));
        let second = hook.inject(MockRenderer::new().with_version("17.0.2"));

        assert_ne!(first, second);
        assert_eq!(hook.renderer_ids(), vec![first, second]);
        assert_eq!(hook.renderers().len(), 2);
    }

    #[test]
    fn test_first_renderer_version_is_reported_once() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);

        hook.inject(MockRenderer::new());
        hook.inject(MockRenderer::new().with_version("18.2.0"));
        hook.inject(MockRenderer::new().with_version("17.0.2"));

        let detections: Vec<Detection> = sink
            .payloads()
            .into_iter()
            .filter_map(|p| match p {
                Payload::ReactDetected(detection) => Some(detection),
                _ => None,
            })
            .collect();
        assert_eq!(
            detections,
            vec![Detection {
                method: Probe::DevtoolsHook.id(),
                version: Some("18.2.0".to_string()),
            }]
        );

        // a fresh page after pagehide gets its own report
        hook.reset();
        hook.inject(MockRenderer::new().with_version("18.3.1"));
        let last = sink.payloads().pop();
        assert!(matches!(last, Some(Payload::ReactDetected(Detection { version: Some(v), .. })) if v == "18.3.1"));
    }

    #[test]
    fn test_commit_with_unreadable_root_still_reports() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);

        hook.on_commit_fiber_root(7, &MockRoot::failing("current getter threw"), None);

        let sent = commits(&sink);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].renderer_id, 7);
        assert_eq!(sent[0].root_index, None);
        assert!(sent[0].root.is_none());
    }

    #[test]
    fn test_committed_roots_are_remembered() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);
        let id = hook.inject(MockRenderer::new());
        let first = MockRoot::new(Some(MockFiber::new(3)));
        let second = MockRoot::new(Some(MockFiber::new(3).with_key("second")));

        hook.on_commit_fiber_root(id, &first, None);
        hook.on_commit_fiber_root(id, &second, None);
        hook.on_commit_fiber_root(id, &first, None);

        let indices: Vec<Option<u32>> = commits(&sink).iter().map(|c| c.root_index).collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(0)]);
        assert_eq!(hook.fiber_roots().len(), 2);

        let found = hook.resolve_node(&NodeRef {
            renderer_id: id,
            root_index: 1,
            path: vec![],
        });
        assert_eq!(found.unwrap().key().unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_renderer_without_roots_has_none() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);

        hook.inject(MockRenderer::new());
        hook.inject(MockRenderer::new().with_roots(vec![
            MockRoot::new(Some(MockFiber::new(3))),
            MockRoot::new(None),
        ]));

        let roots = hook.fiber_roots();
        assert_eq!(roots.len(), 2);
        assert!(roots.iter().all(|r| r.renderer_id == 2));
        assert_eq!(roots[0].root.as_ref().unwrap().tag, Some(3));
        assert!(roots[1].root.is_none());
    }

    #[test]
    fn test_evict_and_reset() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);
        let first = hook.inject(MockRenderer::new());
        let second = hook.inject(MockRenderer::new());

        assert!(hook.evict_renderer(first));
        assert!(!hook.evict_renderer(first));
        assert_eq!(hook.renderer_ids(), vec![second]);

        hook.reset();
        assert!(hook.renderer_ids().is_empty());
        assert_eq!(hook.inject(MockRenderer::new()), 3);
    }

    #[test]
    fn test_resolve_node_walks_path() {
        let sink = RecordingSink::default();
        let hook = new_hook(&sink);
        let root_fiber = MockFiber::new(3);
        let a = MockFiber::new(0);
        let b = MockFiber::new(5);
        root_fiber.set_child(Some(&a));
        a.set_sibling(Some(&b));
        let id = hook.inject(MockRenderer::new().with_roots(vec![MockRoot::new(Some(root_fiber))]));

        let found = hook.resolve_node(&NodeRef {
            renderer_id: id,
            root_index: 0,
            path: vec![1],
        });
        assert!(found.unwrap().ptr_eq(&b));

        let missing = hook.resolve_node(&NodeRef {
            renderer_id: id,
            root_index: 1,
            path: vec![],
        });
        assert!(missing.is_none());
    }

    #[test]
    fn test_install_fresh_claims_react_key() {
        let sink = RecordingSink::default();
        let scope = MockScope::default();
        let settings = HookSettings::default();

        let installation = install(&scope, &settings, new_hook(&sink));

        assert!(matches!(installation, Installation::Fresh(_)));
        assert!(scope.has_global(&settings.hook_key));
        assert!(scope.has_global("__REACT_DEVTOOLS_GLOBAL_HOOK__"));
    }

    #[test]
    fn test_install_is_idempotent() {
        let sink = RecordingSink::default();
        let scope = MockScope::default();
        let settings = HookSettings::default();

        let first = install(&scope, &settings, new_hook(&sink));
        let installed = Rc::clone(first.hook().unwrap());
        installed.inject(MockRenderer::new());

        let second = install(&scope, &settings, new_hook(&sink));

        assert!(matches!(second, Installation::AlreadyInstalled));
        assert_eq!(scope.published_count(), 2);
        let global = scope.global(&settings.hook_key).unwrap();
        assert!(Rc::ptr_eq(&global, &installed));
        assert_eq!(global.renderer_ids(), vec![1]);
    }

    #[test]
    fn test_wrapped_inject_calls_original_then_ours() {
        let sink = RecordingSink::default();
        let foreign = MockForeignHook::new(sink.log());
        let scope = MockScope::with_foreign(Rc::clone(&foreign));

        let installation = install(&scope, &HookSettings::default(), new_hook(&sink));
        assert!(matches!(installation, Installation::Wrapped { replayed: 0, .. }));
        assert!(!scope.has_global("__REACT_DEVTOOLS_GLOBAL_HOOK__"));

        let returned = foreign.call_inject(&MockRenderer::new());

        assert_eq!(returned, Some(100));
        assert_eq!(
            sink.log_entries(),
            vec!["original:inject".to_string(), "ours:rendererInjected".to_string()]
        );
        assert_eq!(foreign.known_renderer_ids(), vec![100]);
        assert_eq!(installation.hook().unwrap().renderer_ids(), vec![1]);
    }

    #[test]
    fn test_wrapped_commit_translates_foreign_ids() {
        let sink = RecordingSink::default();
        let foreign = MockForeignHook::new(sink.log());
        let scope = MockScope::with_foreign(Rc::clone(&foreign));
        install(&scope, &HookSettings::default(), new_hook(&sink));

        let foreign_id = foreign.call_inject(&MockRenderer::new()).unwrap();
        foreign.call_commit(Some(foreign_id), &MockRoot::new(Some(MockFiber::new(3))), Some(2));

        assert_eq!(
            sink.log_entries(),
            vec![
                "original:inject".to_string(),
                "ours:rendererInjected".to_string(),
                "original:commit".to_string(),
                "ours:commitFiberRoot".to_string(),
            ]
        );
        let sent = commits(&sink);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].renderer_id, 1);
        assert_eq!(sent[0].priority, Some(2));
    }

    #[test]
    fn test_install_replays_existing_roots() {
        let sink = RecordingSink::default();
        let foreign = MockForeignHook::new(sink.log());
        let renderer = MockRenderer::new();
        foreign.call_inject(&renderer);
        foreign.add_root(100, MockRoot::new(Some(MockFiber::new(3))));
        foreign.add_root(100, MockRoot::new(Some(MockFiber::new(3))));
        let scope = MockScope::with_foreign(Rc::clone(&foreign));

        let installation = install(&scope, &HookSettings::default(), new_hook(&sink));

        assert!(matches!(installation, Installation::Wrapped { replayed: 2, .. }));
        let sent = commits(&sink);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|c| c.renderer_id == 1 && c.priority.is_none()));

        // roots come from the foreign hook since the renderer cannot list them
        let hook = installation.hook().unwrap();
        assert_eq!(hook.fiber_roots().len(), 2);
    }

    #[test]
    fn test_foreign_inject_without_id_is_passed_through() {
        let sink = RecordingSink::default();
        let foreign = MockForeignHook::without_ids(sink.log());
        let scope = MockScope::with_foreign(Rc::clone(&foreign));
        let installation = install(&scope, &HookSettings::default(), new_hook(&sink));
        let hook = installation.hook().unwrap();

        let returned = foreign.call_inject(&MockRenderer::new());
        foreign.call_commit(None, &MockRoot::new(Some(MockFiber::new(3))), Some(4));

        assert_eq!(returned, None);
        assert_eq!(hook.renderer_ids(), vec![1]);
        assert_eq!(
            sink.log_entries(),
            vec![
                "original:inject".to_string(),
                "ours:rendererInjected".to_string(),
                "original:commit".to_string(),
                "ours:commitFiberRoot".to_string(),
            ]
        );
        let sent = commits(&sink);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].renderer_id, 1);
        assert_eq!(sent[0].priority, Some(4));
    }

    #[test]
    fn test_commit_without_id_is_ambiguous_with_two_renderers() {
        let sink = RecordingSink::default();
        let foreign = MockForeignHook::without_ids(sink.log());
        let scope = MockScope::with_foreign(Rc::clone(&foreign));
        install(&scope, &HookSettings::default(), new_hook(&sink));

        foreign.call_inject(&MockRenderer::new());
        foreign.call_inject(&MockRenderer::new());
        foreign.call_commit(None, &MockRoot::new(Some(MockFiber::new(3))), None);

        assert!(commits(&sink).is_empty());
        assert_eq!(sink.log_entries().last().map(String::as_str), Some("original:commit"));
    }
}
