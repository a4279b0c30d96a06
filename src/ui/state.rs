/// Panel view state, driven entirely by envelopes coming up from the page

use crate::relay::{Admission, Context, Envelope, NodeRef, Payload, RendererId, SessionGate};
use crate::serialized::SerializedNode;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use yew::Reducible;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Detecting,
    ReactDetected,
    ComponentsLoaded,
    NotDetected,
}

impl LoadState {
    pub fn message(self) -> &'static str {
        match self {
            LoadState::Detecting => "Detecting React...",
            LoadState::ReactDetected => "React detected. Loading component tree...",
            LoadState::ComponentsLoaded => "",
            LoadState::NotDetected => "React was not detected on this page",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelState {
    pub load: LoadState,
    pub gate: SessionGate,
    pub version: Option<String>,
    pub renderers: Vec<RendererId>,
    /// Latest tree per (renderer, root index)
    pub roots: BTreeMap<(RendererId, u32), SerializedNode>,
    pub roots_found: usize,
    pub selected: Option<NodeRef>,
    pub collapsed: BTreeSet<NodeRef>,
    pub inspecting: bool,
    pub inspected: Option<SerializedNode>,
    pub search: String,
}

pub enum PanelAction {
    Received(Envelope),
    Select(NodeRef),
    ToggleCollapsed(NodeRef),
    Search(String),
    SetInspecting(bool),
}

impl PanelState {
    /// Fold one envelope in. Returns false when it was ignored.
    pub fn apply(&mut self, envelope: &Envelope) -> bool {
        if !envelope.is_from(Context::Page) && !envelope.is_from(Context::ContentScript) {
            return false;
        }
        match self.gate.admit(envelope) {
            Admission::Stale => {
                log::debug!("Panel dropped stale {}", envelope.payload.kind());
                return false;
            }
            Admission::NewSession => self.reset(),
            Admission::Accept => {}
        }

        match &envelope.payload {
            Payload::InjectScriptLoaded | Payload::ContentScriptLoaded => {}
            Payload::ReactDetected(detection) => {
                self.mark_detected();
                if detection.version.is_some() {
                    self.version = detection.version.clone();
                }
            }
            Payload::ReactNotDetected => {
                if self.load == LoadState::Detecting {
                    self.load = LoadState::NotDetected;
                }
            }
            Payload::ReactRootsFound(count) => self.roots_found = *count,
            Payload::RendererInjected(id) => {
                self.add_renderer(*id);
                self.mark_detected();
            }
            Payload::CommitFiberRoot(commit) => {
                self.add_renderer(commit.renderer_id);
                let key = (commit.renderer_id, commit.root_index.unwrap_or(0));
                match &commit.root {
                    Some(root) => {
                        self.roots.insert(key, root.clone());
                    }
                    None => {
                        self.roots.remove(&key);
                    }
                }
                self.load = LoadState::ComponentsLoaded;
            }
            Payload::FiberRoots(snapshots) => {
                // positions within each renderer match the agent's addressing
                let mut next_index: BTreeMap<RendererId, u32> = BTreeMap::new();
                self.roots.clear();
                for snapshot in snapshots {
                    let index = next_index.entry(snapshot.renderer_id).or_default();
                    if let Some(root) = &snapshot.root {
                        self.roots.insert((snapshot.renderer_id, *index), root.clone());
                    }
                    *index += 1;
                    self.add_renderer(snapshot.renderer_id);
                }
                if !self.roots.is_empty() {
                    self.load = LoadState::ComponentsLoaded;
                }
            }
            Payload::InspectedElement(node) => {
                self.inspected = Some((**node).clone());
                self.inspecting = false;
            }
            Payload::GetFiberRoots
            | Payload::HighlightNode(_)
            | Payload::ClearHighlight
            | Payload::StartInspecting
            | Payload::StopInspecting => return false,
        }
        true
    }

    /// Forget everything tied to the previous page load
    fn reset(&mut self) {
        *self = PanelState {
            gate: self.gate.clone(),
            search: std::mem::take(&mut self.search),
            ..PanelState::default()
        };
    }

    fn mark_detected(&mut self) {
        if matches!(self.load, LoadState::Detecting | LoadState::NotDetected) {
            self.load = LoadState::ReactDetected;
        }
    }

    fn add_renderer(&mut self, id: RendererId) {
        if !self.renderers.contains(&id) {
            self.renderers.push(id);
        }
    }

    pub fn root_refs(&self) -> impl Iterator<Item = (NodeRef, &SerializedNode)> {
        self.roots.iter().map(|(&(renderer_id, root_index), root)| {
            (
                NodeRef {
                    renderer_id,
                    root_index,
                    path: Vec::new(),
                },
                root,
            )
        })
    }

    pub fn node(&self, node: &NodeRef) -> Option<&SerializedNode> {
        self.roots
            .get(&(node.renderer_id, node.root_index))?
            .node_at(&node.path)
    }

    /// What the details pane shows: a picked element wins over the tree selection
    pub fn details(&self) -> Option<&SerializedNode> {
        self.inspected
            .as_ref()
            .or_else(|| self.selected.as_ref().and_then(|node| self.node(node)))
    }

    /// Nodes whose name contains the search text, across every root
    pub fn matches(&self) -> BTreeSet<NodeRef> {
        if self.search.trim().is_empty() {
            return BTreeSet::new();
        }
        self.root_refs()
            .flat_map(|(root_ref, root)| {
                root.find_paths(self.search.trim())
                    .into_iter()
                    .map(move |path| NodeRef {
                        path,
                        ..root_ref.clone()
                    })
            })
            .collect()
    }

    pub fn is_collapsed(&self, node: &NodeRef) -> bool {
        self.collapsed.contains(node)
    }
}

impl Reducible for PanelState {
    type Action = PanelAction;

    fn reduce(self: Rc<Self>, action: Self::Action) -> Rc<Self> {
        let mut next = (*self).clone();
        match action {
            PanelAction::Received(envelope) => {
                if !next.apply(&envelope) {
                    return self;
                }
            }
            PanelAction::Select(node) => {
                next.selected = Some(node);
                next.inspected = None;
            }
            PanelAction::ToggleCollapsed(node) => {
                if !next.collapsed.remove(&node) {
                    next.collapsed.insert(node);
                }
            }
            PanelAction::Search(text) => next.search = text,
            PanelAction::SetInspecting(on) => next.inspecting = on,
        }
        Rc::new(next)
    }
}
