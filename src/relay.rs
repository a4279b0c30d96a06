/// Message envelopes crossing execution-context boundaries
///
/// Every context (page agent, content script, background, panel) talks in
/// `Envelope`s. The `source` tag is the only filter a receiver applies; it
/// is not authentication, it just keeps unrelated `postMessage` traffic out.

use crate::serialized::SerializedNode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use uuid::Uuid;

pub const PAGE_SOURCE: &str = "react-minimal-devtools-extension";
pub const CONTENT_SOURCE: &str = "react-devtools-content-script";
pub const BACKGROUND_SOURCE: &str = "react-devtools-background";
pub const PANEL_SOURCE: &str = "react-devtools-panel";

/// Commits kept for a panel that has not connected yet
pub const DEFAULT_BUFFER_CAPACITY: usize = 8;

/// Identifier handed out by the hook for each registered renderer
pub type RendererId = u32;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("could not decode envelope: {0}")]
    Decode(String),
    #[error("could not encode envelope: {0}")]
    Encode(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Isolated execution contexts taking part in the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Page,
    ContentScript,
    Background,
    Panel,
}

impl Context {
    pub fn source_tag(self) -> &'static str {
        match self {
            Context::Page => PAGE_SOURCE,
            Context::ContentScript => CONTENT_SOURCE,
            Context::Background => BACKGROUND_SOURCE,
            Context::Panel => PANEL_SOURCE,
        }
    }
}

/// Which way a message travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Page towards the panel
    Upstream,
    /// Panel towards the page
    Downstream,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 1-based id of the probe that succeeded
    pub method: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub renderer_id: RendererId,
    /// Position of the committed root among the renderer's known roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_index: Option<u32>,
    pub root: Option<SerializedNode>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSnapshot {
    pub renderer_id: RendererId,
    pub root: Option<SerializedNode>,
}

/// Address of a fiber: renderer, index into that renderer's roots, then a
/// child-index path from the root's current fiber
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub renderer_id: RendererId,
    pub root_index: u32,
    pub path: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Payload {
    #[serde(rename = "inject-script-loaded")]
    InjectScriptLoaded,
    #[serde(rename = "content-script-loaded")]
    ContentScriptLoaded,
    ReactDetected(Detection),
    ReactNotDetected,
    ReactRootsFound(usize),
    RendererInjected(RendererId),
    CommitFiberRoot(Commit),
    GetFiberRoots,
    FiberRoots(Vec<RootSnapshot>),
    HighlightNode(NodeRef),
    ClearHighlight,
    StartInspecting,
    StopInspecting,
    InspectedElement(Box<SerializedNode>),
}

impl Payload {
    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::InjectScriptLoaded => "inject-script-loaded",
            Payload::ContentScriptLoaded => "content-script-loaded",
            Payload::ReactDetected(_) => "reactDetected",
            Payload::ReactNotDetected => "reactNotDetected",
            Payload::ReactRootsFound(_) => "reactRootsFound",
            Payload::RendererInjected(_) => "rendererInjected",
            Payload::CommitFiberRoot(_) => "commitFiberRoot",
            Payload::GetFiberRoots => "getFiberRoots",
            Payload::FiberRoots(_) => "fiberRoots",
            Payload::HighlightNode(_) => "highlightNode",
            Payload::ClearHighlight => "clearHighlight",
            Payload::StartInspecting => "startInspecting",
            Payload::StopInspecting => "stopInspecting",
            Payload::InspectedElement(_) => "inspectedElement",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Payload::GetFiberRoots
            | Payload::HighlightNode(_)
            | Payload::ClearHighlight
            | Payload::StartInspecting
            | Payload::StopInspecting => Direction::Downstream,
            _ => Direction::Upstream,
        }
    }
}

/// `{ source, session?, payload: { type, data? } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Uuid>,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(from: Context, payload: Payload) -> Self {
        Envelope {
            source: from.source_tag().to_string(),
            session: None,
            payload,
        }
    }

    pub fn with_session(mut self, session: Uuid) -> Self {
        self.session = Some(session);
        self
    }

    pub fn is_from(&self, context: Context) -> bool {
        self.source == context.source_tag()
    }

    /// Same payload and session, re-stamped with the forwarding context
    pub fn relabel(&self, from: Context) -> Envelope {
        Envelope {
            source: from.source_tag().to_string(),
            session: self.session,
            payload: self.payload.clone(),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, RelayError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Envelope, RelayError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Fire-and-forget outbound channel of one context
pub trait MessageSink {
    fn post(&self, envelope: Envelope);
}

/// Outcome of checking an envelope against the active page session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// A new page load began; state tied to the old one must be dropped
    NewSession,
    /// Leftover from an earlier page load
    Stale,
}

/// Tracks the current page-agent session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionGate {
    current: Option<Uuid>,
}

impl SessionGate {
    pub fn current(&self) -> Option<Uuid> {
        self.current
    }

    pub fn admit(&mut self, envelope: &Envelope) -> Admission {
        let Some(session) = envelope.session else {
            return Admission::Accept;
        };
        match self.current {
            Some(current) if current == session => Admission::Accept,
            Some(_) if envelope.payload != Payload::InjectScriptLoaded => Admission::Stale,
            Some(_) => {
                self.current = Some(session);
                Admission::NewSession
            }
            None => {
                self.current = Some(session);
                Admission::Accept
            }
        }
    }
}

/// Replay buffer for a consumer that attaches late
///
/// Keeps the latest lifecycle messages plus the last `capacity` commits of
/// the current page session.
#[derive(Debug, Clone)]
pub struct CommitBuffer {
    capacity: usize,
    gate: SessionGate,
    lifecycle: Vec<Envelope>,
    commits: VecDeque<Envelope>,
}

impl CommitBuffer {
    pub fn new(capacity: usize) -> Self {
        CommitBuffer {
            capacity,
            gate: SessionGate::default(),
            lifecycle: Vec::new(),
            commits: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, envelope: &Envelope) {
        match self.gate.admit(envelope) {
            Admission::Stale => {
                log::debug!("Dropping stale {} from buffer", envelope.payload.kind());
                return;
            }
            Admission::NewSession => self.clear(),
            Admission::Accept => {}
        }

        match &envelope.payload {
            Payload::CommitFiberRoot(_) => {
                if self.capacity == 0 {
                    return;
                }
                if self.commits.len() == self.capacity {
                    self.commits.pop_front();
                }
                self.commits.push_back(envelope.clone());
            }
            Payload::RendererInjected(_) => {
                if !self.lifecycle.contains(envelope) {
                    self.lifecycle.push(envelope.clone());
                }
            }
            Payload::InjectScriptLoaded
            | Payload::ContentScriptLoaded
            | Payload::ReactDetected(_)
            | Payload::ReactNotDetected
            | Payload::ReactRootsFound(_) => {
                let kind = envelope.payload.kind();
                self.lifecycle.retain(|e| e.payload.kind() != kind);
                self.lifecycle.push(envelope.clone());
            }
            _ => {}
        }
    }

    /// Lifecycle messages first, then commits oldest to newest
    pub fn replay(&self) -> Vec<Envelope> {
        self.lifecycle.iter().chain(self.commits.iter()).cloned().collect()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub fn clear(&mut self) {
        self.lifecycle.clear();
        self.commits.clear();
    }
}

impl Default for CommitBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
