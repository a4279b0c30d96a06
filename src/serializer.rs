/// Fiber graph -> bounded, acyclic, JSON-safe tree
///
/// Nothing in here fails outward. Unreadable fields become placeholder
/// tags, runaway graphs are cut at the depth ceiling or the node budget,
/// and the caller always gets the best partial tree available.

use crate::fiber::{AccessError, FiberField, FiberLike, ForeignValue, ValueKind};
use crate::serialized::{MAX_SAFE_INTEGER, SerializedNode, SerializedValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node levels serialized below (and including) the root
pub const MAX_FIBER_DEPTH: usize = 50;
/// Nesting allowed inside props and state
pub const MAX_VALUE_DEPTH: usize = 8;
/// Nodes serialized per traversal
pub const MAX_NODES: usize = 10_000;
/// Fields or elements kept per object or array
pub const MAX_ENTRIES: usize = 100;
/// Values visited per props or state field
pub const MAX_VALUES: usize = 2_000;

/// Marker appended to a collection that was cut at `max_entries`
pub const TRUNCATED_MARKER: &str = "…";

/// Traversal ceilings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SerializerLimits {
    pub fiber_depth: usize,
    pub value_depth: usize,
    pub max_nodes: usize,
    pub max_entries: usize,
    pub max_values: usize,
}

impl Default for SerializerLimits {
    fn default() -> Self {
        SerializerLimits {
            fiber_depth: MAX_FIBER_DEPTH,
            value_depth: MAX_VALUE_DEPTH,
            max_nodes: MAX_NODES,
            max_entries: MAX_ENTRIES,
            max_values: MAX_VALUES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Serializer {
    limits: SerializerLimits,
}

impl Serializer {
    pub fn new(limits: SerializerLimits) -> Self {
        Serializer { limits }
    }

    /// Serialize a fiber with its whole child/sibling structure.
    pub fn serialize<F: FiberLike>(&self, fiber: Option<&F>) -> Option<SerializedNode> {
        let fiber = fiber?;
        let mut traversal = Traversal {
            limits: &self.limits,
            remaining: self.limits.max_nodes,
        };
        traversal.node(fiber, 0)
    }

    /// Serialize only the fiber's own fields, without `child` or `sibling`.
    pub fn serialize_detached<F: FiberLike>(&self, fiber: &F) -> SerializedNode {
        let mut traversal = Traversal {
            limits: &self.limits,
            remaining: 1,
        };
        traversal.fields(fiber)
    }

    /// Coerce a standalone value with the configured limits.
    pub fn coerce<V: ForeignValue>(&self, value: &V) -> SerializedValue {
        Coercion::new(&self.limits).value(value, 0)
    }
}

struct Traversal<'a> {
    limits: &'a SerializerLimits,
    remaining: usize,
}

impl Traversal<'_> {
    /// Serialize `first` and the sibling chain that follows it, all at `depth`.
    ///
    /// Siblings are walked in a loop and linked afterwards so that stack use
    /// grows with depth only.
    fn node<F: FiberLike>(&mut self, first: &F, depth: usize) -> Option<SerializedNode> {
        if depth >= self.limits.fiber_depth {
            return None;
        }

        let mut level: Vec<SerializedNode> = Vec::new();
        let mut cursor: Option<F> = None;
        loop {
            let current = cursor.as_ref().unwrap_or(first);
            if self.remaining == 0 {
                log::warn!("Node budget of {} exhausted, truncating tree", self.limits.max_nodes);
                break;
            }

            let mut node = self.fields(current);
            node.child = match current.child() {
                Ok(Some(child)) => self.node(&child, depth + 1).map(Box::new),
                Ok(None) => None,
                Err(e) => {
                    log::warn!("Skipping unreadable child at depth {}: {}", depth, e);
                    None
                }
            };
            level.push(node);

            match current.sibling() {
                Ok(Some(next)) => cursor = Some(next),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Skipping unreadable sibling at depth {}: {}", depth, e);
                    break;
                }
            }
        }

        level.into_iter().rev().fold(None, |sibling, mut node| {
            node.sibling = sibling.map(Box::new);
            Some(node)
        })
    }

    fn fields<F: FiberLike>(&mut self, fiber: &F) -> SerializedNode {
        self.remaining = self.remaining.saturating_sub(1);

        let tag = fiber
            .tag()
            .unwrap_or_else(|e| {
                log::warn!("Unreadable fiber tag: {}", e);
                None
            })
            .filter(|tag| tag.unsigned_abs() <= MAX_SAFE_INTEGER as u64);
        let key = fiber.key().unwrap_or_else(|e| {
            log::warn!("Unreadable fiber key: {}", e);
            None
        });

        let element_type = read_field(fiber, FiberField::ElementType);
        let node_type = read_field(fiber, FiberField::Type);
        let name = element_type
            .as_ref()
            .and_then(display_name)
            .or_else(|| node_type.as_ref().and_then(display_name));

        SerializedNode {
            tag,
            key,
            name,
            element_type: self.summarize(element_type),
            node_type: self.summarize(node_type),
            state_node: self.summarize(read_field(fiber, FiberField::StateNode)),
            props: self.nested(read_field(fiber, FiberField::MemoizedProps)),
            state: self.nested(read_field(fiber, FiberField::MemoizedState)),
            child: None,
            sibling: None,
        }
    }

    fn summarize<V: ForeignValue>(&self, read: Option<Result<V, AccessError>>) -> SerializedValue {
        match read {
            None => SerializedValue::Null,
            Some(Ok(value)) => summarize_value(&value),
            Some(Err(e)) => placeholder(&e),
        }
    }

    fn nested<V: ForeignValue>(&self, read: Option<Result<V, AccessError>>) -> SerializedValue {
        match read {
            None => SerializedValue::Null,
            Some(Ok(value)) => Coercion::new(self.limits).value(&value, 0),
            Some(Err(e)) => placeholder(&e),
        }
    }
}

// `None` for a null field, `Some(Err)` for a field whose read threw.
fn read_field<F: FiberLike>(fiber: &F, field: FiberField) -> Option<Result<F::Value, AccessError>> {
    fiber.field(field).transpose()
}

fn placeholder(error: &AccessError) -> SerializedValue {
    log::warn!("Replacing unserializable value: {}", error);
    SerializedValue::tag(format!("[Unserializable: {}]", error))
}

fn function_tag(name: Option<&str>) -> SerializedValue {
    SerializedValue::tag(format!("Function {}", name.filter(|n| !n.is_empty()).unwrap_or("anonymous")))
}

fn primitive(kind: ValueKind) -> Option<SerializedValue> {
    let value = match kind {
        ValueKind::Null => SerializedValue::Null,
        ValueKind::Bool(b) => SerializedValue::Bool(b),
        ValueKind::Number(n) if n.is_finite() => SerializedValue::Number(n),
        ValueKind::Number(n) => SerializedValue::tag(n.to_string().replace("inf", "Infinity")),
        ValueKind::String(s) => SerializedValue::String(s),
        ValueKind::Symbol(s) => SerializedValue::Tag(s),
        ValueKind::Function(name) => function_tag(name.as_deref()),
        ValueKind::Host(node_name) => SerializedValue::Tag(node_name),
        ValueKind::Array | ValueKind::Object => return None,
    };
    Some(value)
}

/// Shallow coercion used for type references and `stateNode`
fn summarize_value<V: ForeignValue>(value: &V) -> SerializedValue {
    match value.kind() {
        Err(e) => placeholder(&e),
        Ok(ValueKind::Array) => SerializedValue::tag("[Array]"),
        Ok(ValueKind::Object) => SerializedValue::tag("[Object]"),
        Ok(kind) => primitive(kind).unwrap_or_default(),
    }
}

/// Deep coercion of one props or state value.
///
/// Depth and width are bounded per level; `budget` bounds the total number
/// of values visited so wide graphs (React elements linking back to their
/// owner fibers) stay small.
struct Coercion<'a> {
    limits: &'a SerializerLimits,
    budget: usize,
}

impl<'a> Coercion<'a> {
    fn new(limits: &'a SerializerLimits) -> Self {
        Coercion {
            limits,
            budget: limits.max_values,
        }
    }

    fn value<V: ForeignValue>(&mut self, value: &V, depth: usize) -> SerializedValue {
        if self.budget == 0 {
            return SerializedValue::tag(TRUNCATED_MARKER);
        }
        self.budget -= 1;

        let kind = match value.kind() {
            Ok(kind) => kind,
            Err(e) => return placeholder(&e),
        };

        match kind {
            ValueKind::Array if depth + 1 >= self.limits.value_depth => SerializedValue::tag("[Array]"),
            ValueKind::Object if depth + 1 >= self.limits.value_depth => SerializedValue::tag("[Object]"),
            ValueKind::Array => match value.elements(self.limits.max_entries) {
                Err(e) => placeholder(&e),
                Ok(listing) => {
                    let truncated = listing.truncated();
                    let mut items: Vec<SerializedValue> = listing
                        .items
                        .into_iter()
                        .map(|element| match element {
                            Ok(element) => self.value(&element, depth + 1),
                            Err(e) => placeholder(&e),
                        })
                        .collect();
                    if truncated > 0 {
                        items.push(SerializedValue::tag(TRUNCATED_MARKER));
                    }
                    SerializedValue::List(items)
                }
            },
            ValueKind::Object => match value.entries(self.limits.max_entries) {
                Err(e) => placeholder(&e),
                Ok(listing) => {
                    let truncated = listing.truncated();
                    let mut map: BTreeMap<String, SerializedValue> = listing
                        .items
                        .into_iter()
                        .map(|(key, field)| {
                            let coerced = match field {
                                Ok(field) => self.value(&field, depth + 1),
                                Err(e) => placeholder(&e),
                            };
                            (key, coerced)
                        })
                        .collect();
                    if truncated > 0 {
                        map.insert(
                            TRUNCATED_MARKER.to_string(),
                            SerializedValue::tag(format!("{} more", truncated)),
                        );
                    }
                    SerializedValue::Map(map)
                }
            },
            other => primitive(other).unwrap_or_default(),
        }
    }
}

/// Component name carried by an `elementType`/`type` reference
fn display_name<V: ForeignValue>(read: &Result<V, AccessError>) -> Option<String> {
    let value = read.as_ref().ok()?;
    match value.kind().ok()? {
        ValueKind::String(s) => Some(s),
        ValueKind::Function(name) => name.filter(|n| !n.is_empty()),
        ValueKind::Object => match value.get("displayName").ok()??.kind().ok()? {
            ValueKind::String(s) => Some(s),
            _ => None,
        },
        _ => None,
    }
}
