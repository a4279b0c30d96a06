/// Owned, JSON-safe representation of a captured fiber tree
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// `Number.MAX_SAFE_INTEGER`; anything larger is rejected as an integer at
/// the JS boundary
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// `n` as an integer when JS can carry it as one exactly
pub fn safe_integer(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER).then_some(n as i64)
}

/// A coerced props/state/type value
///
/// `Tag` stands in for something JSON cannot carry (a function, a symbol,
/// a DOM node, an unreadable field). On the wire it is a plain string.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum SerializedValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    #[serde(skip_deserializing)]
    Tag(String),
    List(Vec<SerializedValue>),
    Map(BTreeMap<String, SerializedValue>),
}

impl SerializedValue {
    pub fn tag(text: impl Into<String>) -> Self {
        SerializedValue::Tag(text.into())
    }

    /// Text of a string or a tag
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SerializedValue::String(s) | SerializedValue::Tag(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&SerializedValue> {
        match self {
            SerializedValue::Map(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<&str> for SerializedValue {
    fn from(value: &str) -> Self {
        SerializedValue::String(value.to_string())
    }
}

impl From<f64> for SerializedValue {
    fn from(value: f64) -> Self {
        SerializedValue::Number(value)
    }
}

impl From<bool> for SerializedValue {
    fn from(value: bool) -> Self {
        SerializedValue::Bool(value)
    }
}

impl Serialize for SerializedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SerializedValue::Null => serializer.serialize_unit(),
            SerializedValue::Bool(b) => serializer.serialize_bool(*b),
            SerializedValue::Number(n) => serialize_number(*n, serializer),
            SerializedValue::String(s) | SerializedValue::Tag(s) => serializer.serialize_str(s),
            SerializedValue::List(items) => items.serialize(serializer),
            SerializedValue::Map(map) => map.serialize(serializer),
        }
    }
}

// JS numbers are all f64; integral ones go out as integers so `1` stays `1`.
fn serialize_number<S: Serializer>(n: f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.is_nan() {
        serializer.serialize_str("NaN")
    } else if n.is_infinite() {
        serializer.serialize_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if let Some(integer) = safe_integer(n) {
        serializer.serialize_i64(integer)
    } else {
        serializer.serialize_f64(n)
    }
}

/// One serialized fiber. Never carries a parent pointer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedNode {
    pub tag: Option<i64>,
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub element_type: SerializedValue,
    #[serde(rename = "type", default)]
    pub node_type: SerializedValue,
    #[serde(default)]
    pub state_node: SerializedValue,
    #[serde(default)]
    pub props: SerializedValue,
    #[serde(default)]
    pub state: SerializedValue,
    #[serde(default)]
    pub child: Option<Box<SerializedNode>>,
    #[serde(default)]
    pub sibling: Option<Box<SerializedNode>>,
}

impl SerializedNode {
    /// Name to show in a tree view
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.tag {
            Some(tag) => format!("<{}>", tag_label(tag)),
            None => "Unknown".to_string(),
        }
    }

    /// Direct children, left to right
    pub fn children(&self) -> Children<'_> {
        Children {
            next: self.child.as_deref(),
        }
    }

    /// Number of node levels in this subtree (siblings excluded)
    pub fn depth(&self) -> usize {
        1 + self.children().map(|c| c.depth()).max().unwrap_or(0)
    }

    /// Number of nodes in this subtree (siblings excluded)
    pub fn count(&self) -> usize {
        1 + self.children().map(|c| c.count()).sum::<usize>()
    }

    /// Node addressed by a child-index path; empty path is `self`
    pub fn node_at(&self, path: &[u32]) -> Option<&SerializedNode> {
        let mut node = self;
        for &index in path {
            node = node.children().nth(index as usize)?;
        }
        Some(node)
    }

    /// Paths of every node in this subtree whose display name contains
    /// `query` (case-insensitive), in pre-order
    pub fn find_paths(&self, query: &str) -> Vec<Vec<u32>> {
        let query = query.to_lowercase();
        let mut found = Vec::new();
        let mut path = Vec::new();
        collect_matches(self, &query, &mut path, &mut found);
        found
    }
}

fn collect_matches(
    node: &SerializedNode,
    query: &str,
    path: &mut Vec<u32>,
    found: &mut Vec<Vec<u32>>,
) {
    if node.display_name().to_lowercase().contains(query) {
        found.push(path.clone());
    }
    for (index, child) in node.children().enumerate() {
        path.push(index as u32);
        collect_matches(child, query, path, found);
        path.pop();
    }
}

/// Iterator over a node's child list
pub struct Children<'a> {
    next: Option<&'a SerializedNode>,
}

impl<'a> Iterator for Children<'a> {
    type Item = &'a SerializedNode;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.sibling.as_deref();
        Some(current)
    }
}

/// Human label for the React work tags that commonly show up
pub fn tag_label(tag: i64) -> &'static str {
    match tag {
        0 => "FunctionComponent",
        1 => "ClassComponent",
        3 => "HostRoot",
        4 => "HostPortal",
        5 => "HostComponent",
        6 => "HostText",
        7 => "Fragment",
        8 => "Mode",
        9 => "ContextConsumer",
        10 => "ContextProvider",
        11 => "ForwardRef",
        12 => "Profiler",
        13 => "SuspenseComponent",
        14 => "MemoComponent",
        15 => "SimpleMemoComponent",
        16 => "LazyComponent",
        _ => "Unknown",
    }
}
