/// Read-only access to foreign fiber graphs
///
/// Fibers and the values hanging off them belong to the page's React
/// runtime. Every read can fail (a hostile getter, a revoked proxy), so all
/// accessors return `Result`. There is deliberately no accessor for the
/// `return` pointer: traversal only ever moves down (`child`) and across
/// (`sibling`).

use thiserror::Error;

/// A foreign read that could not be completed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("reading `{field}` threw: {reason}")]
    Threw { field: String, reason: String },
    #[error("value is not an object")]
    NotAnObject,
}

impl AccessError {
    pub fn threw(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AccessError::Threw {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Shape of a foreign value, as far as serialization cares
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Symbol(String),
    /// Function or class reference, with its `name` when it has one
    Function(Option<String>),
    /// Host platform object (a DOM node), described by its node name
    Host(String),
    Array,
    Object,
}

/// The first `items` of a collection, plus how many there were in total
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Listing<T> {
    pub fn truncated(&self) -> usize {
        self.total.saturating_sub(self.items.len())
    }
}

pub type Entry<V> = (String, Result<V, AccessError>);

/// A nested value found on a fiber (props, state, type references)
pub trait ForeignValue: Sized {
    fn kind(&self) -> Result<ValueKind, AccessError>;

    /// One named field; `Ok(None)` when it is null or absent.
    fn get(&self, key: &str) -> Result<Option<Self>, AccessError>;

    /// Up to `limit` own string-keyed fields of an object. Each field read
    /// can fail on its own.
    fn entries(&self, limit: usize) -> Result<Listing<Entry<Self>>, AccessError>;

    /// Up to `limit` leading elements of an array.
    fn elements(&self, limit: usize) -> Result<Listing<Result<Self, AccessError>>, AccessError>;
}

/// Value-typed fields of a fiber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberField {
    ElementType,
    Type,
    StateNode,
    MemoizedProps,
    MemoizedState,
}

impl FiberField {
    /// Property name on the foreign object
    pub fn property(self) -> &'static str {
        match self {
            FiberField::ElementType => "elementType",
            FiberField::Type => "type",
            FiberField::StateNode => "stateNode",
            FiberField::MemoizedProps => "memoizedProps",
            FiberField::MemoizedState => "memoizedState",
        }
    }
}

/// A node of a renderer's fiber tree
pub trait FiberLike: Sized {
    type Value: ForeignValue;

    fn tag(&self) -> Result<Option<i64>, AccessError>;

    fn key(&self) -> Result<Option<String>, AccessError>;

    /// `Ok(None)` when the field is null or absent.
    fn field(&self, field: FiberField) -> Result<Option<Self::Value>, AccessError>;

    fn child(&self) -> Result<Option<Self>, AccessError>;

    fn sibling(&self) -> Result<Option<Self>, AccessError>;
}

/// A committed root container (`FiberRootNode` in React)
pub trait FiberRoot {
    type Fiber: FiberLike;

    /// The root's current fiber
    fn current(&self) -> Result<Option<Self::Fiber>, AccessError>;

    /// Identity, not structural equality
    fn is_same(&self, other: &Self) -> bool;
}

/// Walk a child-index path down from `root`.
///
/// Index `i` at each level selects the `i`-th entry of the child list
/// (first `child`, then `sibling` links). An empty path addresses `root`.
pub fn walk_path<F: FiberLike>(root: F, path: &[u32]) -> Result<Option<F>, AccessError> {
    let mut node = root;
    for &index in path {
        let Some(mut cursor) = node.child()? else {
            return Ok(None);
        };
        for _ in 0..index {
            match cursor.sibling()? {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }
        node = cursor;
    }
    Ok(Some(node))
}

/// First result of `pick` along the `child` chain starting at `fiber`
/// (itself included), looking at most `max_depth` levels down.
pub fn find_down<F, T>(fiber: F, max_depth: usize, mut pick: impl FnMut(&F) -> Option<T>) -> Option<T>
where
    F: FiberLike,
{
    let mut cursor = fiber;
    for _ in 0..max_depth {
        if let Some(found) = pick(&cursor) {
            return Some(found);
        }
        cursor = match cursor.child() {
            Ok(Some(child)) => child,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("Stopped walking down: {}", e);
                return None;
            }
        };
    }
    None
}
