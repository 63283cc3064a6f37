//! Per-node bookkeeping

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::engine::PropValue;
use crate::events::{EventHandler, EventKind};
use crate::foundation::collections::{NodeId, RootId};

use super::SceneGraph;

/// A disposer closure failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("disposer for {node:?} failed: {reason}")]
pub struct DisposalError {
    /// Node whose teardown ran the disposer
    pub node: Option<NodeId>,
    /// Human readable reason
    pub reason: String,
}

impl DisposalError {
    /// Create a disposal error
    pub fn new(reason: impl Into<String>) -> Self {
        Self { node: None, reason: reason.into() }
    }
}

/// Cleanup registered by a collaborator, run once when the node is removed
pub type Disposer = Box<dyn FnOnce() -> Result<(), DisposalError>>;

/// Custom attach: places `child` into `parent` and returns the undo
pub type AttachFn = Rc<dyn Fn(&mut SceneGraph, NodeId, NodeId) -> DetachFn>;

/// Undo of a custom attach
pub type DetachFn = Box<dyn FnOnce(&mut SceneGraph)>;

/// Where a non-child node plugs into its parent
#[derive(Clone)]
pub enum AttachDescriptor {
    /// Dotted property path on the parent (e.g. `material` or `shadow.camera`)
    Path(String),
    /// Resolver closure doing the placement itself
    Resolver(AttachFn),
}

impl AttachDescriptor {
    /// Attach to a dotted property path
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// Attach through a resolver closure
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&mut SceneGraph, NodeId, NodeId) -> DetachFn + 'static,
    {
        Self::Resolver(Rc::new(f))
    }
}

impl PartialEq for AttachDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Resolver(a), Self::Resolver(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for AttachDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Resolved placement of an attached node
pub(crate) enum AttachRecord {
    /// Assigned into a property slot; `previous` is restored on detach
    Slot {
        target: NodeId,
        path: String,
        previous: PropValue,
    },
    /// Placed by a resolver closure
    Custom {
        target: NodeId,
        detach: DetachFn,
    },
}

impl AttachRecord {
    pub(crate) fn target(&self) -> NodeId {
        match self {
            Self::Slot { target, .. } | Self::Custom { target, .. } => *target,
        }
    }
}

/// Bookkeeping attached to every graph node
pub struct NodeLocalState {
    /// Tag the node was declared with
    pub tag: String,
    /// Constructor arguments (a change rebuilds the node)
    pub args: Vec<PropValue>,
    /// Owning root
    pub root: RootId,
    /// Declared (local) parent; a plain id, so it never keeps the parent alive
    pub parent: Option<NodeId>,
    /// Declared children in insertion order, without duplicates
    pub children: Vec<NodeId>,
    /// Requested placement, when not the default child collection
    pub attach: Option<AttachDescriptor>,
    /// Registered event handlers
    pub handlers: HashMap<EventKind, EventHandler>,
    /// Externally owned object: never disposed by the reconciler
    pub primitive: bool,
    /// Whether removal calls the engine-level dispose
    pub dispose: bool,
    pub(crate) attached: Option<AttachRecord>,
    pub(crate) memoized: HashMap<String, PropValue>,
    disposers: Vec<Disposer>,
}

impl NodeLocalState {
    /// Fresh local state for a node of the given tag
    pub fn new(tag: impl Into<String>, args: Vec<PropValue>, root: RootId) -> Self {
        Self {
            tag: tag.into(),
            args,
            root,
            parent: None,
            children: Vec::new(),
            attach: None,
            handlers: HashMap::new(),
            primitive: false,
            dispose: true,
            attached: None,
            memoized: HashMap::new(),
            disposers: Vec::new(),
        }
    }

    /// Register a cleanup closure run when the node is removed
    pub fn add_disposer(&mut self, disposer: Disposer) {
        self.disposers.push(disposer);
    }

    /// Number of pending disposers
    pub fn disposer_count(&self) -> usize {
        self.disposers.len()
    }

    /// Whether any event handler is registered
    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Insert a local child at a position (clamped)
    pub(crate) fn insert_child_at(&mut self, index: usize, child: NodeId) {
        self.children.retain(|c| *c != child);
        let index = index.min(self.children.len());
        self.children.insert(index, child);
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) -> Option<usize> {
        let index = self.children.iter().position(|c| *c == child)?;
        self.children.remove(index);
        Some(index)
    }

    /// Run every disposer once; failures are logged and do not stop the rest
    ///
    /// Returns the number of disposers that failed.
    pub(crate) fn run_disposers(&mut self, node: NodeId) -> usize {
        let mut failures = 0;
        for disposer in self.disposers.drain(..) {
            if let Err(mut err) = disposer() {
                err.node = Some(node);
                log::error!("DisposalError: {}", err);
                failures += 1;
            }
        }
        failures
    }
}

impl fmt::Debug for NodeLocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLocalState")
            .field("tag", &self.tag)
            .field("args", &self.args)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("attach", &self.attach)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("primitive", &self.primitive)
            .field("disposers", &self.disposers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn node_id() -> NodeId {
        let mut map = slotmap::SlotMap::<NodeId, ()>::with_key();
        map.insert(())
    }

    #[test]
    fn test_children_stay_unique() {
        let mut local = NodeLocalState::new("group", Vec::new(), RootId(0));
        let mut ids = slotmap::SlotMap::<NodeId, ()>::with_key();
        let (first, second) = (ids.insert(()), ids.insert(()));
        local.insert_child_at(0, first);
        local.insert_child_at(usize::MAX, second);
        assert_eq!(local.children, vec![first, second]);

        // Reinserting moves instead of duplicating
        local.insert_child_at(usize::MAX, first);
        assert_eq!(local.children, vec![second, first]);
        assert_eq!(local.remove_child(first), Some(1));
        assert_eq!(local.children, vec![second]);
    }

    #[test]
    fn test_failing_disposer_does_not_short_circuit() {
        let ran = Rc::new(Cell::new(0));
        let mut local = NodeLocalState::new("mesh", Vec::new(), RootId(0));
        local.add_disposer(Box::new(|| Err(DisposalError::new("boom"))));
        let counter = ran.clone();
        local.add_disposer(Box::new(move || {
            counter.set(counter.get() + 1);
            Ok(())
        }));
        assert_eq!(local.run_disposers(node_id()), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(local.disposer_count(), 0);
    }

    #[test]
    fn test_attach_descriptor_equality() {
        let resolver = AttachDescriptor::resolver(|_, _, _| Box::new(|_: &mut SceneGraph| {}));
        assert_eq!(resolver, resolver.clone());
        assert_eq!(AttachDescriptor::path("material"), AttachDescriptor::path("material"));
        assert_ne!(AttachDescriptor::path("material"), resolver);
    }
}
