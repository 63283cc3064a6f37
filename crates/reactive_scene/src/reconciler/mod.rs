//! # Reconciler
//!
//! Translates tree operations (create, insert, update, remove) into scene
//! graph mutations.
//!
//! ## Placement
//!
//! A child without an attach descriptor goes into its container's default
//! child collection, unless its object reports a default slot (materials
//! attach to `material`, geometries to `geometry`). The container is the
//! local parent, or for wrapper parents the nearest engine-instantiated
//! local ancestor. An attach path that cannot be resolved falls back to
//! default placement with a warning.
//!
//! ## Removal
//!
//! Removing a node tears down its subtree children first, then clears its
//! handlers, runs its disposers once, detaches it (restoring the attach
//! slot) and finally calls the engine-level `dispose()`, unless the node
//! is a primitive or was mounted with `dispose = false`.

mod attach;
pub mod tree;

pub use tree::{Element, ElementKind, NodeRef, TreeMount};

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use thiserror::Error;

use crate::catalogue::{Catalogue, UnknownTagError};
use crate::engine::{Capabilities, PropValue, PropertyError, SceneObject, SharedObject};
use crate::events::{EventHandler, EventKind};
use crate::foundation::collections::{NodeId, RootId};
use crate::scene::{AttachDescriptor, Disposer, NodeBody, NodeLocalState, SceneGraph};
use crate::store::Store;

/// Reconciler errors
#[derive(Error, Debug)]
pub enum ReconcilerError {
    /// Tag is not registered
    #[error(transparent)]
    UnknownTag(#[from] UnknownTagError),

    /// The constructor rejected its arguments
    #[error("failed to construct '{tag}': {reason}")]
    Construct {
        /// Tag being constructed
        tag: String,
        /// Constructor message
        reason: String,
    },

    /// The node id is stale or belongs to another root
    #[error("node {0:?} is not in the scene graph")]
    MissingNode(NodeId),

    /// A property assignment failed
    #[error("property update on {node:?} failed: {source}")]
    Property {
        /// Node being updated
        node: NodeId,
        /// Underlying error
        #[source]
        source: PropertyError,
    },

    /// The insertion would make a node its own ancestor
    #[error("inserting {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },
}

/// Result type for reconciler operations
pub type ReconcilerResult<T> = Result<T, ReconcilerError>;

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    /// Nodes created
    pub created: usize,
    /// Nodes removed
    pub removed: usize,
    /// Engine-level disposals performed
    pub disposed: usize,
    /// Rebuilds (argument changes)
    pub rebuilt: usize,
}

/// Scene graph reconciler of one root
pub struct Reconciler {
    graph: SceneGraph,
    catalogue: Catalogue,
    store: Store,
    root: RootId,
    stats: ReconcilerStats,
}

impl Reconciler {
    /// Create a reconciler over an existing graph
    pub fn new(graph: SceneGraph, catalogue: Catalogue, store: Store, root: RootId) -> Self {
        Self {
            graph,
            catalogue,
            store,
            root,
            stats: ReconcilerStats::default(),
        }
    }

    /// Scene graph
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Mutable scene graph, for collaborators that manage objects directly
    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Store of the owning root
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Catalogue used to resolve tags
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Owning root
    pub fn root_id(&self) -> RootId {
        self.root
    }

    /// Operation counters
    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Engine object of a node
    pub fn object(&self, node: NodeId) -> Option<&dyn SceneObject> {
        self.graph.object(node)
    }

    /// Mutable engine object of a node
    ///
    /// Direct mutation bypasses invalidation; call `store().invalidate()`
    /// afterwards in `demand` mode.
    pub fn object_mut(&mut self, node: NodeId) -> Option<&mut dyn SceneObject> {
        self.graph.object_mut(node)
    }

    /// Typed handle to a node's engine object
    pub fn downcast<T: SceneObject>(&self, node: NodeId) -> Option<&T> {
        self.graph.downcast(node)
    }

    /// Mutable typed handle to a node's engine object
    pub fn downcast_mut<T: SceneObject>(&mut self, node: NodeId) -> Option<&mut T> {
        self.graph.downcast_mut(node)
    }

    /// Resolve `tag` and construct a detached node
    pub fn create_node(&mut self, tag: &str, args: Vec<PropValue>) -> ReconcilerResult<NodeId> {
        let entry = self.catalogue.resolve(tag)?;
        if let Some(arity) = entry.arity {
            if args.len() > arity {
                log::warn!("'{}' takes at most {} arguments, got {}", tag, arity, args.len());
            }
        }
        let object = (entry.constructor)(&args).map_err(|e| ReconcilerError::Construct {
            tag: tag.to_string(),
            reason: e.reason,
        })?;
        let node = self.graph.insert(NodeBody::Object(object), NodeLocalState::new(tag, args, self.root));
        self.stats.created += 1;
        log::debug!("Created {} {:?}", tag, node);
        Ok(node)
    }

    /// Create a compound node without an engine instance
    pub fn create_wrapper(&mut self, tag: &str) -> NodeId {
        let node = self.graph.insert(NodeBody::Wrapper, NodeLocalState::new(tag, Vec::new(), self.root));
        self.stats.created += 1;
        log::debug!("Created wrapper {} {:?}", tag, node);
        node
    }

    /// Mount an externally owned object; it is never disposed by the reconciler
    pub fn create_primitive(&mut self, object: Rc<RefCell<dyn SceneObject>>) -> NodeId {
        let mut local = NodeLocalState::new("primitive", Vec::new(), self.root);
        local.primitive = true;
        let node = self.graph.insert(NodeBody::Object(Box::new(SharedObject::new(object))), local);
        self.stats.created += 1;
        log::debug!("Created primitive {:?}", node);
        node
    }

    /// Append `child` under `parent`
    pub fn insert_node(
        &mut self,
        parent: NodeId,
        child: NodeId,
        attach: Option<AttachDescriptor>,
    ) -> ReconcilerResult<()> {
        self.insert_before(parent, child, None, attach)
    }

    /// Insert `child` under `parent` before the local child `before`
    ///
    /// A child that already has a parent is moved; it is detached from the
    /// old parent before it is placed into the new one.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
        attach: Option<AttachDescriptor>,
    ) -> ReconcilerResult<()> {
        self.require(parent)?;
        self.require(child)?;
        if self.graph.is_local_ancestor(child, parent) {
            return Err(ReconcilerError::CycleDetected { parent, child });
        }

        self.unplace(child);
        if let Some(old_parent) = self.graph.local(child).and_then(|l| l.parent) {
            if let Some(local) = self.graph.local_mut(old_parent) {
                local.remove_child(child);
            }
        }

        if let Some(local) = self.graph.local_mut(child) {
            local.parent = Some(parent);
            local.attach = attach;
        }
        if let Some(local) = self.graph.local_mut(parent) {
            let index = before
                .and_then(|b| local.children.iter().position(|c| *c == b))
                .unwrap_or(local.children.len());
            local.insert_child_at(index, child);
        }

        self.place(child);
        self.store.invalidate();
        log::debug!("Inserted {:?} under {:?}", child, parent);
        Ok(())
    }

    /// Assign properties; dotted keys walk nested records and node references
    ///
    /// Every key is attempted. The first failure is returned after the rest
    /// were applied. The value a key had before its first update is kept so
    /// [`Reconciler::reset_prop`] can restore it.
    pub fn update_node<I, K>(&mut self, node: NodeId, patch: I) -> ReconcilerResult<()>
    where
        I: IntoIterator<Item = (K, PropValue)>,
        K: Into<String>,
    {
        self.require(node)?;
        if self.graph.is_wrapper(node) {
            log::warn!("Ignoring property update on wrapper {:?}", node);
            return Ok(());
        }

        let mut first_error = None;
        for (key, value) in patch {
            let key = key.into();
            match self.graph.set_path(node, &key, value) {
                Ok(previous) => {
                    if let Some(local) = self.graph.local_mut(node) {
                        local.memoized.entry(key).or_insert(previous);
                    }
                }
                Err(source) => {
                    log::warn!("Property '{}' on {:?} not applied: {}", key, node, source);
                    first_error.get_or_insert(ReconcilerError::Property { node, source });
                }
            }
        }
        self.store.invalidate();
        first_error.map_or(Ok(()), Err)
    }

    /// Assign one property
    pub fn set_prop(&mut self, node: NodeId, key: &str, value: impl Into<PropValue>) -> ReconcilerResult<()> {
        self.update_node(node, [(key, value.into())])
    }

    /// Restore a property to its value before the first update
    pub fn reset_prop(&mut self, node: NodeId, key: &str) -> ReconcilerResult<()> {
        self.require(node)?;
        let Some(value) = self.graph.local_mut(node).and_then(|l| l.memoized.remove(key)) else {
            return Ok(());
        };
        self.graph
            .set_path(node, key, value)
            .map_err(|source| ReconcilerError::Property { node, source })?;
        self.store.invalidate();
        Ok(())
    }

    /// Change a node's attach descriptor and re-place it
    pub fn set_attach(&mut self, node: NodeId, attach: Option<AttachDescriptor>) -> ReconcilerResult<()> {
        self.require(node)?;
        if self.graph.local(node).is_some_and(|l| l.attach == attach) {
            return Ok(());
        }
        self.unplace(node);
        if let Some(local) = self.graph.local_mut(node) {
            local.attach = attach;
        }
        self.place(node);
        self.store.invalidate();
        Ok(())
    }

    /// Replace the node's handler set
    pub fn set_handlers(&mut self, node: NodeId, handlers: HashMap<EventKind, EventHandler>) -> ReconcilerResult<()> {
        self.require(node)?;
        if !handlers.is_empty() && self.graph.is_wrapper(node) {
            log::warn!("Handlers on wrapper {:?} never receive events", node);
        }
        let interactive = !handlers.is_empty();
        if let Some(local) = self.graph.local_mut(node) {
            local.handlers = handlers;
        }
        self.store.set_interactive(node, interactive);
        Ok(())
    }

    /// Register a cleanup closure run once when the node is removed
    pub fn add_disposer(&mut self, node: NodeId, disposer: Disposer) -> ReconcilerResult<()> {
        self.graph
            .local_mut(node)
            .ok_or(ReconcilerError::MissingNode(node))?
            .add_disposer(disposer);
        Ok(())
    }

    /// Whether removal calls the engine-level dispose
    pub fn set_dispose(&mut self, node: NodeId, dispose: bool) -> ReconcilerResult<()> {
        self.graph.local_mut(node).ok_or(ReconcilerError::MissingNode(node))?.dispose = dispose;
        Ok(())
    }

    /// Remove `child` and its subtree
    pub fn remove_node(&mut self, parent: Option<NodeId>, child: NodeId) -> ReconcilerResult<()> {
        self.require(child)?;
        let actual = self.graph.local(child).and_then(|l| l.parent);
        if parent.is_some() && parent != actual {
            log::warn!("remove_node: {:?} is not a child of {:?}; removing from {:?}", child, parent, actual);
        }
        self.teardown(child, true);
        self.store.invalidate();
        Ok(())
    }

    /// Replace a node with a fresh instance built from new constructor arguments
    ///
    /// Children, handlers, placement and the current value of every property
    /// assigned through [`Reconciler::update_node`] move to the new instance;
    /// the old one is removed with full teardown. Resetting a carried
    /// property restores the new instance's own default. If construction
    /// fails nothing changes. Returns the new node.
    pub fn rebuild(&mut self, node: NodeId, args: Vec<PropValue>) -> ReconcilerResult<NodeId> {
        self.require(node)?;
        let (tag, primitive, wrapper) = {
            let local = self.graph.local(node).ok_or(ReconcilerError::MissingNode(node))?;
            (local.tag.clone(), local.primitive, self.graph.is_wrapper(node))
        };
        if wrapper {
            if let Some(local) = self.graph.local_mut(node) {
                local.args = args;
            }
            return Ok(node);
        }
        if primitive {
            return Err(ReconcilerError::Construct {
                tag,
                reason: "primitives are owned elsewhere and cannot be rebuilt".to_string(),
            });
        }

        let replacement = self.create_node(&tag, args)?;
        let applied: Vec<(String, PropValue)> = self
            .graph
            .local(node)
            .map(|l| l.memoized.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|key| self.graph.get_path(node, &key).map(|value| (key, value)))
            .collect();
        if let Err(e) = self.update_node(replacement, applied) {
            log::warn!("Rebuilt {} {:?} lost a property: {}", tag, node, e);
        }

        // Move children over while both instances exist
        let children = self
            .graph
            .local_mut(node)
            .map(|l| mem::take(&mut l.children))
            .unwrap_or_default();
        for child in &children {
            self.unplace(*child);
            if let Some(local) = self.graph.local_mut(*child) {
                local.parent = Some(replacement);
            }
        }
        let (parent, before, attach, handlers, dispose) = {
            let local = self.graph.local_mut(node).ok_or(ReconcilerError::MissingNode(node))?;
            let handlers = mem::take(&mut local.handlers);
            let parent = local.parent;
            let attach = local.attach.clone();
            let dispose = local.dispose;
            let before = parent.and_then(|p| {
                let siblings = &self.graph.local(p)?.children;
                let index = siblings.iter().position(|c| *c == node)?;
                siblings.get(index + 1).copied()
            });
            (parent, before, attach, handlers, dispose)
        };
        if let Some(local) = self.graph.local_mut(replacement) {
            local.children = children.clone();
            local.dispose = dispose;
        }

        self.teardown(node, true);
        if let Some(parent) = parent {
            self.insert_before(parent, replacement, before, attach)?;
        }
        for child in children {
            self.place(child);
        }
        self.set_handlers(replacement, handlers)?;

        self.stats.rebuilt += 1;
        self.store.invalidate();
        log::debug!("Rebuilt {} {:?} -> {:?}", tag, node, replacement);
        Ok(replacement)
    }

    fn require(&self, node: NodeId) -> ReconcilerResult<()> {
        if self.graph.contains(node) {
            Ok(())
        } else {
            Err(ReconcilerError::MissingNode(node))
        }
    }

    /// Nearest engine-instantiated local ancestor
    fn container_of(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.graph.local(node)?.parent;
        while let Some(id) = current {
            if !self.graph.is_wrapper(id) {
                return Some(id);
            }
            current = self.graph.local(id)?.parent;
        }
        None
    }

    /// Put a node (or, for wrappers, its children) into its container
    fn place(&mut self, node: NodeId) {
        if self.graph.is_wrapper(node) {
            let children = self.graph.local(node).map(|l| l.children.clone()).unwrap_or_default();
            for child in children {
                self.place(child);
            }
            return;
        }
        let Some(container) = self.container_of(node) else {
            log::trace!("{:?} has no instantiated ancestor yet; placement deferred", node);
            return;
        };

        let descriptor = self.graph.local(node).and_then(|l| l.attach.clone()).or_else(|| {
            self.graph
                .object(node)
                .and_then(SceneObject::default_attach)
                .map(AttachDescriptor::path)
        });
        if let Some(descriptor) = descriptor {
            match attach::attach(&mut self.graph, container, node, &descriptor) {
                Ok(record) => {
                    if let Some(local) = self.graph.local_mut(node) {
                        local.attached = Some(record);
                    }
                    return;
                }
                Err(e) => {
                    log::warn!(
                        "AttachResolutionWarning: {:?} on {:?} ({}); using default placement",
                        descriptor,
                        container,
                        e
                    );
                }
            }
        }

        let placeable = self.graph.capabilities(container).contains(Capabilities::OBJECT_3D)
            && self.graph.capabilities(node).contains(Capabilities::OBJECT_3D);
        if !placeable {
            log::warn!("{:?} cannot be added as a child of {:?}; left unplaced", node, container);
            return;
        }
        let before = self.next_engine_sibling(node, container);
        self.graph.insert_child_before(container, node, before);
    }

    /// Following local sibling already placed in `container`
    fn next_engine_sibling(&self, node: NodeId, container: NodeId) -> Option<NodeId> {
        let parent = self.graph.local(node)?.parent?;
        let siblings = &self.graph.local(parent)?.children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings[index + 1..]
            .iter()
            .copied()
            .find(|s| self.graph.get(*s).and_then(|n| n.engine_parent()) == Some(container))
    }

    /// Take a node (or, for wrappers, its children) out of its container
    fn unplace(&mut self, node: NodeId) {
        if self.graph.is_wrapper(node) {
            let children = self.graph.local(node).map(|l| l.children.clone()).unwrap_or_default();
            for child in children {
                self.unplace(child);
            }
            return;
        }
        if let Some(record) = self.graph.local_mut(node).and_then(|l| l.attached.take()) {
            log::trace!("Detaching {:?} from {:?}", node, record.target());
            attach::detach(&mut self.graph, node, record);
        } else if let Some(parent) = self.graph.get(node).and_then(|n| n.engine_parent()) {
            self.graph.remove_child(parent, node);
        }
    }

    /// Remove a subtree, children first
    fn teardown(&mut self, node: NodeId, dispose_allowed: bool) {
        let Some(local) = self.graph.local(node) else { return };
        let children = local.children.clone();
        let dispose = dispose_allowed && local.dispose && !local.primitive;

        for child in children {
            self.teardown(child, dispose);
        }

        self.store.set_interactive(node, false);
        if let Some(local) = self.graph.local_mut(node) {
            local.handlers.clear();
            local.run_disposers(node);
        }
        self.unplace(node);
        if let Some(parent) = self.graph.local(node).and_then(|l| l.parent) {
            if let Some(local) = self.graph.local_mut(parent) {
                local.remove_child(node);
            }
        }

        if let Some(mut removed) = self.graph.remove(node) {
            if dispose {
                if let Some(object) = removed.object_mut() {
                    object.dispose();
                    self.stats.disposed += 1;
                }
            }
            self.stats.removed += 1;
            log::debug!("Removed {} {:?}", removed.local.tag, node);
        }
    }
}
