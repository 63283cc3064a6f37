//! Declarative tree layer
//!
//! An [`Element`] tree describes what should be mounted. [`TreeMount`]
//! keeps the previously mounted tree and turns the difference into
//! reconciler operations:
//!
//! - children are matched by `key` when present, otherwise by position and
//!   element kind
//! - a kind change removes the old node and creates a new one
//! - an argument change rebuilds the node in place
//! - changed props are assigned, removed props are reset
//! - handler sets are replaced wholesale
//!
//! A render is one synchronous pass followed by a single invalidation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::engine::{PropValue, SceneObject};
use crate::events::{EventHandler, EventKind, PointerEvent};
use crate::foundation::collections::NodeId;
use crate::scene::AttachDescriptor;

use super::{Reconciler, ReconcilerError, ReconcilerResult};

/// What an element instantiates
#[derive(Clone)]
pub enum ElementKind {
    /// Catalogue tag
    Tag(String),
    /// Externally owned object
    Primitive(Rc<RefCell<dyn SceneObject>>),
    /// Compound node without an engine instance
    Wrapper(String),
}

impl ElementKind {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Tag(a), Self::Tag(b)) | (Self::Wrapper(a), Self::Wrapper(b)) => a == b,
            (Self::Primitive(a), Self::Primitive(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "<{}>", tag),
            Self::Primitive(object) => write!(f, "<primitive {}>", object.borrow().kind()),
            Self::Wrapper(name) => write!(f, "<{} wrapper>", name),
        }
    }
}

/// Live handle to the node an element is mounted as
///
/// Empty before mount, follows rebuilds, cleared on removal.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<Cell<Option<NodeId>>>);

impl NodeRef {
    /// Create an empty ref
    pub fn new() -> Self {
        Self::default()
    }

    /// Current node, if mounted
    pub fn get(&self) -> Option<NodeId> {
        self.0.get()
    }

    fn set(&self, node: Option<NodeId>) {
        self.0.set(node);
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.get()).finish()
    }
}

/// Declarative description of one node and its subtree
#[derive(Clone)]
pub struct Element {
    kind: ElementKind,
    key: Option<String>,
    args: Vec<PropValue>,
    props: Vec<(String, PropValue)>,
    attach: Option<AttachDescriptor>,
    handlers: HashMap<EventKind, EventHandler>,
    node_ref: Option<NodeRef>,
    dispose: bool,
    children: Vec<Element>,
}

impl Element {
    fn with_kind(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            args: Vec::new(),
            props: Vec::new(),
            attach: None,
            handlers: HashMap::new(),
            node_ref: None,
            dispose: true,
            children: Vec::new(),
        }
    }

    /// Element for a catalogue tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self::with_kind(ElementKind::Tag(tag.into()))
    }

    /// Element mounting an externally owned object
    pub fn primitive(object: Rc<RefCell<dyn SceneObject>>) -> Self {
        Self::with_kind(ElementKind::Primitive(object))
    }

    /// Compound element without an engine instance
    pub fn wrapper(name: impl Into<String>) -> Self {
        Self::with_kind(ElementKind::Wrapper(name.into()))
    }

    /// Identity among siblings
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Constructor arguments
    pub fn args(mut self, args: Vec<PropValue>) -> Self {
        self.args = args;
        self
    }

    /// Set a property; dotted keys address nested values
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.props.push((key, value)),
        }
        self
    }

    /// Placement into a parent slot
    pub fn attach(mut self, attach: AttachDescriptor) -> Self {
        self.attach = Some(attach);
        self
    }

    /// Placement into a parent property path
    pub fn attach_path(self, path: impl Into<String>) -> Self {
        self.attach(AttachDescriptor::path(path))
    }

    /// Register an event handler
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: FnMut(&mut PointerEvent, &mut Reconciler) + 'static,
    {
        self.handlers.insert(kind, EventHandler::new(handler));
        self
    }

    /// Register a shared event handler
    pub fn handler(mut self, kind: EventKind, handler: EventHandler) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Receive the mounted node id
    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Whether removal disposes the engine object
    pub fn dispose(mut self, dispose: bool) -> Self {
        self.dispose = dispose;
        self
    }

    /// Append a child
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append children
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    /// What this element instantiates
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("args", &self.args)
            .field("props", &self.props)
            .field("attach", &self.attach)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// An element as it was last mounted
struct MountedElement {
    node: NodeId,
    kind: ElementKind,
    key: Option<String>,
    args: Vec<PropValue>,
    props: Vec<(String, PropValue)>,
    attach: Option<AttachDescriptor>,
    has_handlers: bool,
    node_ref: Option<NodeRef>,
    children: Vec<MountedElement>,
}

impl MountedElement {
    fn clear_refs(&self) {
        if let Some(node_ref) = &self.node_ref {
            node_ref.set(None);
        }
        for child in &self.children {
            child.clear_refs();
        }
    }
}

/// Mounted element tree under one parent node
pub struct TreeMount {
    parent: NodeId,
    mounted: Vec<MountedElement>,
}

impl TreeMount {
    /// Mount point under `parent`
    pub fn new(parent: NodeId) -> Self {
        Self {
            parent,
            mounted: Vec::new(),
        }
    }

    /// Node ids of the mounted top-level elements
    pub fn roots(&self) -> Vec<NodeId> {
        self.mounted.iter().map(|m| m.node).collect()
    }

    /// Diff `elements` against the mounted tree and apply the difference
    ///
    /// Unknown tags are reported before anything is touched. A constructor
    /// failure stops the pass; elements handled so far stay mounted.
    pub fn render(&mut self, reconciler: &mut Reconciler, elements: Vec<Element>) -> ReconcilerResult<()> {
        for element in &elements {
            check_tags(reconciler, element)?;
        }
        let previous = std::mem::take(&mut self.mounted);
        let result = reconcile_children(reconciler, self.parent, previous, elements, &mut self.mounted);
        reconciler.store().invalidate();
        result
    }

    /// Remove every mounted element
    pub fn unmount(&mut self, reconciler: &mut Reconciler) {
        for mounted in std::mem::take(&mut self.mounted) {
            remove_mounted(reconciler, self.parent, mounted);
        }
    }
}

fn check_tags(reconciler: &Reconciler, element: &Element) -> ReconcilerResult<()> {
    if let ElementKind::Tag(tag) = &element.kind {
        reconciler.catalogue().resolve(tag)?;
    }
    for child in &element.children {
        check_tags(reconciler, child)?;
    }
    Ok(())
}

fn find_match(previous: &[Option<MountedElement>], index: usize, element: &Element) -> Option<usize> {
    match &element.key {
        Some(key) => previous
            .iter()
            .position(|p| p.as_ref().is_some_and(|m| m.key.as_ref() == Some(key))),
        None => previous
            .get(index)
            .and_then(Option::as_ref)
            .filter(|m| m.key.is_none() && m.kind.same_as(&element.kind))
            .map(|_| index),
    }
}

fn reconcile_children(
    reconciler: &mut Reconciler,
    parent: NodeId,
    previous: Vec<MountedElement>,
    elements: Vec<Element>,
    out: &mut Vec<MountedElement>,
) -> ReconcilerResult<()> {
    let mut previous: Vec<Option<MountedElement>> = previous.into_iter().map(Some).collect();
    let mut matched = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        let slot = find_match(&previous, index, element);
        matched.push(slot.and_then(|i| previous[i].take()));
    }
    for leftover in previous.into_iter().flatten() {
        remove_mounted(reconciler, parent, leftover);
    }

    let mut result = Ok(());
    for (index, (element, old)) in elements.into_iter().zip(matched).enumerate() {
        if result.is_err() {
            // Keep what was mounted; the failing pass does not tear it down
            out.extend(old);
            continue;
        }
        result = match old {
            Some(mut mounted) if mounted.kind.same_as(&element.kind) => {
                let patched = patch(reconciler, parent, index, &mut mounted, element);
                out.push(mounted);
                patched
            }
            Some(mounted) => {
                remove_mounted(reconciler, parent, mounted);
                mount(reconciler, parent, index, element, out)
            }
            None => mount(reconciler, parent, index, element, out),
        };
    }
    result
}

fn mount(
    reconciler: &mut Reconciler,
    parent: NodeId,
    index: usize,
    element: Element,
    out: &mut Vec<MountedElement>,
) -> ReconcilerResult<()> {
    let node = match &element.kind {
        ElementKind::Tag(tag) => reconciler.create_node(tag, element.args.clone())?,
        ElementKind::Primitive(object) => reconciler.create_primitive(object.clone()),
        ElementKind::Wrapper(name) => reconciler.create_wrapper(name),
    };
    reconciler.set_dispose(node, element.dispose)?;
    let before = child_at(reconciler, parent, index);
    if let Err(e) = reconciler.insert_before(parent, node, before, element.attach.clone()) {
        if let Err(cleanup) = reconciler.remove_node(None, node) {
            log::warn!("Failed to drop unmounted node {:?}: {}", node, cleanup);
        }
        return Err(e);
    }
    if let Some(node_ref) = &element.node_ref {
        node_ref.set(Some(node));
    }

    let slot = out.len();
    out.push(MountedElement {
        node,
        kind: element.kind,
        key: element.key,
        args: element.args,
        props: element.props.clone(),
        attach: element.attach,
        has_handlers: !element.handlers.is_empty(),
        node_ref: element.node_ref,
        children: Vec::new(),
    });

    if !element.props.is_empty() {
        reconciler.update_node(node, element.props)?;
    }
    if !element.handlers.is_empty() {
        reconciler.set_handlers(node, element.handlers)?;
    }
    reconcile_children(reconciler, node, Vec::new(), element.children, &mut out[slot].children)
}

fn patch(
    reconciler: &mut Reconciler,
    parent: NodeId,
    index: usize,
    mounted: &mut MountedElement,
    element: Element,
) -> ReconcilerResult<()> {
    // Order among siblings
    if child_at(reconciler, parent, index) != Some(mounted.node) {
        let before = child_at(reconciler, parent, index);
        reconciler.insert_before(parent, mounted.node, before, mounted.attach.clone())?;
    }

    if element.args != mounted.args {
        mounted.node = reconciler.rebuild(mounted.node, element.args.clone())?;
        mounted.args = element.args;
        if let Some(node_ref) = &mounted.node_ref {
            node_ref.set(Some(mounted.node));
        }
    }

    if element.attach != mounted.attach {
        reconciler.set_attach(mounted.node, element.attach.clone())?;
        mounted.attach = element.attach;
    }

    let changed: Vec<(String, PropValue)> = element
        .props
        .iter()
        .filter(|(key, value)| !mounted.props.iter().any(|(k, v)| k == key && v == value))
        .cloned()
        .collect();
    let removed: Vec<String> = mounted
        .props
        .iter()
        .filter(|(key, _)| !element.props.iter().any(|(k, _)| k == key))
        .map(|(key, _)| key.clone())
        .collect();
    mounted.props = element.props;
    for key in removed {
        reconciler.reset_prop(mounted.node, &key)?;
    }
    if !changed.is_empty() {
        reconciler.update_node(mounted.node, changed)?;
    }

    if mounted.has_handlers || !element.handlers.is_empty() {
        mounted.has_handlers = !element.handlers.is_empty();
        reconciler.set_handlers(mounted.node, element.handlers)?;
    }
    reconciler.set_dispose(mounted.node, element.dispose)?;

    match (&mounted.node_ref, &element.node_ref) {
        (Some(old), Some(new)) if old.ptr_eq(new) => {}
        (old, new) => {
            if let Some(old) = old {
                old.set(None);
            }
            if let Some(new) = new {
                new.set(Some(mounted.node));
            }
            mounted.node_ref = element.node_ref;
        }
    }

    let previous = std::mem::take(&mut mounted.children);
    reconcile_children(reconciler, mounted.node, previous, element.children, &mut mounted.children)
}

fn child_at(reconciler: &Reconciler, parent: NodeId, index: usize) -> Option<NodeId> {
    reconciler
        .graph()
        .local(parent)
        .and_then(|l| l.children.get(index).copied())
}

fn remove_mounted(reconciler: &mut Reconciler, parent: NodeId, mounted: MountedElement) {
    mounted.clear_refs();
    if let Err(e) = reconciler.remove_node(Some(parent), mounted.node) {
        log::warn!("Failed to remove {:?}: {}", mounted.kind, e);
    }
}
