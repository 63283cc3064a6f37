//! Arena-backed scene graph
//!
//! Holds the engine objects of one root and their engine-level tree (the
//! default child collection). Local (declared) parent/child links live in
//! each node's [`NodeLocalState`] and may differ from the engine tree:
//! attached nodes and wrapper nodes have a local parent but no engine one.

use std::cmp::Ordering;

use crate::engine::{split_path, Capabilities, PropValue, PropertyError, SceneObject};
use crate::foundation::collections::{NodeId, SlotMap};
use crate::foundation::math::{Mat4, Point3, Ray, Vec3};

use super::NodeLocalState;

/// What a node holds
pub enum NodeBody {
    /// An engine object instance
    Object(Box<dyn SceneObject>),
    /// A compound node without an engine instance; its children are placed
    /// into the nearest engine-instantiated ancestor
    Wrapper,
}

/// One arena slot
pub struct GraphNode {
    body: NodeBody,
    /// Reconciler bookkeeping
    pub local: NodeLocalState,
    engine_parent: Option<NodeId>,
    engine_children: Vec<NodeId>,
}

impl GraphNode {
    /// Engine object, unless this is a wrapper
    pub fn object(&self) -> Option<&dyn SceneObject> {
        match &self.body {
            NodeBody::Object(object) => Some(object.as_ref()),
            NodeBody::Wrapper => None,
        }
    }

    /// Mutable engine object, unless this is a wrapper
    pub fn object_mut(&mut self) -> Option<&mut dyn SceneObject> {
        match &mut self.body {
            NodeBody::Object(object) => Some(object.as_mut()),
            NodeBody::Wrapper => None,
        }
    }

    /// Capability flags (empty for wrappers)
    pub fn capabilities(&self) -> Capabilities {
        self.object().map_or(Capabilities::empty(), SceneObject::capabilities)
    }

    /// Parent in the engine's default child collection
    pub fn engine_parent(&self) -> Option<NodeId> {
        self.engine_parent
    }

    /// Children in the engine's default child collection
    pub fn engine_children(&self) -> &[NodeId] {
        &self.engine_children
    }
}

/// One raycast hit in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Node that was hit
    pub object: NodeId,
    /// Distance from the ray origin
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
    /// World-space normal of the face that was hit
    pub face_normal: Vec3,
}

/// Node arena for one root
#[derive(Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, GraphNode>,
}

impl SceneGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without placing it anywhere
    pub fn insert(&mut self, body: NodeBody, local: NodeLocalState) -> NodeId {
        self.nodes.insert(GraphNode {
            body,
            local,
            engine_parent: None,
            engine_children: Vec::new(),
        })
    }

    /// Remove a node from the arena, detaching it from its engine parent
    ///
    /// Engine children are orphaned, not removed. Callers tear down local
    /// state before calling this.
    pub fn remove(&mut self, id: NodeId) -> Option<GraphNode> {
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.engine_parent) {
            self.remove_child(parent, id);
        }
        let node = self.nodes.remove(id)?;
        for child in &node.engine_children {
            if let Some(child) = self.nodes.get_mut(*child) {
                child.engine_parent = None;
            }
        }
        Some(node)
    }

    /// Whether the id refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Mutable node by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id)
    }

    /// Engine object by id
    pub fn object(&self, id: NodeId) -> Option<&dyn SceneObject> {
        self.nodes.get(id)?.object()
    }

    /// Mutable engine object by id
    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut dyn SceneObject> {
        self.nodes.get_mut(id)?.object_mut()
    }

    /// Downcast a node's engine object
    pub fn downcast<T: SceneObject>(&self, id: NodeId) -> Option<&T> {
        self.object(id)?.as_any().downcast_ref::<T>()
    }

    /// Mutably downcast a node's engine object
    pub fn downcast_mut<T: SceneObject>(&mut self, id: NodeId) -> Option<&mut T> {
        self.object_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Local state by id
    pub fn local(&self, id: NodeId) -> Option<&NodeLocalState> {
        self.nodes.get(id).map(|n| &n.local)
    }

    /// Mutable local state by id
    pub fn local_mut(&mut self, id: NodeId) -> Option<&mut NodeLocalState> {
        self.nodes.get_mut(id).map(|n| &mut n.local)
    }

    /// Whether the node is a wrapper without an engine instance
    pub fn is_wrapper(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| matches!(n.body, NodeBody::Wrapper))
    }

    /// Capability flags of a node (empty for wrappers and stale ids)
    pub fn capabilities(&self, id: NodeId) -> Capabilities {
        self.nodes.get(id).map_or(Capabilities::empty(), GraphNode::capabilities)
    }

    /// Add `child` to `parent`'s default child collection
    ///
    /// A node has at most one engine parent: it is removed from the
    /// previous one first.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        self.insert_child_before(parent, child, None)
    }

    /// Add `child` to `parent`'s default child collection before `before`
    /// (appends when `before` is not a child of `parent`)
    pub fn insert_child_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if let Some(old) = self.nodes[child].engine_parent {
            self.remove_child(old, child);
        }
        let siblings = &mut self.nodes[parent].engine_children;
        let index = before
            .and_then(|b| siblings.iter().position(|c| *c == b))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child].engine_parent = Some(parent);
        true
    }

    /// Remove `child` from `parent`'s default child collection
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let before = parent_node.engine_children.len();
        parent_node.engine_children.retain(|c| *c != child);
        let removed = parent_node.engine_children.len() != before;
        if removed {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.engine_parent = None;
            }
        }
        removed
    }

    /// Whether `ancestor` is `node` or one of its local ancestors
    pub fn is_local_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.local(id).and_then(|l| l.parent);
        }
        false
    }

    /// Local-to-world matrix, composed along engine parents
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::identity();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id) else { break };
            if let Some(object) = node.object() {
                matrix = object.local_transform().to_matrix() * matrix;
            }
            current = node.engine_parent;
        }
        matrix
    }

    /// World-space position of a node
    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).transform_point(&Point3::origin()).coords
    }

    /// Depth-first pre-order walk of the engine tree below `root` (inclusive)
    pub fn traverse(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            order.push(id);
            stack.extend(node.engine_children.iter().rev().copied());
        }
        order
    }

    /// Read a dotted property path, following node references
    pub fn get_path(&self, id: NodeId, path: &str) -> Option<PropValue> {
        let segments = split_path(path);
        let (head, rest) = segments.split_first()?;
        let mut value = self.object(id)?.property(head)?;
        let mut rest = rest;
        while let Some((segment, tail)) = rest.split_first() {
            value = match value {
                PropValue::Node(next) => self.object(next)?.property(segment)?,
                other => other.field(segment)?,
            };
            rest = tail;
        }
        Some(value)
    }

    /// Assign a dotted property path, following node references
    ///
    /// Returns the value previously stored at the leaf.
    pub fn set_path(&mut self, id: NodeId, path: &str, value: PropValue) -> Result<PropValue, PropertyError> {
        let segments = split_path(path);
        let invalid = || PropertyError::InvalidPath { path: path.to_string() };
        if segments.is_empty() {
            return Err(invalid());
        }

        let mut owner = id;
        let mut index = 0;
        // Hop across node references until the remainder lives in one object
        while index + 1 < segments.len() {
            let current = self.object(owner).ok_or_else(invalid)?;
            match current.property(segments[index]) {
                Some(PropValue::Node(next)) => {
                    owner = next;
                    index += 1;
                }
                Some(_) => break,
                None => return Err(invalid()),
            }
        }

        let key = segments[index];
        let rest = &segments[index + 1..];
        let object = self.object_mut(owner).ok_or_else(invalid)?;
        if rest.is_empty() {
            let previous = object.property(key).unwrap_or_default();
            object.set_property(key, value)?;
            return Ok(previous);
        }
        let mut container = object.property(key).ok_or_else(invalid)?;
        let previous = container.set_path(rest, value)?;
        object.set_property(key, container)?;
        Ok(previous)
    }

    /// Intersect a world-space ray with every raycastable node below `root`
    ///
    /// Hits are sorted nearest first; ties keep traversal order. Nodes
    /// without the raycast capability are skipped silently.
    pub fn raycast(&self, root: NodeId, ray: &Ray) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        for id in self.traverse(root) {
            let Some(object) = self.object(id) else { continue };
            if !object.capabilities().contains(Capabilities::RAYCAST) {
                continue;
            }
            let world = self.world_matrix(id);
            let Some(inverse) = world.try_inverse() else {
                log::trace!("Skipping {:?}: singular world matrix", id);
                continue;
            };
            let geometry_bounds = object
                .property("geometry")
                .and_then(|g| g.as_node())
                .and_then(|g| self.object(g))
                .and_then(SceneObject::bounds);
            let local_ray = ray.transformed(&inverse);
            let Some(hit) = object.raycast(&local_ray, geometry_bounds) else { continue };

            let point = world.transform_point(&Point3::from(local_ray.at(hit.t))).coords;
            let normal = inverse.transpose().transform_vector(&hit.face_normal);
            let face_normal = if normal.norm_squared() > 0.0 { normal.normalize() } else { normal };
            hits.push(RaycastHit {
                object: id,
                distance: (point - ray.origin).norm(),
                point,
                face_normal,
            });
        }
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineObject;
    use crate::foundation::collections::RootId;
    use approx::assert_relative_eq;

    fn add(graph: &mut SceneGraph, object: EngineObject) -> NodeId {
        graph.insert(
            NodeBody::Object(Box::new(object)),
            NodeLocalState::new("test", Vec::new(), RootId(0)),
        )
    }

    fn cube_at(graph: &mut SceneGraph, z: f32) -> NodeId {
        let geometry = add(graph, EngineObject::box_geometry(1.0, 1.0, 1.0));
        add(
            graph,
            EngineObject::mesh()
                .with_prop("position", Vec3::new(0.0, 0.0, z))
                .with_prop("geometry", geometry),
        )
    }

    #[test]
    fn test_reparent_removes_from_old_parent() {
        let mut graph = SceneGraph::new();
        let a = add(&mut graph, EngineObject::group());
        let b = add(&mut graph, EngineObject::group());
        let child = add(&mut graph, EngineObject::group());
        graph.add_child(a, child);
        graph.add_child(b, child);
        assert!(graph.get(a).unwrap().engine_children().is_empty());
        assert_eq!(graph.get(b).unwrap().engine_children(), &[child]);
        assert_eq!(graph.get(child).unwrap().engine_parent(), Some(b));
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let mut graph = SceneGraph::new();
        let parent = add(&mut graph, EngineObject::group().with_prop("position", Vec3::new(1.0, 0.0, 0.0)));
        let child = add(&mut graph, EngineObject::group().with_prop("position", Vec3::new(0.0, 2.0, 0.0)));
        graph.add_child(parent, child);
        assert_relative_eq!(graph.world_position(child), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_set_path_crosses_node_references() {
        let mut graph = SceneGraph::new();
        let material = add(&mut graph, EngineObject::material("M"));
        let mesh = add(&mut graph, EngineObject::mesh().with_prop("material", material));
        let previous = graph
            .set_path(mesh, "material.color.r", PropValue::Float(0.25))
            .unwrap();
        assert_eq!(previous, PropValue::Float(1.0));
        assert_eq!(graph.get_path(mesh, "material.color.r"), Some(PropValue::Float(0.25)));
    }

    #[test]
    fn test_set_path_nested_record() {
        let mut graph = SceneGraph::new();
        let light = add(&mut graph, EngineObject::light("PointLight"));
        graph.set_path(light, "shadow.mapSize.x", PropValue::Float(2048.0)).unwrap();
        assert_eq!(graph.get_path(light, "shadow.mapSize.x"), Some(PropValue::Float(2048.0)));
        assert!(graph.set_path(light, "nothing.here", PropValue::Null).is_err());
    }

    #[test]
    fn test_raycast_sorts_by_distance() {
        let mut graph = SceneGraph::new();
        let scene = add(&mut graph, EngineObject::scene());
        let far = cube_at(&mut graph, -10.0);
        let near = cube_at(&mut graph, 0.0);
        graph.add_child(scene, far);
        graph.add_child(scene, near);

        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hits = graph.raycast(scene, &ray);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].object, near);
        assert_relative_eq!(hits[0].distance, 4.5, epsilon = 1e-4);
        assert_relative_eq!(hits[0].face_normal, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-4);
        assert_eq!(hits[1].object, far);
    }

    #[test]
    fn test_raycast_respects_scale() {
        let mut graph = SceneGraph::new();
        let scene = add(&mut graph, EngineObject::scene());
        let mesh = cube_at(&mut graph, 0.0);
        graph.object_mut(mesh).unwrap().set_property("scale", PropValue::Float(4.0)).unwrap();
        graph.add_child(scene, mesh);

        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hits = graph.raycast(scene, &ray);
        assert_relative_eq!(hits[0].distance, 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_remove_detaches_from_parent() {
        let mut graph = SceneGraph::new();
        let parent = add(&mut graph, EngineObject::group());
        let child = add(&mut graph, EngineObject::group());
        graph.add_child(parent, child);
        graph.remove(child);
        assert!(graph.get(parent).unwrap().engine_children().is_empty());
        assert!(!graph.contains(child));
    }
}
