//! Declarative trees reconciled into a mounted root

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{cube, harness, RecordingTarget};
use crate::core::{Frameloop, RootConfig};
use crate::engine::{EngineObject, PropValue, SceneObject};
use crate::events::{EventKind, NativeEventKind, NativePointerEvent};
use crate::reconciler::{Element, NodeRef, ReconcilerError};
use crate::scene::{AttachDescriptor, SceneGraph};
use crate::RootError;

fn demand() -> RootConfig {
    RootConfig::default().with_frameloop(Frameloop::Demand)
}

#[test]
fn test_attach_path_round_trips_through_mount() {
    let mut h = harness(demand());
    let light = NodeRef::new();
    h.root.render(vec![Element::new("pointLight").node_ref(&light)]).unwrap();
    let node = light.get().unwrap();
    let before = h.root.reconciler().graph().get_path(node, "shadow.camera");

    let shadow_camera = NodeRef::new();
    h.root
        .render(vec![Element::new("pointLight").node_ref(&light).child(
            Element::new("orthographicCamera")
                .attach_path("shadow.camera")
                .node_ref(&shadow_camera),
        )])
        .unwrap();
    assert_eq!(light.get(), Some(node));
    assert_eq!(
        h.root.reconciler().graph().get_path(node, "shadow.camera"),
        shadow_camera.get().map(PropValue::Node)
    );

    h.root.render(vec![Element::new("pointLight").node_ref(&light)]).unwrap();
    assert_eq!(h.root.reconciler().graph().get_path(node, "shadow.camera"), before);
    assert_eq!(shadow_camera.get(), None);
}

#[test]
fn test_attach_change_moves_node_between_slot_and_children() {
    let mut h = harness(demand());
    let light = NodeRef::new();
    let camera = NodeRef::new();
    let shadow_camera = |attach: bool| {
        let element = Element::new("orthographicCamera").node_ref(&camera);
        if attach {
            element.attach_path("shadow.camera")
        } else {
            element
        }
    };

    h.root
        .render(vec![Element::new("pointLight").node_ref(&light).child(shadow_camera(true))])
        .unwrap();
    let (node, child) = (light.get().unwrap(), camera.get().unwrap());
    assert_eq!(h.root.reconciler().graph().get_path(node, "shadow.camera"), Some(PropValue::Node(child)));
    assert!(h.root.reconciler().graph().get(node).unwrap().engine_children().is_empty());

    // Same element without the attach: the slot is restored, the camera becomes a child
    h.root
        .render(vec![Element::new("pointLight").node_ref(&light).child(shadow_camera(false))])
        .unwrap();
    assert_eq!(camera.get(), Some(child));
    let graph = h.root.reconciler().graph();
    assert_eq!(graph.get_path(node, "shadow.camera"), Some(PropValue::Null));
    assert_eq!(graph.get(node).unwrap().engine_children(), &[child]);

    // Direct reattach through the reconciler
    h.root
        .reconciler_mut()
        .set_attach(child, Some(AttachDescriptor::path("shadow.camera")))
        .unwrap();
    let graph = h.root.reconciler().graph();
    assert_eq!(graph.get_path(node, "shadow.camera"), Some(PropValue::Node(child)));
    assert!(graph.get(node).unwrap().engine_children().is_empty());
    assert_eq!(graph.get(child).unwrap().engine_parent(), None);

    h.root.reconciler_mut().set_attach(child, None).unwrap();
    assert_eq!(h.root.reconciler().graph().get_path(node, "shadow.camera"), Some(PropValue::Null));
    assert_eq!(h.root.reconciler().graph().get(child).unwrap().engine_parent(), Some(node));
}

#[test]
fn test_resolver_attach_runs_its_detach() {
    let mut h = harness(demand());
    let detached = Rc::new(Cell::new(false));
    let flag = detached.clone();
    // Hides the container while the child is mounted
    let resolver = AttachDescriptor::resolver(move |graph, parent, _child| {
        graph.set_path(parent, "visible", PropValue::Bool(false)).ok();
        let flag = flag.clone();
        Box::new(move |graph: &mut SceneGraph| {
            graph.set_path(parent, "visible", PropValue::Bool(true)).ok();
            flag.set(true);
        })
    });

    let outer = NodeRef::new();
    h.root
        .render(vec![Element::new("group").node_ref(&outer).child(Element::new("group").attach(resolver))])
        .unwrap();
    let node = outer.get().unwrap();
    let graph = h.root.reconciler().graph();
    assert!(graph.get(node).unwrap().engine_children().is_empty());
    assert_eq!(graph.get_path(node, "visible"), Some(PropValue::Bool(false)));

    h.root.render(vec![Element::new("group").node_ref(&outer)]).unwrap();
    assert!(detached.get());
    assert_eq!(h.root.reconciler().graph().get_path(node, "visible"), Some(PropValue::Bool(true)));
}

#[test]
fn test_args_change_rebuilds_in_one_transaction() {
    let mut h = harness(demand());
    let mesh = NodeRef::new();
    let geometry = NodeRef::new();
    let tree = |size: f32| {
        vec![Element::new("mesh")
            .node_ref(&mesh)
            .child(Element::new("countedBox").args(vec![PropValue::Float(size)]).node_ref(&geometry))
            .child(Element::new("meshBasicMaterial"))]
    };
    h.root.render(tree(1.0)).unwrap();
    h.pump(0.0);
    let old = geometry.get().unwrap();
    let created = h.constructed.get();
    let removed = h.root.reconciler().stats().removed;
    let nodes = h.root.reconciler().graph().len();

    h.root.render(tree(3.0)).unwrap();
    let new = geometry.get().unwrap();
    assert_ne!(old, new);
    assert_eq!(h.constructed.get(), created + 1);
    assert_eq!(h.root.reconciler().stats().removed, removed + 1);
    assert_eq!(h.root.reconciler().graph().len(), nodes);
    assert!(!h.root.reconciler().graph().contains(old));
    assert_eq!(
        h.root.reconciler().graph().get_path(mesh.get().unwrap(), "geometry"),
        Some(PropValue::Node(new))
    );

    // One render covers the whole swap
    assert_eq!(h.host.pending_count(), 1);
    assert_eq!(h.pump(16.0), 1);
    assert_eq!(h.frames(), 2);
}

#[test]
fn test_teardown_unregisters_handlers_and_runs_disposer_once() {
    let mut h = harness(demand());
    let calls = Rc::new(Cell::new(0));
    let disposals = Rc::new(Cell::new(0));
    let mesh = NodeRef::new();
    let (a, b) = (calls.clone(), calls.clone());
    h.root
        .render(vec![cube(0.0)
            .node_ref(&mesh)
            .on(EventKind::PointerDown, move |_, _| a.set(a.get() + 1))
            .on(EventKind::PointerMove, move |_, _| b.set(b.get() + 1))])
        .unwrap();
    let counter = disposals.clone();
    h.root
        .reconciler_mut()
        .add_disposer(
            mesh.get().unwrap(),
            Box::new(move || {
                counter.set(counter.get() + 1);
                Ok(())
            }),
        )
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();

    let down = NativePointerEvent::new(NativeEventKind::PointerDown, 400.0, 300.0);
    h.root.handle_native_event(&down).unwrap();
    assert_eq!(calls.get(), 1);

    h.root.render(Vec::new()).unwrap();
    assert_eq!(disposals.get(), 1);
    assert!(h.root.store().interaction().is_empty());

    h.root.handle_native_event(&down).unwrap();
    let moved = NativePointerEvent::new(NativeEventKind::PointerMove, 400.0, 300.0);
    h.root.handle_native_event(&moved).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(disposals.get(), 1);
}

#[test]
fn test_unknown_tag_fails_render_without_mounting() {
    let mut h = harness(demand());
    let nodes = h.root.reconciler().graph().len();
    let err = h
        .root
        .render(vec![cube(0.0), Element::new("group").child(Element::new("hologram"))])
        .unwrap_err();
    assert!(matches!(
        err,
        RootError::Reconciler(ReconcilerError::UnknownTag(ref e)) if e.tag == "hologram"
    ));
    assert_eq!(h.root.reconciler().graph().len(), nodes);
}

#[test]
fn test_constructor_failure_keeps_earlier_siblings() {
    let mut h = harness(demand());
    h.root.render(vec![Element::new("group").key("a")]).unwrap();
    let err = h
        .root
        .render(vec![
            Element::new("group").key("a"),
            Element::new("boxGeometry").key("b").args(vec![PropValue::Str("wide".into())]),
        ])
        .unwrap_err();
    assert!(matches!(err, RootError::Reconciler(ReconcilerError::Construct { .. })));
    let scene = h.root.scene();
    assert_eq!(h.root.reconciler().graph().local(scene).unwrap().children.len(), 1);
}

#[test]
fn test_wrapper_children_mount_into_scene() {
    let mut h = harness(demand());
    h.root
        .render(vec![Element::wrapper("Rig").children([cube(0.0), cube(1.0)])])
        .unwrap();
    let scene = h.root.scene();
    let graph = h.root.reconciler().graph();
    assert_eq!(graph.get(scene).unwrap().engine_children().len(), 2);
    assert_eq!(graph.local(scene).unwrap().children.len(), 1);
}

#[test]
fn test_primitive_survives_unmount() {
    let mut h = harness(demand());
    let shared = Rc::new(RefCell::new(EngineObject::mesh()));
    let object: Rc<RefCell<dyn SceneObject>> = shared.clone();
    h.root
        .render(vec![Element::primitive(object).prop("position.x", 2.0f32)])
        .unwrap();
    let x = shared.borrow().property("position").and_then(|p| p.as_vec3()).map(|v| v.x);
    assert_eq!(x, Some(2.0));

    h.root.unmount();
    assert!(!shared.borrow().is_disposed());
    assert_eq!(shared.borrow().property("visible"), Some(PropValue::Bool(true)));
}

#[test]
fn test_dispose_false_subtree_is_not_disposed() {
    let mut h = harness(demand());
    let mesh = NodeRef::new();
    h.root
        .render(vec![cube(0.0).node_ref(&mesh).dispose(false)])
        .unwrap();
    let disposed_before = h.root.reconciler().stats().disposed;
    h.root.render(Vec::new()).unwrap();
    let stats = h.root.reconciler().stats();
    assert_eq!(stats.disposed, disposed_before);
    assert_eq!(mesh.get(), None);
}

#[test]
fn test_removed_prop_restores_default() {
    let mut h = harness(demand());
    let mesh = NodeRef::new();
    h.root
        .render(vec![cube(0.0).node_ref(&mesh).prop("visible", false)])
        .unwrap();
    let node = mesh.get().unwrap();
    assert_eq!(h.root.reconciler().graph().get_path(node, "visible"), Some(PropValue::Bool(false)));
    h.pump(0.0);
    // Only the scene itself
    assert_eq!(h.renderer.borrow().draw_list().len(), 1);

    h.root.render(vec![cube(0.0).node_ref(&mesh)]).unwrap();
    assert_eq!(h.root.reconciler().graph().get_path(node, "visible"), Some(PropValue::Bool(true)));
    h.pump(16.0);
    assert_eq!(h.renderer.borrow().draw_list().len(), 2);
}
