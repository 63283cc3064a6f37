//! Pointer dispatch through a mounted root

use std::cell::Cell;
use std::rc::Rc;

use super::{call_log, cube, harness, CallLog, RecordingTarget};
use crate::core::RootConfig;
use crate::events::{EventKind, Intersection, NativeEventKind, NativePointerEvent};
use crate::foundation::math::Vec2;
use crate::input::Raycaster;
use crate::reconciler::{Element, NodeRef};
use crate::scene::SceneGraph;
use crate::store::StoreState;

const CENTER: (f32, f32) = (400.0, 300.0);

fn at_center(kind: NativeEventKind) -> NativePointerEvent {
    NativePointerEvent::new(kind, CENTER.0, CENTER.1)
}

fn logging_cube(z: f32, name: &'static str, kind: EventKind, log: &CallLog) -> Element {
    let log = log.clone();
    cube(z).key(name).on(kind, move |_, _| log.borrow_mut().push(name.to_string()))
}

#[test]
fn test_stop_propagation_halts_farther_hits_only() {
    let mut h = harness(RootConfig::default());
    let log = call_log();
    let stopper = log.clone();
    h.root
        .render(vec![
            logging_cube(3.5, "near", EventKind::PointerDown, &log),
            cube(2.5).key("middle").on(EventKind::PointerDown, move |event, _| {
                stopper.borrow_mut().push("middle".to_string());
                event.stop_propagation();
            }),
            logging_cube(1.5, "far", EventKind::PointerDown, &log),
        ])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();

    let result = h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(*log.borrow(), vec!["near", "middle"]);
    assert_eq!(result.intersections, 3);
    assert_eq!(result.delivered, 2);
}

#[test]
fn test_intersections_are_nearest_first_with_distances() {
    let mut h = harness(RootConfig::default());
    let distances = Rc::new(std::cell::RefCell::new(Vec::new()));
    let seen = distances.clone();
    h.root
        .render(vec![
            cube(1.5).key("far"),
            cube(3.5).key("near").on(EventKind::PointerDown, move |event, _| {
                seen.borrow_mut().extend(event.intersections.iter().map(|i| i.distance));
            }),
            cube(2.5).key("middle"),
        ])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();

    // Only the handler-bearing mesh becomes an intersection
    let distances = distances.borrow();
    assert_eq!(distances.len(), 1);
    approx::assert_relative_eq!(distances[0], 1.0, epsilon = 1e-4);
}

#[test]
fn test_hits_bubble_to_ancestors_with_handlers() {
    let mut h = harness(RootConfig::default());
    let log = call_log();
    let (group_log, mesh_log) = (log.clone(), log.clone());
    h.root
        .render(vec![Element::new("group")
            .on(EventKind::PointerDown, move |event, _| {
                assert_ne!(event.object, event.event_object);
                group_log.borrow_mut().push("group".to_string());
            })
            .child(cube(0.0).on(EventKind::PointerDown, move |_, _| {
                mesh_log.borrow_mut().push("mesh".to_string());
            }))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(*log.borrow(), vec!["mesh", "group"]);
}

#[test]
fn test_click_into_empty_space_fires_one_missed() {
    let mut h = harness(RootConfig::default());
    let clicked = Rc::new(Cell::new(0));
    let missed = Rc::new(Cell::new(0));
    let counter = clicked.clone();
    h.root
        .render(vec![cube(0.0).on(EventKind::Click, move |_, _| counter.set(counter.get() + 1))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    let miss_counter = missed.clone();
    h.root.on_pointer_missed(Some(Box::new(move |_: &NativePointerEvent| miss_counter.set(miss_counter.get() + 1))));

    // Top-left corner is far outside the cube
    let corner_down = NativePointerEvent::new(NativeEventKind::PointerDown, 1.0, 1.0);
    let corner_click = NativePointerEvent::new(NativeEventKind::Click, 1.0, 1.0);
    h.root.handle_native_event(&corner_down).unwrap();
    let result = h.root.handle_native_event(&corner_click).unwrap();

    assert!(result.missed);
    assert_eq!(result.delivered, 0);
    assert_eq!(missed.get(), 1);
    assert_eq!(clicked.get(), 0);
}

#[test]
fn test_click_on_handled_object_does_not_miss() {
    let mut h = harness(RootConfig::default());
    let clicked = Rc::new(Cell::new(0));
    let missed = Rc::new(Cell::new(0));
    let counter = clicked.clone();
    h.root
        .render(vec![cube(0.0).on(EventKind::Click, move |_, _| counter.set(counter.get() + 1))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    let miss_counter = missed.clone();
    h.root.on_pointer_missed(Some(Box::new(move |_: &NativePointerEvent| miss_counter.set(miss_counter.get() + 1))));

    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::Click)).unwrap();
    assert_eq!(clicked.get(), 1);
    assert_eq!(missed.get(), 0);
}

#[test]
fn test_click_requires_pointer_down_on_same_object() {
    let mut h = harness(RootConfig::default());
    let clicked = Rc::new(Cell::new(0));
    let counter = clicked.clone();
    h.root
        .render(vec![cube(0.0).on(EventKind::Click, move |_, _| counter.set(counter.get() + 1))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();

    // Pressed outside, released over the cube
    h.root
        .handle_native_event(&NativePointerEvent::new(NativeEventKind::PointerDown, 1.0, 1.0))
        .unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::Click)).unwrap();
    assert_eq!(clicked.get(), 0);
}

#[test]
fn test_hover_enter_and_leave_pairs() {
    let mut h = harness(RootConfig::default());
    let log = call_log();
    let mut element = cube(0.0);
    for (kind, name) in [
        (EventKind::PointerOver, "over"),
        (EventKind::PointerEnter, "enter"),
        (EventKind::PointerMove, "move"),
        (EventKind::PointerOut, "out"),
        (EventKind::PointerLeave, "leave"),
    ] {
        let log = log.clone();
        element = element.on(kind, move |_, _| log.borrow_mut().push(name.to_string()));
    }
    h.root.render(vec![element]).unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();

    h.root.handle_native_event(&at_center(NativeEventKind::PointerMove)).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerMove)).unwrap();
    assert_eq!(h.root.hovered(0).len(), 1);
    h.root
        .handle_native_event(&NativePointerEvent::new(NativeEventKind::PointerMove, 1.0, 1.0))
        .unwrap();

    assert_eq!(*log.borrow(), vec!["over", "enter", "move", "move", "out", "leave"]);
    assert!(h.root.hovered(0).is_empty());
}

#[test]
fn test_surface_leave_cancels_hovers() {
    let mut h = harness(RootConfig::default());
    let left = Rc::new(Cell::new(false));
    let flag = left.clone();
    h.root
        .render(vec![cube(0.0)
            .on(EventKind::PointerOver, |_, _| {})
            .on(EventKind::PointerLeave, move |_, _| flag.set(true))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerMove)).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerLeave)).unwrap();
    assert!(left.get());
    assert!(h.root.hovered(0).is_empty());
}

#[test]
fn test_capture_routes_moves_until_pointer_up() {
    let mut h = harness(RootConfig::default());
    let moves = Rc::new(Cell::new(0));
    let lost = Rc::new(Cell::new(0));
    let (move_counter, lost_counter) = (moves.clone(), lost.clone());
    h.root
        .render(vec![cube(0.0)
            .on(EventKind::PointerDown, |event, _| event.set_pointer_capture())
            .on(EventKind::PointerMove, move |event, _| {
                assert!(event.has_pointer_capture());
                move_counter.set(move_counter.get() + 1);
            })
            .on(EventKind::LostPointerCapture, move |_, _| lost_counter.set(lost_counter.get() + 1))])
        .unwrap();
    let target = RecordingTarget::default();
    h.root.connect(Box::new(target.clone())).unwrap();

    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(*target.captured.borrow(), vec![0]);

    // Far away from the cube, still delivered through the capture
    h.root
        .handle_native_event(&NativePointerEvent::new(NativeEventKind::PointerMove, 5.0, 5.0))
        .unwrap();
    assert_eq!(moves.get(), 1);

    h.root
        .handle_native_event(&NativePointerEvent::new(NativeEventKind::PointerUp, 5.0, 5.0))
        .unwrap();
    assert_eq!(lost.get(), 1);
    assert!(target.captured.borrow().is_empty());

    h.root
        .handle_native_event(&NativePointerEvent::new(NativeEventKind::PointerMove, 5.0, 5.0))
        .unwrap();
    assert_eq!(moves.get(), 1);
}

#[test]
fn test_removed_node_gets_no_events() {
    let mut h = harness(RootConfig::default());
    let calls = Rc::new(Cell::new(0));
    let disposed = Rc::new(Cell::new(0));
    let mesh = NodeRef::new();
    let (down, up) = (calls.clone(), calls.clone());
    h.root
        .render(vec![cube(0.0)
            .node_ref(&mesh)
            .on(EventKind::PointerDown, move |_, _| down.set(down.get() + 1))
            .on(EventKind::PointerUp, move |_, _| up.set(up.get() + 1))])
        .unwrap();
    let counter = disposed.clone();
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
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(calls.get(), 1);

    h.root.render(Vec::new()).unwrap();
    assert_eq!(disposed.get(), 1);
    assert!(h.root.store().interaction().is_empty());
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerUp)).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(disposed.get(), 1);
}

#[test]
fn test_disconnect_keeps_node_handlers() {
    let mut h = harness(RootConfig::default());
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    h.root
        .render(vec![cube(0.0).on(EventKind::PointerDown, move |_, _| counter.set(counter.get() + 1))])
        .unwrap();
    let target = RecordingTarget::default();
    h.root.connect(Box::new(target.clone())).unwrap();
    assert_eq!(target.listeners.borrow().len(), NativeEventKind::ALL.len());

    h.root.disconnect();
    assert!(target.listeners.borrow().is_empty());
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(calls.get(), 0);

    h.root.connect(Box::new(target.clone())).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_disabled_events_are_ignored() {
    let mut h = harness(RootConfig::default().with_events_enabled(false));
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    h.root
        .render(vec![cube(0.0).on(EventKind::PointerDown, move |_, _| counter.set(counter.get() + 1))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_filter_can_drop_intersections() {
    let mut h = harness(RootConfig::default());
    let log = call_log();
    h.root
        .render(vec![
            logging_cube(3.5, "near", EventKind::PointerDown, &log),
            logging_cube(1.5, "far", EventKind::PointerDown, &log),
        ])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    h.root.set_filter(Some(Box::new(|hits: &mut Vec<Intersection>| hits.truncate(1))));
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(*log.borrow(), vec!["near"]);
}

#[test]
fn test_handler_can_mutate_its_node() {
    let mut h = harness(RootConfig::default());
    h.root
        .render(vec![cube(0.0).on(EventKind::PointerDown, |event, reconciler| {
            reconciler.set_prop(event.event_object, "scale", 2.0f32).unwrap();
        })])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    let mesh = h.root.reconciler().graph().get(h.root.scene()).unwrap().engine_children()[0];
    assert_eq!(
        h.root.reconciler().graph().get_path(mesh, "scale.x"),
        Some(crate::engine::PropValue::Float(2.0))
    );
}

#[test]
fn test_custom_compute_overrides_surface_mapping() {
    let mut h = harness(RootConfig::default());
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    h.root
        .render(vec![cube(0.0).on(EventKind::PointerDown, move |_, _| counter.set(counter.get() + 1))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();

    // Every event aims through the middle of the view, wherever it landed
    h.root.set_compute(Some(Box::new(
        |_: &NativePointerEvent, graph: &SceneGraph, state: &StoreState| {
            let pointer = Vec2::zeros();
            let mut raycaster: Raycaster = state.raycaster;
            raycaster.set_from_camera(pointer, graph, state.camera).then_some((pointer, raycaster))
        },
    )));
    let corner = NativePointerEvent::new(NativeEventKind::PointerDown, 1.0, 1.0);
    let result = h.root.handle_native_event(&corner).unwrap();
    assert_eq!(result.delivered, 1);
    approx::assert_relative_eq!(h.root.store().with_state(|s| s.pointer.x), 0.0);

    h.root.set_compute(None);
    let result = h.root.handle_native_event(&corner).unwrap();
    assert_eq!(result.intersections, 0);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_unmapped_event_does_not_reuse_previous_ray() {
    let mut h = harness(RootConfig::default());
    let calls = Rc::new(Cell::new(0));
    let missed = Rc::new(Cell::new(0));
    let counter = calls.clone();
    h.root
        .render(vec![cube(0.0)
            .on(EventKind::PointerDown, move |_, _| counter.set(counter.get() + 1))
            .on(EventKind::Click, |_, _| {})])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();
    let miss_counter = missed.clone();
    h.root.on_pointer_missed(Some(Box::new(move |_: &NativePointerEvent| miss_counter.set(miss_counter.get() + 1))));

    // Leaves the store's ray aimed at the cube
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(calls.get(), 1);

    h.root.set_compute(Some(Box::new(
        |_: &NativePointerEvent, _: &SceneGraph, _: &StoreState| -> Option<(Vec2, Raycaster)> { None },
    )));
    let result = h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(result.intersections, 0);
    assert_eq!(result.delivered, 0);
    assert_eq!(calls.get(), 1);

    let result = h.root.handle_native_event(&at_center(NativeEventKind::Click)).unwrap();
    assert!(result.missed);
    assert_eq!(missed.get(), 1);
}

#[test]
fn test_handler_can_release_its_capture() {
    let mut h = harness(RootConfig::default());
    let moves = Rc::new(Cell::new(0));
    let lost = Rc::new(Cell::new(0));
    let (move_counter, lost_counter) = (moves.clone(), lost.clone());
    h.root
        .render(vec![cube(0.0)
            .on(EventKind::PointerDown, |event, _| event.set_pointer_capture())
            .on(EventKind::PointerMove, move |event, _| {
                move_counter.set(move_counter.get() + 1);
                event.release_pointer_capture();
            })
            .on(EventKind::LostPointerCapture, move |_, _| lost_counter.set(lost_counter.get() + 1))])
        .unwrap();
    let target = RecordingTarget::default();
    h.root.connect(Box::new(target.clone())).unwrap();

    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(*target.captured.borrow(), vec![0]);

    // Off the cube: reached through the capture, which the handler then gives up
    let away = NativePointerEvent::new(NativeEventKind::PointerMove, 5.0, 5.0);
    h.root.handle_native_event(&away).unwrap();
    assert_eq!(moves.get(), 1);
    assert_eq!(lost.get(), 1);
    assert!(target.captured.borrow().is_empty());

    // Back to raycasting, which misses
    h.root.handle_native_event(&away).unwrap();
    assert_eq!(moves.get(), 1);

    // Pointer up has no capture left to release
    h.root
        .handle_native_event(&NativePointerEvent::new(NativeEventKind::PointerUp, 5.0, 5.0))
        .unwrap();
    assert_eq!(lost.get(), 1);
}

#[test]
fn test_stopped_move_unhovers_objects_behind() {
    let mut h = harness(RootConfig::default());
    let log = call_log();
    let blocking = Rc::new(Cell::new(false));
    let stop = blocking.clone();
    let mut back = cube(1.5).key("back");
    for (kind, name) in [
        (EventKind::PointerOver, "back over"),
        (EventKind::PointerOut, "back out"),
        (EventKind::PointerLeave, "back leave"),
    ] {
        let log = log.clone();
        back = back.on(kind, move |_, _| log.borrow_mut().push(name.to_string()));
    }
    let front = cube(3.5).key("front").on(EventKind::PointerMove, move |event, _| {
        if stop.get() {
            event.stop_propagation();
        }
    });
    h.root.render(vec![front, back]).unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();

    h.root.handle_native_event(&at_center(NativeEventKind::PointerMove)).unwrap();
    assert_eq!(h.root.hovered(0).len(), 2);
    assert_eq!(*log.borrow(), vec!["back over"]);

    blocking.set(true);
    h.root.handle_native_event(&at_center(NativeEventKind::PointerMove)).unwrap();
    assert_eq!(*log.borrow(), vec!["back over", "back out", "back leave"]);
    assert_eq!(h.root.hovered(0).len(), 1);

    // Still blocked: no second over for the back cube
    h.root.handle_native_event(&at_center(NativeEventKind::PointerMove)).unwrap();
    assert_eq!(log.borrow().len(), 3);
}

#[test]
fn test_pointer_cancel_notifies_then_unhovers_and_releases() {
    let mut h = harness(RootConfig::default());
    let log = call_log();
    let mut element = cube(0.0).on(EventKind::PointerDown, |event, _| event.set_pointer_capture());
    for (kind, name) in [
        (EventKind::PointerOver, "over"),
        (EventKind::PointerCancel, "cancel"),
        (EventKind::PointerLeave, "leave"),
        (EventKind::LostPointerCapture, "lost"),
    ] {
        let log = log.clone();
        element = element.on(kind, move |_, _| log.borrow_mut().push(name.to_string()));
    }
    h.root.render(vec![element]).unwrap();
    let target = RecordingTarget::default();
    h.root.connect(Box::new(target.clone())).unwrap();

    h.root.handle_native_event(&at_center(NativeEventKind::PointerMove)).unwrap();
    h.root.handle_native_event(&at_center(NativeEventKind::PointerDown)).unwrap();
    assert_eq!(*target.captured.borrow(), vec![0]);

    // Hovered and captured by the same node: one cancel, not two
    let result = h.root.handle_native_event(&at_center(NativeEventKind::PointerCancel)).unwrap();
    assert_eq!(*log.borrow(), vec!["over", "cancel", "leave", "lost"]);
    assert_eq!(result.delivered, 3);
    assert!(h.root.hovered(0).is_empty());
    assert!(target.captured.borrow().is_empty());
}

#[test]
fn test_wheel_reaches_hit_object_with_delta() {
    let mut h = harness(RootConfig::default());
    let delta = Rc::new(Cell::new(0.0f32));
    let seen = delta.clone();
    h.root
        .render(vec![cube(0.0).on(EventKind::Wheel, move |event, _| seen.set(event.native.delta_y))])
        .unwrap();
    h.root.connect(Box::new(RecordingTarget::default())).unwrap();

    let wheel = at_center(NativeEventKind::Wheel).with_wheel(-120.0);
    let result = h.root.handle_native_event(&wheel).unwrap();
    assert_eq!(result.delivered, 1);
    assert!(!result.missed);
    approx::assert_relative_eq!(delta.get(), -120.0);
}
