//! Native input to synthetic event dispatch

use std::collections::HashMap;

use crate::foundation::collections::{NodeId, PointerId};
use crate::foundation::math::Vec2;
use crate::input::{surface_to_ndc, Raycaster};
use crate::reconciler::Reconciler;
use crate::scene::SceneGraph;
use crate::store::{Store, StoreState};

use super::{EventKind, EventTarget, Intersection, NativeEventKind, NativePointerEvent, PointerEvent};

/// Maps a native event to a pointer position (NDC) and an aimed raycaster
pub type ComputeFn = Box<dyn Fn(&NativePointerEvent, &SceneGraph, &StoreState) -> Option<(Vec2, Raycaster)>>;

/// Reorders or drops intersections before dispatch
pub type FilterFn = Box<dyn Fn(&mut Vec<Intersection>)>;

/// Root-level pointer-missed callback
pub type MissedFn = Box<dyn FnMut(&NativePointerEvent)>;

/// Pointer movement (pixels) below which a click still counts as a click
const CLICK_DRAG_THRESHOLD: f32 = 2.0;

/// Surface coordinates mapped through the store's camera
pub fn default_compute(
    native: &NativePointerEvent,
    graph: &SceneGraph,
    state: &StoreState,
) -> Option<(Vec2, Raycaster)> {
    let pointer = surface_to_ndc(native.offset_x, native.offset_y, &state.size);
    let mut raycaster = state.raycaster;
    raycaster
        .set_from_camera(pointer, graph, state.camera)
        .then_some((pointer, raycaster))
}

/// Outcome of one native event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchResult {
    /// Number of node handlers invoked
    pub delivered: usize,
    /// Number of intersections after bubbling and filtering
    pub intersections: usize,
    /// Whether the root-level pointer-missed callback fired
    pub missed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Hover {
    pointer_id: PointerId,
    intersection: Intersection,
}

impl Hover {
    fn matches(&self, hit: &Intersection) -> bool {
        self.intersection.object == hit.object && self.intersection.event_object == hit.event_object
    }
}

/// Pointer event dispatcher of one root
pub struct EventDispatcher {
    store: Store,
    target: Option<Box<dyn EventTarget>>,
    compute: Option<ComputeFn>,
    filter: Option<FilterFn>,
    on_missed: Option<MissedFn>,
    hovered: Vec<Hover>,
    captured: HashMap<PointerId, Vec<Intersection>>,
    initial_click: Option<(f32, f32)>,
    initial_hits: Vec<NodeId>,
}

impl EventDispatcher {
    /// Create a disconnected dispatcher
    pub fn new(store: Store) -> Self {
        Self {
            store,
            target: None,
            compute: None,
            filter: None,
            on_missed: None,
            hovered: Vec::new(),
            captured: HashMap::new(),
            initial_click: None,
            initial_hits: Vec::new(),
        }
    }

    /// Bind native listeners to `target`, unbinding the previous target first
    pub fn connect(&mut self, mut target: Box<dyn EventTarget>) {
        self.disconnect();
        for kind in NativeEventKind::ALL {
            target.add_listener(kind);
        }
        self.target = Some(target);
        self.store.set_connected(true);
        log::debug!("Event surface connected");
    }

    /// Remove every native listener; node handlers stay registered
    pub fn disconnect(&mut self) {
        let Some(mut target) = self.target.take() else {
            return;
        };
        for kind in NativeEventKind::ALL {
            target.remove_listener(kind);
        }
        for pointer_id in self.captured.keys() {
            target.release_pointer_capture(*pointer_id);
        }
        self.captured.clear();
        self.store.set_connected(false);
        log::debug!("Event surface disconnected");
    }

    /// Whether a surface is connected
    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    /// Replace the coordinate mapping (`None` restores the default)
    pub fn set_compute(&mut self, compute: Option<ComputeFn>) {
        self.compute = compute;
    }

    /// Install an intersection filter
    pub fn set_filter(&mut self, filter: Option<FilterFn>) {
        self.filter = filter;
    }

    /// Install the root-level pointer-missed callback
    pub fn on_pointer_missed(&mut self, callback: Option<MissedFn>) {
        self.on_missed = callback;
    }

    /// Nodes currently hovered by `pointer_id`
    pub fn hovered(&self, pointer_id: PointerId) -> Vec<NodeId> {
        self.hovered
            .iter()
            .filter(|h| h.pointer_id == pointer_id)
            .map(|h| h.intersection.event_object)
            .collect()
    }

    /// Nodes holding the capture of `pointer_id`
    pub fn captured(&self, pointer_id: PointerId) -> Vec<NodeId> {
        self.captured
            .get(&pointer_id)
            .map(|hits| hits.iter().map(|h| h.event_object).collect())
            .unwrap_or_default()
    }

    /// Handle one native event from the connected surface
    pub fn handle(&mut self, reconciler: &mut Reconciler, native: &NativePointerEvent) -> DispatchResult {
        let mut result = DispatchResult::default();
        if !self.store.is_active() || self.target.is_none() || !self.store.events_enabled() {
            log::trace!("Ignoring {:?}: events inactive", native.kind);
            return result;
        }
        self.prune(reconciler.graph());

        match native.kind {
            NativeEventKind::PointerLeave => {
                result.delivered = self.cancel_hovers(reconciler, native, &[]);
                return result;
            }
            NativeEventKind::PointerCancel => {
                result.delivered = self.notify_cancel(reconciler, native);
                result.delivered += self.cancel_hovers(reconciler, native, &[]);
                result.delivered += self.release_all(reconciler, native);
                return result;
            }
            NativeEventKind::LostPointerCapture => {
                result.delivered = self.release_all(reconciler, native);
                return result;
            }
            _ => {}
        }

        let kind = native.kind.handler_kind();
        let is_move = kind == EventKind::PointerMove;
        let is_click = kind.is_click();

        let aimed = self.compute_ray(reconciler.graph(), native);
        let hits = self.intersect(reconciler.graph(), native.pointer_id, aimed);
        result.intersections = hits.len();

        let delta = self.initial_click.map_or(0.0, |(x, y)| {
            ((native.offset_x - x).powi(2) + (native.offset_y - y).powi(2)).sqrt()
        });
        if kind == EventKind::PointerDown {
            self.initial_click = Some((native.offset_x, native.offset_y));
            self.initial_hits = hits.iter().map(|h| h.event_object).collect();
        }

        if is_move {
            result.delivered += self.cancel_hovers(reconciler, native, &hits);
        }

        let handled = hits.iter().any(|hit| has_handler(reconciler.graph(), hit.event_object, kind));
        let (pointer, ray) = self.store.with_state(|s| (s.pointer, s.raycaster.ray));

        for index in 0..hits.len() {
            let hit = hits[index];
            if !reconciler.graph().contains(hit.event_object) {
                continue;
            }
            let has_capture = self.is_captured_by(native.pointer_id, hit.event_object);
            let Some(mut event) = PointerEvent::new(*native, &hits, index, pointer, ray, delta, has_capture)
            else {
                continue;
            };

            if is_move {
                if !self.hovered.iter().any(|h| h.pointer_id == native.pointer_id && h.matches(&hit)) {
                    self.hovered.push(Hover {
                        pointer_id: native.pointer_id,
                        intersection: hit,
                    });
                    result.delivered += usize::from(invoke(reconciler, EventKind::PointerOver, &mut event));
                    result.delivered += usize::from(invoke(reconciler, EventKind::PointerEnter, &mut event));
                }
                result.delivered += usize::from(invoke(reconciler, EventKind::PointerMove, &mut event));
            } else if !is_click || self.initial_hits.contains(&hit.event_object) {
                result.delivered += usize::from(invoke(reconciler, kind, &mut event));
            }

            if let Some(capture) = event.take_capture_request() {
                if capture {
                    self.capture(native.pointer_id, hit);
                } else {
                    result.delivered += self.release(reconciler, native, hit.event_object);
                }
            }

            if event.is_propagation_stopped() {
                log::trace!("{:?} stopped at {:?} (index {})", kind, hit.event_object, index);
                if is_move {
                    result.delivered += self.cancel_hovers_behind(reconciler, native, &hits[index + 1..]);
                }
                break;
            }
        }

        if is_click && !handled && delta <= CLICK_DRAG_THRESHOLD {
            if let Some(on_missed) = self.on_missed.as_mut() {
                on_missed(native);
            }
            log::trace!("{:?} missed every interactive node", kind);
            result.missed = true;
        }

        if kind == EventKind::PointerUp {
            result.delivered += self.release_all(reconciler, native);
        }
        result
    }

    /// Aim the store's raycaster at the event; `false` when it could not be aimed
    fn compute_ray(&self, graph: &SceneGraph, native: &NativePointerEvent) -> bool {
        let computed = self.store.with_state(|state| match &self.compute {
            Some(compute) => compute(native, graph, state),
            None => default_compute(native, graph, state),
        });
        match computed {
            Some((pointer, raycaster)) => {
                self.store.set_pointer_ray(pointer, raycaster);
                true
            }
            None => {
                log::trace!("{:?} not mapped to a ray; nothing intersected", native.kind);
                false
            }
        }
    }

    /// Captured intersections when the pointer is captured, otherwise the
    /// bubbled raycast against the scene (empty when the ray is not aimed)
    fn intersect(&self, graph: &SceneGraph, pointer_id: PointerId, aimed: bool) -> Vec<Intersection> {
        if let Some(captured) = self.captured.get(&pointer_id) {
            if !captured.is_empty() {
                return captured.clone();
            }
        }
        if !aimed || self.store.with_state(|s| s.internal.interaction.is_empty()) {
            return Vec::new();
        }

        let (raycaster, scene) = self.store.with_state(|s| (s.raycaster, s.scene));
        let mut intersections: Vec<Intersection> = Vec::new();
        for hit in raycaster.intersect(graph, scene) {
            let mut current = Some(hit.object);
            while let Some(id) = current {
                let interactive = graph.local(id).is_some_and(|l| l.has_handlers());
                let duplicate = intersections
                    .iter()
                    .any(|i| i.object == hit.object && i.event_object == id);
                if interactive && !duplicate {
                    intersections.push(Intersection {
                        object: hit.object,
                        event_object: id,
                        distance: hit.distance,
                        point: hit.point,
                        face_normal: hit.face_normal,
                    });
                }
                current = graph.get(id).and_then(|n| n.engine_parent());
            }
        }
        if let Some(filter) = &self.filter {
            filter(&mut intersections);
        }
        intersections
    }

    fn is_captured_by(&self, pointer_id: PointerId, node: NodeId) -> bool {
        self.captured
            .get(&pointer_id)
            .is_some_and(|hits| hits.iter().any(|h| h.event_object == node))
    }

    fn capture(&mut self, pointer_id: PointerId, hit: Intersection) {
        let hits = self.captured.entry(pointer_id).or_default();
        if hits.iter().any(|h| h.event_object == hit.event_object) {
            return;
        }
        if hits.is_empty() {
            if let Some(target) = self.target.as_mut() {
                target.set_pointer_capture(pointer_id);
            }
        }
        hits.push(hit);
        log::debug!("Pointer {} captured by {:?}", pointer_id, hit.event_object);
    }

    /// Release one node's capture and notify it
    fn release(&mut self, reconciler: &mut Reconciler, native: &NativePointerEvent, node: NodeId) -> usize {
        let Some(hits) = self.captured.get_mut(&native.pointer_id) else {
            return 0;
        };
        let Some(index) = hits.iter().position(|h| h.event_object == node) else {
            return 0;
        };
        let hit = hits.remove(index);
        if hits.is_empty() {
            self.captured.remove(&native.pointer_id);
            if let Some(target) = self.target.as_mut() {
                target.release_pointer_capture(native.pointer_id);
            }
        }
        self.notify_lost_capture(reconciler, native, &[hit])
    }

    /// Release every capture of the pointer and notify the nodes
    fn release_all(&mut self, reconciler: &mut Reconciler, native: &NativePointerEvent) -> usize {
        let Some(hits) = self.captured.remove(&native.pointer_id) else {
            return 0;
        };
        if let Some(target) = self.target.as_mut() {
            target.release_pointer_capture(native.pointer_id);
        }
        self.notify_lost_capture(reconciler, native, &hits)
    }

    fn notify_lost_capture(&self, reconciler: &mut Reconciler, native: &NativePointerEvent, hits: &[Intersection]) -> usize {
        let (pointer, ray) = self.store.with_state(|s| (s.pointer, s.raycaster.ray));
        let mut delivered = 0;
        for index in 0..hits.len() {
            if let Some(mut event) = PointerEvent::new(*native, hits, index, pointer, ray, 0.0, false) {
                delivered += usize::from(invoke(reconciler, EventKind::LostPointerCapture, &mut event));
            }
        }
        delivered
    }

    /// Deliver `PointerCancel` once to every node hovered or captured by the pointer
    fn notify_cancel(&self, reconciler: &mut Reconciler, native: &NativePointerEvent) -> usize {
        let mut affected: Vec<Intersection> = Vec::new();
        let hovered = self
            .hovered
            .iter()
            .filter(|h| h.pointer_id == native.pointer_id)
            .map(|h| h.intersection);
        let captured = self.captured.get(&native.pointer_id).into_iter().flatten().copied();
        for hit in hovered.chain(captured) {
            if !affected.iter().any(|a| a.event_object == hit.event_object) {
                affected.push(hit);
            }
        }

        let (pointer, ray) = self.store.with_state(|s| (s.pointer, s.raycaster.ray));
        let mut delivered = 0;
        for index in 0..affected.len() {
            if let Some(mut event) = PointerEvent::new(*native, &affected, index, pointer, ray, 0.0, false) {
                delivered += usize::from(invoke(reconciler, EventKind::PointerCancel, &mut event));
            }
        }
        delivered
    }

    /// Send out/leave to hovers of this pointer that are not in `keep`
    fn cancel_hovers(&mut self, reconciler: &mut Reconciler, native: &NativePointerEvent, keep: &[Intersection]) -> usize {
        let (gone, kept): (Vec<Hover>, Vec<Hover>) = self
            .hovered
            .drain(..)
            .partition(|h| h.pointer_id == native.pointer_id && !keep.iter().any(|k| h.matches(k)));
        self.hovered = kept;
        self.unhover(reconciler, native, &gone)
    }

    /// Send out/leave to hovers of this pointer found in `behind`
    fn cancel_hovers_behind(
        &mut self,
        reconciler: &mut Reconciler,
        native: &NativePointerEvent,
        behind: &[Intersection],
    ) -> usize {
        let (gone, kept): (Vec<Hover>, Vec<Hover>) = self
            .hovered
            .drain(..)
            .partition(|h| h.pointer_id == native.pointer_id && behind.iter().any(|b| h.matches(b)));
        self.hovered = kept;
        self.unhover(reconciler, native, &gone)
    }

    fn unhover(&self, reconciler: &mut Reconciler, native: &NativePointerEvent, gone: &[Hover]) -> usize {
        let (pointer, ray) = self.store.with_state(|s| (s.pointer, s.raycaster.ray));
        let mut delivered = 0;
        for hover in gone {
            let hits = [hover.intersection];
            let Some(mut event) = PointerEvent::new(*native, &hits, 0, pointer, ray, 0.0, false) else {
                continue;
            };
            delivered += usize::from(invoke(reconciler, EventKind::PointerOut, &mut event));
            delivered += usize::from(invoke(reconciler, EventKind::PointerLeave, &mut event));
        }
        delivered
    }

    /// Forget hovers and captures of nodes that were removed
    fn prune(&mut self, graph: &SceneGraph) {
        let live = |i: &Intersection| graph.contains(i.object) && graph.contains(i.event_object);
        self.hovered.retain(|h| live(&h.intersection));
        let mut released = Vec::new();
        for (pointer_id, hits) in &mut self.captured {
            hits.retain(live);
            if hits.is_empty() {
                released.push(*pointer_id);
            }
        }
        for pointer_id in released {
            self.captured.remove(&pointer_id);
            if let Some(target) = self.target.as_mut() {
                target.release_pointer_capture(pointer_id);
            }
            log::debug!("Pointer {} capture released: node removed", pointer_id);
        }
    }
}

fn has_handler(graph: &SceneGraph, node: NodeId, kind: EventKind) -> bool {
    graph.local(node).is_some_and(|l| l.handlers.contains_key(&kind))
}

/// Run `event.event_object`'s handler for `kind`; returns whether one ran
fn invoke(reconciler: &mut Reconciler, kind: EventKind, event: &mut PointerEvent) -> bool {
    let handler = reconciler
        .graph()
        .local(event.event_object)
        .and_then(|l| l.handlers.get(&kind))
        .cloned();
    let Some(handler) = handler else {
        return false;
    };
    event.kind = kind;
    handler.call(event, reconciler)
}
