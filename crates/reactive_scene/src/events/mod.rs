//! # Pointer Events
//!
//! Synthetic pointer events delivered to scene nodes. Native input from a
//! connected surface is turned into a world-space ray, intersected with the
//! scene graph and dispatched nearest-first along the resulting
//! intersections. Every raycast hit bubbles: it yields one intersection per
//! engine ancestor (the hit node first) that registered handlers.

mod dispatcher;

pub use dispatcher::{default_compute, ComputeFn, DispatchResult, EventDispatcher, FilterFn, MissedFn};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::foundation::collections::{NodeId, PointerId};
use crate::foundation::math::{Ray, Vec2, Vec3};
use crate::reconciler::Reconciler;

/// Handler slots on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Primary button click
    Click,
    /// Secondary button click
    ContextMenu,
    /// Double click
    DoubleClick,
    /// Wheel scroll
    Wheel,
    /// Button pressed
    PointerDown,
    /// Button released
    PointerUp,
    /// Pointer moved
    PointerMove,
    /// Pointer started hovering the node
    PointerOver,
    /// Pointer stopped hovering the node
    PointerOut,
    /// Pointer entered the node
    PointerEnter,
    /// Pointer left the node
    PointerLeave,
    /// Pointer interaction cancelled by the host
    PointerCancel,
    /// Node lost a pointer capture
    LostPointerCapture,
    /// Click that hit nothing (root level only)
    PointerMissed,
}

impl EventKind {
    /// Click family: these trigger pointer-missed when nothing handles them
    pub fn is_click(self) -> bool {
        matches!(self, Self::Click | Self::ContextMenu | Self::DoubleClick)
    }
}

/// Native input event types a surface delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeEventKind {
    /// Pointer moved over the surface
    PointerMove,
    /// Button pressed
    PointerDown,
    /// Button released
    PointerUp,
    /// Pointer left the surface
    PointerLeave,
    /// Host cancelled the pointer
    PointerCancel,
    /// Surface lost a pointer capture
    LostPointerCapture,
    /// Click
    Click,
    /// Context menu
    ContextMenu,
    /// Double click
    DoubleClick,
    /// Wheel
    Wheel,
}

impl NativeEventKind {
    /// Every native event the dispatcher listens to
    pub const ALL: [Self; 10] = [
        Self::PointerMove,
        Self::PointerDown,
        Self::PointerUp,
        Self::PointerLeave,
        Self::PointerCancel,
        Self::LostPointerCapture,
        Self::Click,
        Self::ContextMenu,
        Self::DoubleClick,
        Self::Wheel,
    ];

    /// Handler slot a native event is dispatched to
    pub fn handler_kind(self) -> EventKind {
        match self {
            Self::PointerMove => EventKind::PointerMove,
            Self::PointerDown => EventKind::PointerDown,
            Self::PointerUp => EventKind::PointerUp,
            Self::PointerLeave => EventKind::PointerLeave,
            Self::PointerCancel => EventKind::PointerCancel,
            Self::LostPointerCapture => EventKind::LostPointerCapture,
            Self::Click => EventKind::Click,
            Self::ContextMenu => EventKind::ContextMenu,
            Self::DoubleClick => EventKind::DoubleClick,
            Self::Wheel => EventKind::Wheel,
        }
    }
}

/// Native input event in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativePointerEvent {
    /// Event type
    pub kind: NativeEventKind,
    /// Pointer identity
    pub pointer_id: PointerId,
    /// Pixels from the left edge of the surface
    pub offset_x: f32,
    /// Pixels from the top edge of the surface
    pub offset_y: f32,
    /// Button index (0 primary, 2 secondary)
    pub button: i16,
    /// Wheel delta
    pub delta_y: f32,
}

impl NativePointerEvent {
    /// Event for the primary pointer
    pub fn new(kind: NativeEventKind, offset_x: f32, offset_y: f32) -> Self {
        Self {
            kind,
            pointer_id: 0,
            offset_x,
            offset_y,
            button: 0,
            delta_y: 0.0,
        }
    }

    /// Set the pointer id (builder pattern)
    pub fn with_pointer(mut self, pointer_id: PointerId) -> Self {
        self.pointer_id = pointer_id;
        self
    }

    /// Set the button (builder pattern)
    pub fn with_button(mut self, button: i16) -> Self {
        self.button = button;
        self
    }

    /// Set the wheel delta (builder pattern)
    pub fn with_wheel(mut self, delta_y: f32) -> Self {
        self.delta_y = delta_y;
        self
    }
}

/// One hit delivered to a handler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Node the ray hit
    pub object: NodeId,
    /// Node whose handler receives the event (the hit node or an ancestor)
    pub event_object: NodeId,
    /// Distance from the ray origin
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
    /// World-space face normal
    pub face_normal: Vec3,
}

/// Synthetic event passed to node handlers
#[derive(Debug, Clone)]
pub struct PointerEvent {
    /// Handler slot being invoked
    pub kind: EventKind,
    /// Native event that caused the dispatch
    pub native: NativePointerEvent,
    /// Node the ray hit
    pub object: NodeId,
    /// Node whose handler is running
    pub event_object: NodeId,
    /// All intersections of this dispatch, nearest first
    pub intersections: Vec<Intersection>,
    /// Position of this intersection in `intersections`
    pub index: usize,
    /// Distance of the hit from the ray origin
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
    /// Pointer position in NDC
    pub pointer: Vec2,
    /// World-space pointer ray
    pub ray: Ray,
    /// Pixels travelled since the last pointer down
    pub delta: f32,
    stopped: bool,
    capture: Option<bool>,
    has_capture: bool,
}

impl PointerEvent {
    pub(crate) fn new(
        native: NativePointerEvent,
        intersections: &[Intersection],
        index: usize,
        pointer: Vec2,
        ray: Ray,
        delta: f32,
        has_capture: bool,
    ) -> Option<Self> {
        let hit = intersections.get(index)?;
        Some(Self {
            kind: native.kind.handler_kind(),
            native,
            object: hit.object,
            event_object: hit.event_object,
            intersections: intersections.to_vec(),
            index,
            distance: hit.distance,
            point: hit.point,
            pointer,
            ray,
            delta,
            stopped: false,
            capture: None,
            has_capture,
        })
    }

    /// The intersection this event is delivered for
    pub fn intersection(&self) -> Option<&Intersection> {
        self.intersections.get(self.index)
    }

    /// Stop delivery to farther intersections
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    /// Whether `stop_propagation` was called
    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped
    }

    /// Route later events of this pointer to `event_object`, bypassing raycasts
    pub fn set_pointer_capture(&mut self) {
        self.capture = Some(true);
        self.has_capture = true;
    }

    /// Undo `set_pointer_capture` for `event_object`
    pub fn release_pointer_capture(&mut self) {
        self.capture = Some(false);
        self.has_capture = false;
    }

    /// Whether `event_object` holds the capture of this pointer
    pub fn has_pointer_capture(&self) -> bool {
        self.has_capture
    }

    pub(crate) fn take_capture_request(&mut self) -> Option<bool> {
        self.capture.take()
    }
}

type HandlerFn = dyn FnMut(&mut PointerEvent, &mut Reconciler);

/// Event handler registered on a node
#[derive(Clone)]
pub struct EventHandler(Rc<RefCell<HandlerFn>>);

impl EventHandler {
    /// Wrap a closure
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(&mut PointerEvent, &mut Reconciler) + 'static,
    {
        Self(Rc::new(RefCell::new(handler)))
    }

    /// Whether two handles share the same closure
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Invoke the handler; a handler already running further up the stack is skipped
    pub(crate) fn call(&self, event: &mut PointerEvent, reconciler: &mut Reconciler) -> bool {
        match self.0.try_borrow_mut() {
            Ok(mut handler) => {
                (*handler)(event, reconciler);
                true
            }
            Err(_) => {
                log::warn!("Skipping re-entrant {:?} handler on {:?}", event.kind, event.event_object);
                false
            }
        }
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler(..)")
    }
}

/// A surface native listeners are bound to
pub trait EventTarget {
    /// Start delivering `kind` events
    fn add_listener(&mut self, kind: NativeEventKind);

    /// Stop delivering `kind` events
    fn remove_listener(&mut self, kind: NativeEventKind);

    /// Keep delivering this pointer's events even outside the surface
    fn set_pointer_capture(&mut self, _pointer_id: PointerId) {}

    /// Undo `set_pointer_capture`
    fn release_pointer_capture(&mut self, _pointer_id: PointerId) {}
}
