//! # Reactive Store
//!
//! Per-root shared state: camera, scene, renderer, surface size and
//! viewport, pointer and raycaster, controls, performance tier, frameloop
//! mode and the scheduler's internal counters.
//!
//! Reads are synchronous and always see the latest value. Change
//! notifications are deferred: `update()` only marks listeners dirty and
//! `flush()` (called by the scheduler at the start and end of every tick)
//! delivers one notification carrying a snapshot of the state.

mod performance;
mod viewport;

pub use performance::PerformanceState;
pub use viewport::{fit_camera, viewport_for, Viewport};

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::{DprRange, Frameloop, RootConfig, Size};
use crate::foundation::collections::NodeId;
use crate::foundation::math::{Vec2, Vec3};
use crate::foundation::time::Clock;
use crate::input::Raycaster;
use crate::render::RendererHandle;
use crate::scene::SceneGraph;

/// Scheduler bookkeeping kept in the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalState {
    /// False once the root is torn down
    pub active: bool,
    /// Number of pre-render subscriptions with a non-zero priority
    pub priority: u32,
    /// Pending render flag (0 or 1; invalidations coalesce)
    pub frames: u32,
    /// Nodes with at least one registered event handler
    pub interaction: Vec<NodeId>,
}

/// Event system state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventsState {
    /// Whether native input is processed
    pub enabled: bool,
    /// Priority among roots sharing one surface
    pub priority: i32,
    /// Whether a surface is connected
    pub connected: bool,
}

/// Shared state of one root
#[derive(Clone)]
pub struct StoreState {
    /// Active camera node
    pub camera: NodeId,
    /// Scene root node
    pub scene: NodeId,
    /// Renderer the scheduler draws with
    pub renderer: RendererHandle,
    /// Surface size in CSS pixels
    pub size: Size,
    /// Derived viewport metrics
    pub viewport: Viewport,
    /// Allowed pixel-ratio range
    pub dpr_range: DprRange,
    /// Last pointer position in NDC
    pub pointer: Vec2,
    /// Pointer raycaster
    pub raycaster: Raycaster,
    /// Active camera controls node, when a collaborator installed one
    pub controls: Option<NodeId>,
    /// Adaptive performance tier
    pub performance: PerformanceState,
    /// Render loop policy
    pub frameloop: Frameloop,
    /// Event system state
    pub events: EventsState,
    /// Frame clock
    pub clock: Clock,
    /// Scheduler bookkeeping
    pub internal: InternalState,
}

impl fmt::Debug for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreState")
            .field("camera", &self.camera)
            .field("scene", &self.scene)
            .field("size", &self.size)
            .field("viewport", &self.viewport)
            .field("pointer", &self.pointer)
            .field("frameloop", &self.frameloop)
            .field("events", &self.events)
            .field("internal", &self.internal)
            .finish_non_exhaustive()
    }
}

/// Partial state merged by [`Store::update`]
#[derive(Default, Clone)]
pub struct StatePatch {
    frameloop: Option<Frameloop>,
    camera: Option<NodeId>,
    controls: Option<Option<NodeId>>,
    pointer: Option<Vec2>,
    raycaster: Option<Raycaster>,
    events_enabled: Option<bool>,
    size: Option<Size>,
    viewport: Option<Viewport>,
    dpr: Option<f32>,
}

impl StatePatch {
    /// Empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the render loop policy
    pub fn frameloop(mut self, frameloop: Frameloop) -> Self {
        self.frameloop = Some(frameloop);
        self
    }

    /// Switch the active camera
    pub fn camera(mut self, camera: NodeId) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Install or clear camera controls
    pub fn controls(mut self, controls: Option<NodeId>) -> Self {
        self.controls = Some(controls);
        self
    }

    /// Set the pointer position (NDC)
    pub fn pointer(mut self, pointer: Vec2) -> Self {
        self.pointer = Some(pointer);
        self
    }

    /// Replace the raycaster
    pub fn raycaster(mut self, raycaster: Raycaster) -> Self {
        self.raycaster = Some(raycaster);
        self
    }

    /// Enable or disable event processing
    pub fn events_enabled(mut self, enabled: bool) -> Self {
        self.events_enabled = Some(enabled);
        self
    }

    /// Set the surface size
    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the viewport
    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Set the pixel ratio (clamped to the configured range)
    pub fn dpr(mut self, dpr: f32) -> Self {
        self.dpr = Some(dpr);
        self
    }

    fn affects_render(&self) -> bool {
        self.camera.is_some() || self.size.is_some() || self.viewport.is_some() || self.dpr.is_some()
    }
}

type Listener = Rc<RefCell<dyn FnMut(&StoreState)>>;

/// Called when a frame should be requested from the host
pub(crate) type FrameRequestHook = Rc<dyn Fn()>;

struct StoreInner {
    state: StoreState,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
    notify_pending: bool,
    warned_inactive: bool,
    request_frame: Option<FrameRequestHook>,
}

/// Handle to a root's shared state
#[derive(Clone)]
pub struct Store {
    inner: Rc<RefCell<StoreInner>>,
}

/// Listener registration returned by [`Store::subscribe`]
#[must_use = "dropping the subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct StoreSubscription {
    id: u64,
    store: Weak<RefCell<StoreInner>>,
}

impl StoreSubscription {
    /// Remove the listener
    pub fn unsubscribe(self) {
        if let Some(inner) = self.store.upgrade() {
            inner.borrow_mut().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Store {
    /// Create the store of a freshly mounted root
    pub fn new(config: &RootConfig, scene: NodeId, camera: NodeId, renderer: RendererHandle) -> Self {
        let dpr = config.dpr.clamp(1.0);
        let state = StoreState {
            camera,
            scene,
            renderer,
            size: config.size,
            viewport: Viewport::from_size(&config.size, dpr),
            dpr_range: config.dpr,
            pointer: Vec2::zeros(),
            raycaster: Raycaster::new(),
            controls: None,
            performance: PerformanceState::new(&config.performance),
            frameloop: config.frameloop,
            events: EventsState {
                enabled: config.events.enabled,
                priority: config.events.priority,
                connected: false,
            },
            clock: Clock::new(),
            internal: InternalState {
                active: true,
                ..InternalState::default()
            },
        };
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                state,
                listeners: Vec::new(),
                next_listener: 0,
                notify_pending: false,
                warned_inactive: false,
                request_frame: None,
            })),
        }
    }

    /// Snapshot of the whole state
    pub fn state(&self) -> StoreState {
        self.inner.borrow().state.clone()
    }

    /// Read the state through a closure without cloning it
    pub fn with_state<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.inner.borrow().state)
    }

    /// Active camera node
    pub fn camera(&self) -> NodeId {
        self.with_state(|s| s.camera)
    }

    /// Scene root node
    pub fn scene(&self) -> NodeId {
        self.with_state(|s| s.scene)
    }

    /// Renderer handle
    pub fn renderer(&self) -> RendererHandle {
        self.with_state(|s| s.renderer.clone())
    }

    /// Render loop policy
    pub fn frameloop(&self) -> Frameloop {
        self.with_state(|s| s.frameloop)
    }

    /// Surface size
    pub fn size(&self) -> Size {
        self.with_state(|s| s.size)
    }

    /// Viewport metrics
    pub fn viewport(&self) -> Viewport {
        self.with_state(|s| s.viewport)
    }

    /// Pointer raycaster
    pub fn raycaster(&self) -> Raycaster {
        self.with_state(|s| s.raycaster)
    }

    /// Current performance tier
    pub fn performance(&self) -> PerformanceState {
        self.with_state(|s| s.performance)
    }

    /// Whether the root is still mounted
    pub fn is_active(&self) -> bool {
        self.with_state(|s| s.internal.active)
    }

    /// Whether a render is pending
    pub fn frames(&self) -> u32 {
        self.with_state(|s| s.internal.frames)
    }

    /// Whether native input is processed
    pub fn events_enabled(&self) -> bool {
        self.with_state(|s| s.events.enabled)
    }

    /// Nodes with registered event handlers
    pub fn interaction(&self) -> Vec<NodeId> {
        self.with_state(|s| s.internal.interaction.clone())
    }

    /// Merge a partial state
    ///
    /// Ignored (with a single warning) once the root is torn down.
    pub fn update(&self, patch: StatePatch) {
        let frameloop_changed;
        let invalidate = patch.affects_render();
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.state.internal.active {
                if !inner.warned_inactive {
                    inner.warned_inactive = true;
                    log::warn!("NoOpWarning: update() called on a torn-down root; ignored");
                }
                return;
            }
            let state = &mut inner.state;
            frameloop_changed = patch.frameloop.is_some_and(|f| f != state.frameloop);
            if let Some(frameloop) = patch.frameloop {
                state.frameloop = frameloop;
            }
            if let Some(camera) = patch.camera {
                state.camera = camera;
            }
            if let Some(controls) = patch.controls {
                state.controls = controls;
            }
            if let Some(pointer) = patch.pointer {
                state.pointer = pointer;
            }
            if let Some(raycaster) = patch.raycaster {
                state.raycaster = raycaster;
            }
            if let Some(enabled) = patch.events_enabled {
                state.events.enabled = enabled;
            }
            if let Some(size) = patch.size {
                state.size = size;
                state.viewport.aspect = size.aspect();
            }
            if let Some(viewport) = patch.viewport {
                state.viewport = viewport;
            }
            if let Some(dpr) = patch.dpr {
                state.viewport.dpr = state.dpr_range.clamp(dpr);
            }
            inner.notify_pending = true;
        }

        if frameloop_changed {
            log::debug!("Frameloop changed to {:?}", self.frameloop());
            if self.frameloop() == Frameloop::Always {
                self.request_frame();
            }
        }
        if invalidate {
            self.invalidate();
        }
    }

    /// Register a change listener
    ///
    /// Listeners run from [`Store::flush`], never from inside `update()`.
    pub fn subscribe<F>(&self, listener: F) -> StoreSubscription
    where
        F: FnMut(&StoreState) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.push((id, Rc::new(RefCell::new(listener))));
        StoreSubscription {
            id,
            store: Rc::downgrade(&self.inner),
        }
    }

    /// Deliver pending change notifications
    pub fn flush(&self) {
        let (snapshot, listeners) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.notify_pending {
                return;
            }
            inner.notify_pending = false;
            let listeners: Vec<Listener> = inner.listeners.iter().map(|(_, l)| l.clone()).collect();
            (inner.state.clone(), listeners)
        };
        for listener in listeners {
            (*listener.borrow_mut())(&snapshot);
        }
    }

    /// Mark the next frame dirty
    ///
    /// Any number of calls before the next tick produce one render. No-op
    /// in `never` mode and after teardown.
    pub fn invalidate(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            let state = &mut inner.state;
            if !state.internal.active || state.frameloop == Frameloop::Never {
                return;
            }
            state.internal.frames = 1;
        }
        self.request_frame();
    }

    /// Resize the surface
    ///
    /// The active camera follows the new size unless it is manual, the
    /// viewport is recomputed at the origin, the renderer is resized and
    /// the frame invalidated. Ignored after teardown.
    pub fn set_size(&self, graph: &mut SceneGraph, size: Size) {
        if !self.is_active() {
            self.update(StatePatch::new().size(size));
            return;
        }
        let camera = self.camera();
        fit_camera(graph, camera, &size);
        let viewport = viewport_for(graph, camera, Vec3::zeros(), &size, &self.viewport());
        self.update(StatePatch::new().size(size).viewport(viewport));
        self.renderer().borrow_mut().set_size(size.width, size.height);
    }

    /// Replace the viewport metrics and invalidate
    pub fn set_viewport(&self, viewport: Viewport) {
        self.update(StatePatch::new().viewport(viewport));
    }

    /// Set the device pixel ratio, clamped to the configured range
    pub fn set_dpr(&self, dpr: f32) {
        self.update(StatePatch::new().dpr(dpr));
        if self.is_active() {
            let dpr = self.viewport().dpr;
            self.renderer().borrow_mut().set_pixel_ratio(dpr);
        }
    }

    /// Lower the performance tier for a debounce window
    pub fn regress(&self) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let state = &mut inner.state;
            if !state.internal.active {
                return;
            }
            let was = state.performance.current;
            state.performance.regress();
            inner.notify_pending = true;
            was != inner.state.performance.current
        };
        if changed {
            log::debug!("Performance regressed to {}", self.performance().current);
        }
        self.invalidate();
    }

    pub(crate) fn set_request_hook(&self, hook: FrameRequestHook) {
        self.inner.borrow_mut().request_frame = Some(hook);
    }

    fn request_frame(&self) {
        let hook = {
            let inner = self.inner.borrow();
            let state = &inner.state;
            if !state.internal.active || state.frameloop == Frameloop::Never {
                return;
            }
            inner.request_frame.clone()
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Advance the clock; returns the delta in seconds
    pub(crate) fn tick_clock(&self, now_ms: f64) -> f32 {
        self.inner.borrow_mut().state.clock.tick(now_ms)
    }

    /// Recover the performance tier if due; recovering marks a frame dirty
    pub(crate) fn poll_performance(&self) -> bool {
        let recovered = {
            let mut inner = self.inner.borrow_mut();
            let now = inner.state.clock.now_ms();
            let recovered = inner.state.performance.poll(now);
            if recovered {
                inner.notify_pending = true;
                if inner.state.frameloop != Frameloop::Never {
                    inner.state.internal.frames = 1;
                }
            }
            recovered
        };
        if recovered {
            log::debug!("Performance recovered to {}", self.performance().current);
        }
        recovered
    }

    /// Clear the pending render flag before a render
    pub(crate) fn consume_frame(&self) {
        self.inner.borrow_mut().state.internal.frames = 0;
    }

    pub(crate) fn adjust_priority(&self, delta: i32) {
        let mut inner = self.inner.borrow_mut();
        let internal = &mut inner.state.internal;
        internal.priority = internal.priority.saturating_add_signed(delta);
    }

    pub(crate) fn priority(&self) -> u32 {
        self.with_state(|s| s.internal.priority)
    }

    /// Track whether `node` has handlers
    pub(crate) fn set_interactive(&self, node: NodeId, interactive: bool) {
        let mut inner = self.inner.borrow_mut();
        let list = &mut inner.state.internal.interaction;
        let present = list.contains(&node);
        if interactive && !present {
            list.push(node);
        } else if !interactive && present {
            list.retain(|n| *n != node);
        }
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.state.events.connected = connected;
        inner.notify_pending = true;
    }

    /// Record the pointer position and ray computed for a native event
    pub(crate) fn set_pointer_ray(&self, pointer: Vec2, raycaster: Raycaster) {
        let mut inner = self.inner.borrow_mut();
        inner.state.pointer = pointer;
        inner.state.raycaster = raycaster;
    }

    /// Deactivate the store: listeners are dropped and later writes ignored
    pub(crate) fn teardown(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.state.internal.active = false;
        inner.state.internal.frames = 0;
        inner.state.internal.interaction.clear();
        inner.state.clock.stop();
        inner.listeners.clear();
        inner.notify_pending = false;
        inner.request_frame = None;
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Store").field(&self.inner.borrow().state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::engine::{EngineObject, PerspectiveCamera};
    use crate::foundation::collections::RootId;
    use crate::render::HeadlessRenderer;
    use crate::scene::{NodeBody, NodeLocalState};
    use approx::assert_relative_eq;
    use std::cell::Cell;

    fn store_with(config: &RootConfig) -> (Store, Rc<RefCell<HeadlessRenderer>>) {
        let mut ids = SlotMap::<NodeId, ()>::with_key();
        let scene = ids.insert(());
        let camera = ids.insert(());
        let renderer = HeadlessRenderer::shared();
        (Store::new(config, scene, camera, renderer.clone()), renderer)
    }

    #[test]
    fn test_notifications_are_deferred_until_flush() {
        let (store, _) = store_with(&RootConfig::default());
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let _sub = store.subscribe(move |state| {
            assert_eq!(state.pointer, Vec2::new(0.5, 0.5));
            counter.set(counter.get() + 1);
        });
        store.update(StatePatch::new().pointer(Vec2::new(0.25, 0.25)));
        store.update(StatePatch::new().pointer(Vec2::new(0.5, 0.5)));
        assert_eq!(seen.get(), 0);
        // Reads are synchronous
        assert_eq!(store.state().pointer, Vec2::new(0.5, 0.5));
        store.flush();
        store.flush();
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_unsubscribed_listener_is_not_called() {
        let (store, _) = store_with(&RootConfig::default());
        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        let sub = store.subscribe(move |_| flag.set(true));
        sub.unsubscribe();
        store.update(StatePatch::new().events_enabled(false));
        store.flush();
        assert!(!seen.get());
    }

    #[test]
    fn test_invalidate_coalesces_and_calls_hook() {
        let (store, _) = store_with(&RootConfig::default().with_frameloop(Frameloop::Demand));
        let requests = Rc::new(Cell::new(0));
        let counter = requests.clone();
        store.set_request_hook(Rc::new(move || counter.set(counter.get() + 1)));
        store.invalidate();
        store.invalidate();
        assert_eq!(store.frames(), 1);
        assert_eq!(requests.get(), 2);
    }

    #[test]
    fn test_invalidate_is_noop_in_never_mode() {
        let (store, _) = store_with(&RootConfig::default().with_frameloop(Frameloop::Never));
        store.invalidate();
        assert_eq!(store.frames(), 0);
    }

    #[test]
    fn test_dpr_is_clamped_and_forwarded() {
        let (store, renderer) = store_with(&RootConfig::default().with_dpr(1.0, 1.5));
        store.set_dpr(3.0);
        assert_eq!(store.viewport().dpr, 1.5);
        assert_eq!(renderer.borrow().pixel_ratio(), 1.5);
    }

    #[test]
    fn test_set_size_recomputes_camera_and_viewport() {
        let mut graph = SceneGraph::new();
        let scene = graph.insert(
            NodeBody::Object(Box::new(EngineObject::scene())),
            NodeLocalState::new("scene", Vec::new(), RootId(0)),
        );
        let camera = graph.insert(
            NodeBody::Object(Box::new(PerspectiveCamera::default())),
            NodeLocalState::new("camera", Vec::new(), RootId(0)),
        );
        let renderer = HeadlessRenderer::shared();
        let config = RootConfig::default().with_frameloop(Frameloop::Demand);
        let store = Store::new(&config, scene, camera, renderer.clone());

        let size = Size::new(400.0, 100.0);
        store.set_size(&mut graph, size);
        let expected = viewport_for(&graph, camera, Vec3::zeros(), &size, &store.viewport());
        let viewport = store.viewport();
        assert_eq!(viewport.aspect, 4.0);
        assert_relative_eq!(viewport.width, expected.width);
        assert_relative_eq!(viewport.factor, expected.factor);
        assert_relative_eq!(viewport.width, viewport.height * 4.0, epsilon = 1e-4);
        assert_eq!(graph.downcast::<PerspectiveCamera>(camera).map(|c| c.aspect), Some(4.0));
        assert_eq!(renderer.borrow().size(), (400.0, 100.0));
        assert_eq!(store.frames(), 1);
    }

    #[test]
    fn test_update_after_teardown_is_ignored() {
        let (store, _) = store_with(&RootConfig::default());
        store.teardown();
        store.update(StatePatch::new().pointer(Vec2::new(1.0, 1.0)));
        store.update(StatePatch::new().pointer(Vec2::new(1.0, 1.0)));
        assert_eq!(store.state().pointer, Vec2::zeros());
        store.invalidate();
        assert_eq!(store.frames(), 0);
    }

    #[test]
    fn test_regress_then_recover_marks_frame_dirty() {
        let (store, _) = store_with(&RootConfig::default().with_frameloop(Frameloop::Demand));
        store.tick_clock(0.0);
        store.regress();
        assert_eq!(store.performance().current, 0.5);
        store.tick_clock(250.0);
        assert!(!store.poll_performance());
        store.tick_clock(450.0);
        assert!(store.poll_performance());
        assert_eq!(store.performance().current, 1.0);
        assert_eq!(store.frames(), 1);
    }
}
