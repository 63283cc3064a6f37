//! # Render Scheduler
//!
//! Owns the frame loop of one root. Each tick runs the pre-render
//! subscriptions in ascending priority order (ties in registration order),
//! performs the default render unless a non-zero-priority subscription has
//! taken it over, then runs the post-render subscriptions.
//!
//! ## Phases
//!
//! `Idle → FrameRequested → Rendering → Idle`. A frame is requested from
//! the [`FrameHost`] only while idle, so any number of `invalidate()` calls
//! between two ticks result in one request and one render.

mod frame_host;
mod subscriptions;

pub use frame_host::{FrameHost, FrameRequestId, ManualFrameHost};
pub use subscriptions::{FrameCallback, FrameSubscription, Stage};

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::Frameloop;
use crate::foundation::collections::RootId;
use crate::reconciler::Reconciler;
use crate::scene::SceneGraph;
use crate::store::{Store, StoreState};

use subscriptions::Registry;

/// Scheduler state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerPhase {
    /// Nothing pending
    Idle,
    /// Waiting for the host's animation frame
    FrameRequested,
    /// Inside a tick
    Rendering,
}

struct FrameLoop {
    phase: SchedulerPhase,
    pending: Option<FrameRequestId>,
    host: Rc<dyn FrameHost>,
    root: RootId,
    cancelled: bool,
}

impl FrameLoop {
    fn request(&mut self) {
        if self.cancelled || self.phase != SchedulerPhase::Idle {
            return;
        }
        let id = self.host.request_animation_frame(self.root);
        log::trace!("Root {:?} requested frame {:?}", self.root, id);
        self.pending = Some(id);
        self.phase = SchedulerPhase::FrameRequested;
    }

    fn settle(&mut self) {
        self.phase = if self.pending.is_some() {
            SchedulerPhase::FrameRequested
        } else {
            SchedulerPhase::Idle
        };
    }
}

/// Context handed to frame callbacks
pub struct FrameContext<'a> {
    reconciler: &'a mut Reconciler,
    store: &'a Store,
    delta: f32,
    timestamp: f64,
    rendered: bool,
}

impl<'a> FrameContext<'a> {
    /// Snapshot of the store
    pub fn state(&self) -> StoreState {
        self.store.state()
    }

    /// Store handle
    pub fn store(&self) -> &Store {
        self.store
    }

    /// Seconds since the previous tick
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Host timestamp of this tick in milliseconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Scene graph (read-only)
    pub fn graph(&self) -> &SceneGraph {
        self.reconciler.graph()
    }

    /// Reconciler, for mutating the scene from a callback
    pub fn reconciler(&mut self) -> &mut Reconciler {
        self.reconciler
    }

    /// Request another frame
    pub fn invalidate(&self) {
        self.store.invalidate();
    }

    /// Whether the scene was drawn in this tick so far
    pub fn rendered(&self) -> bool {
        self.rendered
    }

    /// Draw the scene with the active camera
    ///
    /// Custom pipelines registered with a non-zero priority call this (or
    /// their own renderer) themselves. Failures are logged.
    pub fn render_default(&mut self) -> bool {
        let (renderer, scene, camera) = self.store.with_state(|s| (s.renderer.clone(), s.scene, s.camera));
        let result = renderer.borrow_mut().render(self.reconciler.graph(), scene, camera);
        match result {
            Ok(()) => {
                self.rendered = true;
                true
            }
            Err(e) => {
                log::error!("Render failed: {}", e);
                false
            }
        }
    }
}

/// Frame loop and subscriptions of one root
pub struct Scheduler {
    store: Store,
    frame_loop: Rc<RefCell<FrameLoop>>,
    registry: Rc<RefCell<Registry>>,
}

impl Scheduler {
    /// Create the scheduler and hook it to the store's invalidation
    pub fn new(store: Store, host: Rc<dyn FrameHost>, root: RootId) -> Self {
        let frame_loop = Rc::new(RefCell::new(FrameLoop {
            phase: SchedulerPhase::Idle,
            pending: None,
            host,
            root,
            cancelled: false,
        }));
        let weak = Rc::downgrade(&frame_loop);
        store.set_request_hook(Rc::new(move || {
            if let Some(frame_loop) = weak.upgrade() {
                frame_loop.borrow_mut().request();
            }
        }));
        let registry = Rc::new(RefCell::new(Registry::new(store.clone())));
        Self {
            store,
            frame_loop,
            registry,
        }
    }

    /// Current phase
    pub fn phase(&self) -> SchedulerPhase {
        self.frame_loop.borrow().phase
    }

    /// Ask the host for a frame if idle and the mode allows it
    pub fn request_frame(&self) {
        if self.store.is_active() && self.store.frameloop() != Frameloop::Never {
            self.frame_loop.borrow_mut().request();
        }
    }

    /// Register a pre-render callback at the default priority
    pub fn on_frame<F>(&self, callback: F) -> FrameSubscription
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.use_frame(callback, 0)
    }

    /// Register a post-render callback at the default priority
    pub fn on_after_frame<F>(&self, callback: F) -> FrameSubscription
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.use_after_frame(callback, 0)
    }

    /// Register a pre-render callback
    pub fn use_frame<F>(&self, callback: F, priority: i32) -> FrameSubscription
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.subscribe(Stage::Before, priority, Rc::new(RefCell::new(callback)))
    }

    /// Register a post-render callback
    pub fn use_after_frame<F>(&self, callback: F, priority: i32) -> FrameSubscription
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.subscribe(Stage::After, priority, Rc::new(RefCell::new(callback)))
    }

    /// Register a callback for a stage
    pub fn subscribe(&self, stage: Stage, priority: i32, callback: FrameCallback) -> FrameSubscription {
        let id = self.registry.borrow_mut().insert(stage, priority, callback);
        log::debug!("Frame subscription {} added ({:?}, priority {})", id, stage, priority);
        FrameSubscription::new(id, &self.registry)
    }

    /// Number of registered callbacks
    pub fn subscription_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Run one tick
    ///
    /// `scheduled` ticks come from the host's animation frame and follow
    /// the frameloop mode; manual ticks (`advance`) always render. Returns
    /// whether a frame was rendered.
    pub fn tick(&self, reconciler: &mut Reconciler, timestamp: f64, scheduled: bool) -> bool {
        if !self.store.is_active() {
            return false;
        }
        {
            let mut frame_loop = self.frame_loop.borrow_mut();
            if frame_loop.cancelled {
                return false;
            }
            if scheduled {
                frame_loop.pending = None;
            }
            frame_loop.phase = SchedulerPhase::Rendering;
        }

        self.store.flush();
        let delta = self.store.tick_clock(timestamp);
        self.store.poll_performance();

        let mode = self.store.frameloop();
        let render = !scheduled
            || match mode {
                Frameloop::Always => true,
                Frameloop::Demand => self.store.frames() > 0,
                Frameloop::Never => false,
            };
        if render {
            self.store.consume_frame();
            self.run_frame(reconciler, delta, timestamp);
        }
        self.store.flush();

        self.frame_loop.borrow_mut().settle();
        if self.store.is_active() {
            let again = match self.store.frameloop() {
                Frameloop::Always => true,
                Frameloop::Demand => self.store.frames() > 0 || self.store.performance().is_regressed(),
                Frameloop::Never => false,
            };
            if again {
                self.frame_loop.borrow_mut().request();
            }
        }
        render
    }

    fn run_frame(&self, reconciler: &mut Reconciler, delta: f32, timestamp: f64) {
        let mut ctx = FrameContext {
            reconciler,
            store: &self.store,
            delta,
            timestamp,
            rendered: false,
        };

        self.run_stage(Stage::Before, &mut ctx, delta);
        if self.store.priority() == 0 {
            ctx.render_default();
        }
        self.run_stage(Stage::After, &mut ctx, delta);
    }

    fn run_stage(&self, stage: Stage, ctx: &mut FrameContext<'_>, delta: f32) {
        let callbacks = self.registry.borrow().snapshot(stage);
        for (id, callback) in callbacks {
            if !self.registry.borrow().contains(id) {
                continue;
            }
            (*callback.borrow_mut())(&mut *ctx, delta);
        }
    }

    /// Cancel the pending frame and drop every subscription
    ///
    /// No tick runs afterwards.
    pub fn cancel(&self) {
        {
            let mut frame_loop = self.frame_loop.borrow_mut();
            frame_loop.cancelled = true;
            if let Some(id) = frame_loop.pending.take() {
                frame_loop.host.cancel_animation_frame(id);
            }
            frame_loop.phase = SchedulerPhase::Idle;
        }
        self.registry.borrow_mut().clear();
        log::debug!("Scheduler cancelled");
    }
}
