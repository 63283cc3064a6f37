//! # Root
//!
//! One mounted scene: store, reconciler, scheduler and event dispatcher
//! wired together around a scene node and a default camera.
//!
//! ## Lifecycle
//!
//! ```text
//! Root::new ──► render(elements) ──► frame(ts) / advance(ts) ──► unmount()
//!                     ▲                     │
//!                     └──── invalidate ◄────┘
//! ```
//!
//! After `unmount()` every operation returns [`RootError::Unmounted`].

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

use crate::catalogue::Catalogue;
use crate::config::ConfigError;
use crate::core::{CameraConfig, Frameloop, RootConfig, Size};
use crate::engine::{EngineObject, OrthographicCamera, PerspectiveCamera, SceneObject};
use crate::events::{
    ComputeFn, DispatchResult, EventDispatcher, EventTarget, FilterFn, MissedFn, NativePointerEvent,
};
use crate::foundation::collections::{NodeId, PointerId, RootId};
use crate::foundation::math::Vec3;
use crate::reconciler::{Element, Reconciler, ReconcilerError, TreeMount};
use crate::render::RendererHandle;
use crate::scene::{NodeBody, NodeLocalState, SceneGraph};
use crate::scheduler::{FrameContext, FrameHost, FrameSubscription, Scheduler, SchedulerPhase};
use crate::store::{viewport_for, StatePatch, Store, Viewport};

/// Root-level failures
#[derive(Error, Debug)]
pub enum RootError {
    /// A reconciler operation failed
    #[error(transparent)]
    Reconciler(#[from] ReconcilerError),

    /// The root was unmounted
    #[error("root is unmounted")]
    Unmounted,

    /// The configuration was rejected
    #[error("invalid root configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for root operations
pub type RootResult<T> = Result<T, RootError>;

thread_local! {
    static NEXT_ROOT: Cell<u32> = const { Cell::new(1) };
}

fn next_root_id() -> RootId {
    NEXT_ROOT.with(|next| {
        let id = next.get();
        next.set(id.wrapping_add(1));
        RootId(id)
    })
}

fn default_camera(config: &CameraConfig, size: &Size) -> Box<dyn SceneObject> {
    let position = Vec3::from(config.position);
    if config.orthographic {
        let mut camera = OrthographicCamera {
            near: config.near,
            far: config.far,
            zoom: config.zoom,
            position,
            manual: config.manual,
            ..OrthographicCamera::default()
        };
        if !config.manual {
            camera.fit_to(size.width, size.height);
        }
        Box::new(camera)
    } else {
        let mut camera = PerspectiveCamera::new(config.fov, size.aspect(), config.near, config.far);
        camera.position = position;
        camera.zoom = config.zoom;
        camera.manual = config.manual;
        Box::new(camera)
    }
}

/// A mounted scene
pub struct Root {
    id: RootId,
    config: RootConfig,
    store: Store,
    reconciler: Reconciler,
    scheduler: Scheduler,
    dispatcher: EventDispatcher,
    tree: TreeMount,
    unmounted: bool,
}

impl Root {
    /// Create a root drawing with `renderer` and paced by `host`
    ///
    /// The configuration is validated first. Tags are resolved through
    /// `catalogue`; pass [`Catalogue::global`] to share registrations.
    pub fn new(
        config: RootConfig,
        catalogue: Catalogue,
        renderer: RendererHandle,
        host: Rc<dyn FrameHost>,
    ) -> RootResult<Self> {
        config.validate()?;
        let id = next_root_id();

        let mut graph = SceneGraph::new();
        let scene = graph.insert(
            NodeBody::Object(Box::new(EngineObject::scene())),
            NodeLocalState::new("scene", Vec::new(), id),
        );
        let camera = graph.insert(
            NodeBody::Object(default_camera(&config.camera, &config.size)),
            NodeLocalState::new("camera", Vec::new(), id),
        );

        let store = Store::new(&config, scene, camera, renderer.clone());
        {
            let viewport = store.viewport();
            let mut renderer = renderer.borrow_mut();
            renderer.set_size(config.size.width, config.size.height);
            renderer.set_pixel_ratio(viewport.dpr);
        }
        let scheduler = Scheduler::new(store.clone(), host, id);
        let dispatcher = EventDispatcher::new(store.clone());
        let reconciler = Reconciler::new(graph, catalogue, store.clone(), id);

        let viewport = viewport_for(reconciler.graph(), camera, Vec3::zeros(), &config.size, &store.viewport());
        store.set_viewport(viewport);
        store.flush();
        scheduler.request_frame();

        log::info!(
            "Root {:?} created ({:?}, {}x{})",
            id,
            config.frameloop,
            config.size.width,
            config.size.height
        );
        Ok(Self {
            id,
            config,
            store,
            reconciler,
            scheduler,
            dispatcher,
            tree: TreeMount::new(scene),
            unmounted: false,
        })
    }

    fn ensure_mounted(&self) -> RootResult<()> {
        if self.unmounted {
            Err(RootError::Unmounted)
        } else {
            Ok(())
        }
    }

    /// Identifier handed to the frame host
    pub fn id(&self) -> RootId {
        self.id
    }

    /// Configuration the root was created with
    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    /// Whether `unmount` has run
    pub fn is_unmounted(&self) -> bool {
        self.unmounted
    }

    /// Shared state handle
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Reconciler of this root
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Mutable reconciler, for imperative node management
    pub fn reconciler_mut(&mut self) -> &mut Reconciler {
        &mut self.reconciler
    }

    /// Scene root node
    pub fn scene(&self) -> NodeId {
        self.store.scene()
    }

    /// Active camera node
    pub fn camera(&self) -> NodeId {
        self.store.camera()
    }

    /// Scheduler phase
    pub fn phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    /// Engine object of a node
    pub fn object(&self, node: NodeId) -> Option<&dyn SceneObject> {
        self.reconciler.object(node)
    }

    /// Mutable engine object of a node
    pub fn object_mut(&mut self, node: NodeId) -> Option<&mut dyn SceneObject> {
        self.reconciler.object_mut(node)
    }

    /// Typed handle to a node's engine object
    pub fn downcast<T: SceneObject>(&self, node: NodeId) -> Option<&T> {
        self.reconciler.downcast(node)
    }

    /// Mutable typed handle to a node's engine object
    pub fn downcast_mut<T: SceneObject>(&mut self, node: NodeId) -> Option<&mut T> {
        self.reconciler.downcast_mut(node)
    }

    /// Reconcile the scene's children against `elements`
    pub fn render(&mut self, elements: Vec<Element>) -> RootResult<()> {
        self.ensure_mounted()?;
        self.tree.render(&mut self.reconciler, elements)?;
        Ok(())
    }

    /// Host animation-frame callback; returns whether a frame was drawn
    pub fn frame(&mut self, timestamp_ms: f64) -> RootResult<bool> {
        self.ensure_mounted()?;
        Ok(self.scheduler.tick(&mut self.reconciler, timestamp_ms, true))
    }

    /// Run one tick regardless of the frameloop mode
    pub fn advance(&mut self, timestamp_ms: f64) -> RootResult<bool> {
        self.ensure_mounted()?;
        Ok(self.scheduler.tick(&mut self.reconciler, timestamp_ms, false))
    }

    /// Request a render
    pub fn invalidate(&self) -> RootResult<()> {
        self.ensure_mounted()?;
        self.store.invalidate();
        Ok(())
    }

    /// Switch the render loop policy
    pub fn set_frameloop(&mut self, frameloop: Frameloop) -> RootResult<()> {
        self.ensure_mounted()?;
        self.store.update(StatePatch::new().frameloop(frameloop));
        Ok(())
    }

    /// Resize the surface
    ///
    /// The default camera follows the new aspect unless it is manual.
    pub fn set_size(&mut self, width: f32, height: f32) -> RootResult<()> {
        self.ensure_mounted()?;
        let size = Size {
            width,
            height,
            ..self.store.size()
        };
        self.store.set_size(self.reconciler.graph_mut(), size);
        Ok(())
    }

    /// Set the device pixel ratio (clamped to the configured range)
    pub fn set_dpr(&mut self, dpr: f32) -> RootResult<()> {
        self.ensure_mounted()?;
        self.store.set_dpr(dpr);
        Ok(())
    }

    /// Viewport metrics for `camera` at `target`
    pub fn viewport_for(&self, camera: NodeId, target: Vec3) -> Viewport {
        let size = self.store.size();
        viewport_for(self.reconciler.graph(), camera, target, &size, &self.store.viewport())
    }

    /// Register a pre-render callback that leaves the default render in place
    pub fn on_frame<F>(&self, callback: F) -> RootResult<FrameSubscription>
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.use_frame(callback, 0)
    }

    /// Register a post-render callback at the default priority
    pub fn on_after_frame<F>(&self, callback: F) -> RootResult<FrameSubscription>
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.use_after_frame(callback, 0)
    }

    /// Register a pre-render callback
    ///
    /// A non-zero priority takes over the default render.
    pub fn use_frame<F>(&self, callback: F, priority: i32) -> RootResult<FrameSubscription>
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.ensure_mounted()?;
        Ok(self.scheduler.use_frame(callback, priority))
    }

    /// Register a post-render callback
    pub fn use_after_frame<F>(&self, callback: F, priority: i32) -> RootResult<FrameSubscription>
    where
        F: FnMut(&mut FrameContext<'_>, f32) + 'static,
    {
        self.ensure_mounted()?;
        Ok(self.scheduler.use_after_frame(callback, priority))
    }

    /// Bind the dispatcher to an input surface
    pub fn connect(&mut self, target: Box<dyn EventTarget>) -> RootResult<()> {
        self.ensure_mounted()?;
        self.dispatcher.connect(target);
        Ok(())
    }

    /// Unbind the input surface
    pub fn disconnect(&mut self) {
        self.dispatcher.disconnect();
    }

    /// Dispatch one native event from the connected surface
    pub fn handle_native_event(&mut self, native: &NativePointerEvent) -> RootResult<DispatchResult> {
        self.ensure_mounted()?;
        Ok(self.dispatcher.handle(&mut self.reconciler, native))
    }

    /// Replace the pointer-to-ray mapping
    pub fn set_compute(&mut self, compute: Option<ComputeFn>) {
        self.dispatcher.set_compute(compute);
    }

    /// Install an intersection filter
    pub fn set_filter(&mut self, filter: Option<FilterFn>) {
        self.dispatcher.set_filter(filter);
    }

    /// Install the root-level pointer-missed callback
    pub fn on_pointer_missed(&mut self, callback: Option<MissedFn>) {
        self.dispatcher.on_pointer_missed(callback);
    }

    /// Nodes currently hovered by `pointer_id`
    pub fn hovered(&self, pointer_id: PointerId) -> Vec<NodeId> {
        self.dispatcher.hovered(pointer_id)
    }

    /// Tear the root down
    ///
    /// The pending frame is cancelled, subscriptions dropped, listeners
    /// unbound, every node removed with full teardown, the renderer
    /// disposed and the store deactivated. Calling it twice is a no-op.
    pub fn unmount(&mut self) {
        if self.unmounted {
            return;
        }
        self.scheduler.cancel();
        self.dispatcher.disconnect();
        self.tree.unmount(&mut self.reconciler);

        let scene = self.store.scene();
        let camera = self.store.camera();
        let leftovers = self
            .reconciler
            .graph()
            .local(scene)
            .map(|l| l.children.clone())
            .unwrap_or_default();
        for node in leftovers.into_iter().chain([scene, camera]) {
            if self.reconciler.graph().contains(node) {
                if let Err(e) = self.reconciler.remove_node(None, node) {
                    log::warn!("Failed to remove {:?} during unmount: {}", node, e);
                }
            }
        }

        self.store.renderer().borrow_mut().dispose();
        self.store.teardown();
        self.unmounted = true;
        log::info!("Root {:?} unmounted ({} nodes left)", self.id, self.reconciler.graph().len());
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        self.unmount();
    }
}
