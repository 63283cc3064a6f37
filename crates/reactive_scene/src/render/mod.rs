//! Renderer abstraction
//!
//! The runtime never draws anything itself. The scheduler hands the scene
//! graph, the scene node and the active camera to whatever [`Renderer`]
//! the root was created with; engine bindings implement the trait on top
//! of their own backend.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::engine::PropValue;
use crate::foundation::collections::NodeId;
use crate::scene::SceneGraph;

/// Errors reported by a renderer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The scene or camera node is missing from the graph
    #[error("render target {0:?} is not in the scene graph")]
    MissingNode(NodeId),

    /// The renderer was disposed
    #[error("renderer has been disposed")]
    Disposed,

    /// Backend specific failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Draws a scene graph
pub trait Renderer {
    /// Clear the surface and draw `scene` as seen from `camera`
    fn render(&mut self, graph: &SceneGraph, scene: NodeId, camera: NodeId) -> RenderResult<()>;

    /// Resize the drawing surface (CSS pixels)
    fn set_size(&mut self, width: f32, height: f32);

    /// Set the device pixel ratio
    fn set_pixel_ratio(&mut self, ratio: f32);

    /// Release backend resources
    fn dispose(&mut self) {}
}

/// Shared renderer handle kept in the store
pub type RendererHandle = Rc<RefCell<dyn Renderer>>;

/// Renderer that draws nothing and records what it was asked to do
///
/// Used by tests and by headless hosts; each frame's draw list is the set
/// of visible nodes reachable from the scene.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames: u64,
    draw_list: Vec<NodeId>,
    last_camera: Option<NodeId>,
    size: (f32, f32),
    pixel_ratio: f32,
    disposed: bool,
}

impl HeadlessRenderer {
    /// Create a headless renderer
    pub fn new() -> Self {
        Self {
            pixel_ratio: 1.0,
            ..Self::default()
        }
    }

    /// Create a headless renderer wrapped in a shared handle
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Number of frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Nodes drawn in the last frame, in traversal order
    pub fn draw_list(&self) -> &[NodeId] {
        &self.draw_list
    }

    /// Camera used for the last frame
    pub fn last_camera(&self) -> Option<NodeId> {
        self.last_camera
    }

    /// Current surface size
    pub fn size(&self) -> (f32, f32) {
        self.size
    }

    /// Current pixel ratio
    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Whether `dispose` was called
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, graph: &SceneGraph, scene: NodeId, camera: NodeId) -> RenderResult<()> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        if !graph.contains(scene) {
            return Err(RenderError::MissingNode(scene));
        }
        if !graph.contains(camera) {
            return Err(RenderError::MissingNode(camera));
        }

        // Hidden nodes prune their whole subtree
        self.draw_list.clear();
        let mut stack = vec![scene];
        while let Some(id) = stack.pop() {
            let Some(node) = graph.get(id) else { continue };
            let visible = node
                .object()
                .and_then(|o| o.property("visible"))
                .map_or(true, |v| v != PropValue::Bool(false));
            if !visible {
                continue;
            }
            self.draw_list.push(id);
            stack.extend(node.engine_children().iter().rev().copied());
        }

        self.frames += 1;
        self.last_camera = Some(camera);
        log::trace!("Headless frame {}: {} nodes", self.frames, self.draw_list.len());
        Ok(())
    }

    fn set_size(&mut self, width: f32, height: f32) {
        self.size = (width, height);
    }

    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio;
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}
