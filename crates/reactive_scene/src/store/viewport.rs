//! Viewport metrics derived from the surface size and the camera

use crate::core::Size;
use crate::engine::{CameraKind, OrthographicCamera, PerspectiveCamera};
use crate::foundation::collections::NodeId;
use crate::foundation::math::Vec3;
use crate::scene::SceneGraph;

/// Visible extent of the scene at a given distance from the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Visible width in world units
    pub width: f32,
    /// Visible height in world units
    pub height: f32,
    /// Pixel ratio at mount time
    pub initial_dpr: f32,
    /// Current (clamped) pixel ratio
    pub dpr: f32,
    /// Pixels per world unit
    pub factor: f32,
    /// Camera distance the extent was measured at
    pub distance: f32,
    /// Surface aspect ratio
    pub aspect: f32,
}

impl Viewport {
    /// Pixel-space viewport used before a camera is known
    pub fn from_size(size: &Size, dpr: f32) -> Self {
        Self {
            width: size.width,
            height: size.height,
            initial_dpr: dpr,
            dpr,
            factor: 1.0,
            distance: 0.0,
            aspect: size.aspect(),
        }
    }

    /// Surface width in device pixels
    pub fn device_width(&self, size: &Size) -> f32 {
        size.width * self.dpr
    }

    /// Surface height in device pixels
    pub fn device_height(&self, size: &Size) -> f32 {
        size.height * self.dpr
    }
}

/// Fit a non-manual camera to a new surface size
///
/// Perspective cameras take the surface aspect; orthographic cameras are
/// framed to the surface in pixels.
pub fn fit_camera(graph: &mut SceneGraph, camera: NodeId, size: &Size) {
    if let Some(perspective) = graph.downcast_mut::<PerspectiveCamera>(camera) {
        if !perspective.manual {
            perspective.aspect = size.aspect();
        }
    } else if let Some(orthographic) = graph.downcast_mut::<OrthographicCamera>(camera) {
        if !orthographic.manual {
            orthographic.fit_to(size.width, size.height);
        }
    }
}

/// Compute the viewport of `camera` measured at `target`
///
/// Perspective cameras yield the frustum slice at the camera-target
/// distance; orthographic cameras yield the surface size divided by zoom.
/// A node without a camera falls back to the pixel-space viewport.
pub fn viewport_for(
    graph: &SceneGraph,
    camera: NodeId,
    target: Vec3,
    size: &Size,
    previous: &Viewport,
) -> Viewport {
    let aspect = size.aspect();
    let distance = (graph.world_position(camera) - target).norm();
    let base = Viewport {
        distance,
        aspect,
        ..*previous
    };
    match graph.object(camera).and_then(|o| o.camera_kind()) {
        Some(CameraKind::Perspective { fov }) => {
            let height = 2.0 * (fov.to_radians() / 2.0).tan() * distance;
            let width = height * aspect;
            let factor = if width > 0.0 { size.width / width } else { 1.0 };
            Viewport { width, height, factor, ..base }
        }
        Some(CameraKind::Orthographic { zoom }) => {
            let zoom = zoom.max(f32::EPSILON);
            Viewport {
                width: size.width / zoom,
                height: size.height / zoom,
                factor: 1.0,
                ..base
            }
        }
        None => Viewport {
            width: size.width,
            height: size.height,
            factor: 1.0,
            ..base
        },
    }
}
