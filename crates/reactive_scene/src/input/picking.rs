//! Pointer picking
//!
//! Converts surface-space pointer coordinates to Normalized Device
//! Coordinates (NDC) and unprojects them through the active camera into a
//! world-space ray.

use crate::core::Size;
use crate::foundation::collections::NodeId;
use crate::foundation::math::{Mat4, Point3, Ray, Vec2, Vec3, Vec4};
use crate::engine::CameraKind;
use crate::scene::{RaycastHit, SceneGraph};

/// Convert surface coordinates (pixels from the top-left corner) to NDC
///
/// NDC range: [-1, 1] where:
/// - X: -1 = left, +1 = right
/// - Y: -1 = bottom, +1 = top
///
/// A degenerate surface maps everything to the center.
pub fn surface_to_ndc(offset_x: f32, offset_y: f32, size: &Size) -> Vec2 {
    if size.width <= 0.0 || size.height <= 0.0 {
        return Vec2::zeros();
    }
    Vec2::new(
        (offset_x / size.width) * 2.0 - 1.0,
        -(offset_y / size.height) * 2.0 + 1.0,
    )
}

/// Ray caster driven by the pointer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Raycaster {
    /// Current world-space ray
    pub ray: Ray,
    /// Hits closer than this are ignored
    pub near: f32,
    /// Hits farther than this are ignored
    pub far: f32,
    /// Disabled raycasters produce no hits
    pub enabled: bool,
}

impl Default for Raycaster {
    fn default() -> Self {
        Self {
            ray: Ray::default(),
            near: 0.0,
            far: f32::INFINITY,
            enabled: true,
        }
    }
}

impl Raycaster {
    /// Create an enabled raycaster with an unbounded range
    pub fn new() -> Self {
        Self::default()
    }

    /// Aim the ray from `camera` through the NDC position `ndc`
    ///
    /// Perspective rays start at the camera; orthographic rays start on the
    /// near plane and run along the view direction. Returns `false` (ray
    /// unchanged) when the node is not a camera or its matrices are singular.
    pub fn set_from_camera(&mut self, ndc: Vec2, graph: &SceneGraph, camera: NodeId) -> bool {
        let Some(object) = graph.object(camera) else {
            return false;
        };
        let (Some(kind), Some(projection)) = (object.camera_kind(), object.projection_matrix()) else {
            log::warn!("Node {:?} is not a camera; pointer ray not updated", camera);
            return false;
        };

        let world = graph.world_matrix(camera);
        let Some(view) = world.try_inverse() else {
            return false;
        };
        let Some(inverse_view_projection) = (projection * view).try_inverse() else {
            return false;
        };

        let near_point = unproject(&inverse_view_projection, ndc, -1.0);
        let far_point = unproject(&inverse_view_projection, ndc, 1.0);
        self.ray = match kind {
            CameraKind::Perspective { .. } => {
                let origin = world.transform_point(&Point3::origin()).coords;
                Ray::new(origin, far_point - origin)
            }
            CameraKind::Orthographic { .. } => Ray::new(near_point, far_point - near_point),
        };
        true
    }

    /// Intersect the current ray with the engine tree below `root`
    ///
    /// Hits are sorted nearest first and limited to `near..=far`.
    pub fn intersect(&self, graph: &SceneGraph, root: NodeId) -> Vec<RaycastHit> {
        if !self.enabled {
            return Vec::new();
        }
        let mut hits = graph.raycast(root, &self.ray);
        hits.retain(|hit| hit.distance >= self.near && hit.distance <= self.far);
        hits
    }
}

fn unproject(inverse_view_projection: &Mat4, ndc: Vec2, depth: f32) -> Vec3 {
    let clip = inverse_view_projection * Vec4::new(ndc.x, ndc.y, depth, 1.0);
    if clip.w.abs() > f32::EPSILON {
        clip.xyz() / clip.w
    } else {
        clip.xyz()
    }
}
