//! Bounding volumes used for raycasting

use crate::foundation::math::{Ray, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Test ray intersection with this AABB using the slab method
    ///
    /// Returns the ray parameter of the entry point (0 when the origin is
    /// inside the box) together with the outward normal of the entry face.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, Vec3)> {
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;
        let mut normal = Vec3::zeros();

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            if dir.abs() < f32::EPSILON {
                // Parallel to this slab: must start inside it
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let mut t1 = (self.min[axis] - origin) * inv;
            let mut t2 = (self.max[axis] - origin) * inv;
            let mut sign = -1.0;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
                sign = 1.0;
            }
            if t1 > tmin {
                tmin = t1;
                normal = Vec3::zeros();
                normal[axis] = sign;
            }
            tmax = tmax.min(t2);
        }

        if tmax >= tmin && tmax >= 0.0 {
            Some((tmin.max(0.0), normal))
        } else {
            None
        }
    }
}
