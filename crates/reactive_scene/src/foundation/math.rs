//! Math utilities and types
//!
//! Provides the vector, matrix and ray types used by the scene graph,
//! the camera projections and the pointer raycaster.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform from position, euler rotation (radians, XYZ order) and scale
    pub fn from_parts(position: Vec3, euler: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler_angles(euler.x, euler.y, euler.z),
            scale,
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Half-line used for picking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (normalized for world-space rays)
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing the direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = if direction.norm_squared() > 0.0 {
            direction.normalize()
        } else {
            direction
        };
        Self { origin, direction }
    }

    /// Point at parameter `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transform the ray by a matrix (direction is not re-normalized)
    ///
    /// Keeping the direction unnormalized means the parameter `t` of a hit
    /// found in the transformed space maps back to the same point.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            origin: matrix.transform_point(&Point3::from(self.origin)).coords,
            direction: matrix.transform_vector(&self.direction),
        }
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: Vec3::zeros(),
            direction: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

/// Math utility functions
pub mod utils {
    /// Clamp a value between min and max
    pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
        if value < min { min } else if value > max { max } else { value }
    }
}

/// Extension trait for Mat4 with projection helpers
pub trait Mat4Ext {
    /// Right-handed perspective projection with clip-space depth in [-1, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed orthographic projection with clip-space depth in [-1, 1]
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_perspective(aspect, fov_y, near, far)
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        Mat4::new_orthographic(left, right, bottom, top, near, far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_matrix_translates() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let p = t.to_matrix().transform_point(&Point3::origin());
        assert_relative_eq!(p.coords, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_transformed_ray_keeps_parameter() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let scale = Mat4::new_scaling(0.5);
        let local = ray.transformed(&scale);
        // World point at t=4 is z=6, local is z=3
        assert_relative_eq!(local.at(4.0).z, 3.0);
    }
}
