//! # Camera objects
//!
//! Perspective and orthographic cameras usable as scene nodes. The store
//! picks one as the default camera; its projection drives rendering and
//! the pointer raycaster.
//!
//! ## Coordinate System
//! Right-handed, Y-up. A camera looks down its local -Z axis; when a
//! `lookAt` target is set the local rotation is derived from it.

use std::any::Any;

use crate::foundation::math::{Mat4, Mat4Ext, Quat, Transform, Vec3};

use super::{CameraKind, Capabilities, PropValue, PropertyError, SceneObject};

fn look_rotation(position: Vec3, target: Option<Vec3>, up: Vec3) -> Quat {
    match target {
        Some(target) if (position - target).norm_squared() > f32::EPSILON => {
            // face_towards aligns +Z; cameras look down -Z
            Quat::face_towards(&(position - target), &up)
        }
        _ => Quat::identity(),
    }
}

fn expect_f32(key: &str, value: &PropValue) -> Result<f32, PropertyError> {
    value.as_f32().ok_or_else(|| PropertyError::TypeMismatch {
        key: key.to_string(),
        expected: "float",
        found: value.type_name(),
    })
}

fn expect_vec3(key: &str, value: &PropValue) -> Result<Vec3, PropertyError> {
    value.as_vec3().ok_or_else(|| PropertyError::TypeMismatch {
        key: key.to_string(),
        expected: "vec3",
        found: value.type_name(),
    })
}

fn expect_bool(key: &str, value: &PropValue) -> Result<bool, PropertyError> {
    value.as_bool().ok_or_else(|| PropertyError::TypeMismatch {
        key: key.to_string(),
        expected: "bool",
        found: value.type_name(),
    })
}

/// 3D camera with perspective projection
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees
    pub fov: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Distance to near clipping plane
    pub near: f32,
    /// Distance to far clipping plane
    pub far: f32,
    /// Zoom factor (narrows the effective field of view)
    pub zoom: f32,
    /// Position relative to the engine parent
    pub position: Vec3,
    /// Point the camera is looking at, if any
    pub target: Option<Vec3>,
    /// Up vector for orientation
    pub up: Vec3,
    /// When set, resizing the surface does not touch the aspect ratio
    pub manual: bool,
}

impl PerspectiveCamera {
    /// Create a perspective camera positioned at the origin
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov,
            aspect,
            near,
            far,
            zoom: 1.0,
            position: Vec3::zeros(),
            target: None,
            up: Vec3::new(0.0, 1.0, 0.0),
            manual: false,
        }
    }

    /// Effective vertical field of view in radians (zoom applied)
    pub fn effective_fov(&self) -> f32 {
        let half = (self.fov.to_radians() * 0.5).tan() / self.zoom.max(f32::EPSILON);
        2.0 * half.atan()
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        let mut camera = Self::new(75.0, 1.0, 0.1, 1000.0);
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera
    }
}

impl SceneObject for PerspectiveCamera {
    fn kind(&self) -> &str {
        "PerspectiveCamera"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::OBJECT_3D | Capabilities::CAMERA
    }

    fn property(&self, key: &str) -> Option<PropValue> {
        Some(match key {
            "fov" => PropValue::Float(self.fov),
            "aspect" => PropValue::Float(self.aspect),
            "near" => PropValue::Float(self.near),
            "far" => PropValue::Float(self.far),
            "zoom" => PropValue::Float(self.zoom),
            "position" => PropValue::Vec3(self.position),
            "lookAt" => self.target.map_or(PropValue::Null, PropValue::Vec3),
            "up" => PropValue::Vec3(self.up),
            "manual" => PropValue::Bool(self.manual),
            _ => return None,
        })
    }

    fn set_property(&mut self, key: &str, value: PropValue) -> Result<(), PropertyError> {
        match key {
            "fov" => self.fov = expect_f32(key, &value)?,
            "aspect" => self.aspect = expect_f32(key, &value)?,
            "near" => self.near = expect_f32(key, &value)?,
            "far" => self.far = expect_f32(key, &value)?,
            "zoom" => self.zoom = expect_f32(key, &value)?,
            "position" => self.position = expect_vec3(key, &value)?,
            "lookAt" => {
                self.target = if value.is_null() { None } else { Some(expect_vec3(key, &value)?) };
            }
            "up" => self.up = expect_vec3(key, &value)?,
            "manual" => self.manual = expect_bool(key, &value)?,
            _ => {
                return Err(PropertyError::Unknown {
                    kind: self.kind().to_string(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    fn local_transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: look_rotation(self.position, self.target, self.up),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }

    fn camera_kind(&self) -> Option<CameraKind> {
        Some(CameraKind::Perspective { fov: self.fov })
    }

    fn projection_matrix(&self) -> Option<Mat4> {
        Some(Mat4::perspective(self.effective_fov(), self.aspect, self.near, self.far))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 3D camera with orthographic projection
#[derive(Debug, Clone)]
pub struct OrthographicCamera {
    /// Left frustum plane
    pub left: f32,
    /// Right frustum plane
    pub right: f32,
    /// Top frustum plane
    pub top: f32,
    /// Bottom frustum plane
    pub bottom: f32,
    /// Distance to near clipping plane
    pub near: f32,
    /// Distance to far clipping plane
    pub far: f32,
    /// Zoom factor (divides the frustum)
    pub zoom: f32,
    /// Position relative to the engine parent
    pub position: Vec3,
    /// Point the camera is looking at, if any
    pub target: Option<Vec3>,
    /// Up vector for orientation
    pub up: Vec3,
    /// When set, resizing the surface does not touch the frustum
    pub manual: bool,
}

impl OrthographicCamera {
    /// Frame a surface of `width` x `height` pixels, centered on the camera
    pub fn fit_to(&mut self, width: f32, height: f32) {
        self.left = -width / 2.0;
        self.right = width / 2.0;
        self.top = height / 2.0;
        self.bottom = -height / 2.0;
    }
}

impl Default for OrthographicCamera {
    fn default() -> Self {
        Self {
            left: -1.0,
            right: 1.0,
            top: 1.0,
            bottom: -1.0,
            near: 0.1,
            far: 1000.0,
            zoom: 1.0,
            position: Vec3::new(0.0, 0.0, 5.0),
            target: None,
            up: Vec3::new(0.0, 1.0, 0.0),
            manual: false,
        }
    }
}

impl SceneObject for OrthographicCamera {
    fn kind(&self) -> &str {
        "OrthographicCamera"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::OBJECT_3D | Capabilities::CAMERA
    }

    fn property(&self, key: &str) -> Option<PropValue> {
        Some(match key {
            "left" => PropValue::Float(self.left),
            "right" => PropValue::Float(self.right),
            "top" => PropValue::Float(self.top),
            "bottom" => PropValue::Float(self.bottom),
            "near" => PropValue::Float(self.near),
            "far" => PropValue::Float(self.far),
            "zoom" => PropValue::Float(self.zoom),
            "position" => PropValue::Vec3(self.position),
            "lookAt" => self.target.map_or(PropValue::Null, PropValue::Vec3),
            "up" => PropValue::Vec3(self.up),
            "manual" => PropValue::Bool(self.manual),
            _ => return None,
        })
    }

    fn set_property(&mut self, key: &str, value: PropValue) -> Result<(), PropertyError> {
        match key {
            "left" => self.left = expect_f32(key, &value)?,
            "right" => self.right = expect_f32(key, &value)?,
            "top" => self.top = expect_f32(key, &value)?,
            "bottom" => self.bottom = expect_f32(key, &value)?,
            "near" => self.near = expect_f32(key, &value)?,
            "far" => self.far = expect_f32(key, &value)?,
            "zoom" => self.zoom = expect_f32(key, &value)?,
            "position" => self.position = expect_vec3(key, &value)?,
            "lookAt" => {
                self.target = if value.is_null() { None } else { Some(expect_vec3(key, &value)?) };
            }
            "up" => self.up = expect_vec3(key, &value)?,
            "manual" => self.manual = expect_bool(key, &value)?,
            _ => {
                return Err(PropertyError::Unknown {
                    kind: self.kind().to_string(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    fn local_transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: look_rotation(self.position, self.target, self.up),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }

    fn camera_kind(&self) -> Option<CameraKind> {
        Some(CameraKind::Orthographic { zoom: self.zoom })
    }

    fn projection_matrix(&self) -> Option<Mat4> {
        let zoom = self.zoom.max(f32::EPSILON);
        Some(Mat4::orthographic(
            self.left / zoom,
            self.right / zoom,
            self.bottom / zoom,
            self.top / zoom,
            self.near,
            self.far,
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zoom_narrows_field_of_view() {
        let mut camera = PerspectiveCamera::new(90.0, 1.0, 0.1, 100.0);
        let wide = camera.effective_fov();
        camera.zoom = 2.0;
        assert!(camera.effective_fov() < wide);
        assert_relative_eq!(wide, 90f32.to_radians(), epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut camera = PerspectiveCamera::default();
        camera.position = Vec3::new(5.0, 0.0, 0.0);
        camera.target = Some(Vec3::zeros());
        let forward = camera.local_transform().rotation * Vec3::new(0.0, 0.0, -1.0);
        assert_relative_eq!(forward, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_unknown_camera_property() {
        let mut camera = OrthographicCamera::default();
        assert!(matches!(
            camera.set_property("fov", PropValue::Float(1.0)),
            Err(PropertyError::Unknown { .. })
        ));
    }
}
