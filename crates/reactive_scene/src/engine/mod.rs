//! Engine object model
//!
//! The runtime never looks inside the graphics engine's objects. Everything
//! it needs (property assignment, transforms, raycasting, camera projection,
//! disposal) goes through the [`SceneObject`] trait, so any engine binding
//! can be driven by the reconciler by implementing it and registering a
//! constructor in the [`Catalogue`](crate::catalogue::Catalogue).

mod bounds;
mod camera;
mod object;
mod props;

pub use bounds::AABB;
pub use camera::{OrthographicCamera, PerspectiveCamera};
pub use object::{register_builtins, EngineObject, SharedObject};
pub use props::{split_path, PropValue};

use std::any::Any;

use bitflags::bitflags;
use thiserror::Error;

use crate::foundation::math::{Mat4, Ray, Transform, Vec3};

bitflags! {
    /// What an engine object is able to do
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Has a default child collection and a transform
        const OBJECT_3D = 1 << 0;
        /// Can be hit by the pointer raycaster
        const RAYCAST = 1 << 1;
        /// Provides a projection for rendering and picking
        const CAMERA = 1 << 2;
        /// Surface description, attaches to `material` by default
        const MATERIAL = 1 << 3;
        /// Vertex data, attaches to `geometry` by default
        const GEOMETRY = 1 << 4;
        /// Light source
        const LIGHT = 1 << 5;
        /// Scene root
        const SCENE = 1 << 6;
    }
}

/// Property access errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The object has no such property
    #[error("{kind} has no property '{key}'")]
    Unknown {
        /// Object kind
        kind: String,
        /// Property key
        key: String,
    },

    /// The value has the wrong type for the property
    #[error("property '{key}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Property key
        key: String,
        /// Expected type name
        expected: &'static str,
        /// Received type name
        found: &'static str,
    },

    /// The property cannot be assigned
    #[error("property '{key}' is read-only")]
    ReadOnly {
        /// Property key
        key: String,
    },

    /// A dotted path does not lead to an assignable slot
    #[error("path '{path}' does not resolve to a property")]
    InvalidPath {
        /// The offending path
        path: String,
    },
}

/// Result of a raycast in the object's local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalHit {
    /// Ray parameter of the hit (the world-space distance when the world ray is normalized)
    pub t: f32,
    /// Outward normal of the face that was hit, in local space
    pub face_normal: Vec3,
}

/// Projection family of a camera object
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraKind {
    /// Perspective camera with vertical field of view in degrees
    Perspective {
        /// Vertical field of view in degrees
        fov: f32,
    },
    /// Orthographic camera with zoom factor
    Orthographic {
        /// Zoom factor
        zoom: f32,
    },
}

/// An instance of a graphics-engine object
///
/// Implementations decide which properties they accept; the reconciler
/// only ever assigns whole values through [`SceneObject::set_property`].
pub trait SceneObject: Any {
    /// Engine type name (e.g. `Mesh`)
    fn kind(&self) -> &str;

    /// Capability flags
    fn capabilities(&self) -> Capabilities;

    /// Read a top-level property
    fn property(&self, key: &str) -> Option<PropValue>;

    /// Assign a top-level property
    fn set_property(&mut self, key: &str, value: PropValue) -> Result<(), PropertyError>;

    /// Transform relative to the engine parent
    fn local_transform(&self) -> Transform {
        Transform::identity()
    }

    /// Slot this object plugs into when inserted without an attach descriptor
    fn default_attach(&self) -> Option<&'static str> {
        let caps = self.capabilities();
        if caps.contains(Capabilities::MATERIAL) {
            Some("material")
        } else if caps.contains(Capabilities::GEOMETRY) {
            Some("geometry")
        } else {
            None
        }
    }

    /// Local-space bounds of this object's own shape
    fn bounds(&self) -> Option<AABB> {
        None
    }

    /// Intersect a local-space ray with this object
    ///
    /// `geometry_bounds` carries the bounds of the geometry node attached to
    /// this object, when it has one.
    fn raycast(&self, ray: &Ray, geometry_bounds: Option<AABB>) -> Option<LocalHit> {
        let bounds = geometry_bounds.or_else(|| self.bounds())?;
        bounds
            .intersect_ray(ray)
            .map(|(t, face_normal)| LocalHit { t, face_normal })
    }

    /// Camera family, for cameras
    fn camera_kind(&self) -> Option<CameraKind> {
        None
    }

    /// Projection matrix, for cameras
    fn projection_matrix(&self) -> Option<Mat4> {
        None
    }

    /// Release engine resources
    fn dispose(&mut self) {}

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
