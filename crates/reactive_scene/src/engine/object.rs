//! Built-in engine objects
//!
//! [`EngineObject`] is a property-bag implementation of [`SceneObject`]
//! covering the common object families (groups, meshes, geometries,
//! materials, lights). Engine bindings with richer types implement the
//! trait themselves and register their own constructors.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::catalogue::{Catalogue, ConstructError};
use crate::foundation::math::{Ray, Transform, Vec3};

use super::{
    AABB, CameraKind, Capabilities, LocalHit, OrthographicCamera, PerspectiveCamera, PropValue,
    PropertyError, SceneObject,
};

const TRANSFORM_KEYS: [&str; 3] = ["position", "rotation", "scale"];

/// Generic engine object backed by a property map
#[derive(Debug, Clone)]
pub struct EngineObject {
    kind: String,
    caps: Capabilities,
    props: BTreeMap<String, PropValue>,
    bounds: Option<AABB>,
    disposed: bool,
}

impl EngineObject {
    /// Create an object of the given kind; 3D objects get transform properties
    pub fn new(kind: impl Into<String>, caps: Capabilities) -> Self {
        let mut props = BTreeMap::new();
        if caps.contains(Capabilities::OBJECT_3D) {
            props.insert("position".to_string(), PropValue::Vec3(Vec3::zeros()));
            props.insert("rotation".to_string(), PropValue::Vec3(Vec3::zeros()));
            props.insert("scale".to_string(), PropValue::Vec3(Vec3::new(1.0, 1.0, 1.0)));
            props.insert("visible".to_string(), PropValue::Bool(true));
        }
        Self {
            kind: kind.into(),
            caps,
            props,
            bounds: None,
            disposed: false,
        }
    }

    /// Add an initial property (builder pattern)
    pub fn with_prop(mut self, key: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    /// Set the local bounds used for raycasting (builder pattern)
    pub fn with_bounds(mut self, bounds: AABB) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Empty transform node
    pub fn group() -> Self {
        Self::new("Group", Capabilities::OBJECT_3D)
    }

    /// Scene root
    pub fn scene() -> Self {
        Self::new("Scene", Capabilities::OBJECT_3D | Capabilities::SCENE)
            .with_prop("background", PropValue::Null)
    }

    /// Renderable, pickable object with `geometry` and `material` slots
    pub fn mesh() -> Self {
        Self::new("Mesh", Capabilities::OBJECT_3D | Capabilities::RAYCAST)
            .with_prop("geometry", PropValue::Null)
            .with_prop("material", PropValue::Null)
    }

    /// Axis-aligned box geometry centered at the origin
    pub fn box_geometry(width: f32, height: f32, depth: f32) -> Self {
        Self::new("BoxGeometry", Capabilities::GEOMETRY)
            .with_prop("width", width)
            .with_prop("height", height)
            .with_prop("depth", depth)
            .with_bounds(box_bounds(width, height, depth))
    }

    /// Surface material of the given kind
    pub fn material(kind: &str) -> Self {
        Self::new(kind, Capabilities::MATERIAL)
            .with_prop("color", PropValue::Color([1.0, 1.0, 1.0]))
            .with_prop("opacity", 1.0)
            .with_prop("transparent", false)
            .with_prop("map", PropValue::Null)
    }

    /// Light source of the given kind
    pub fn light(kind: &str) -> Self {
        Self::new(kind, Capabilities::OBJECT_3D | Capabilities::LIGHT)
            .with_prop("color", PropValue::Color([1.0, 1.0, 1.0]))
            .with_prop("intensity", 1.0)
            .with_prop("castShadow", false)
            .with_prop(
                "shadow",
                PropValue::from([
                    ("bias", PropValue::Float(0.0)),
                    ("mapSize", PropValue::Vec3(Vec3::new(512.0, 512.0, 0.0))),
                    ("camera", PropValue::Null),
                ]),
            )
    }

    /// Whether [`SceneObject::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn refresh_bounds(&mut self) {
        if !self.caps.contains(Capabilities::GEOMETRY) {
            return;
        }
        let dim = |key: &str| self.props.get(key).and_then(PropValue::as_f32).unwrap_or(1.0);
        self.bounds = Some(box_bounds(dim("width"), dim("height"), dim("depth")));
    }
}

fn box_bounds(width: f32, height: f32, depth: f32) -> AABB {
    AABB::from_center_extents(Vec3::zeros(), Vec3::new(width, height, depth) * 0.5)
}

impl SceneObject for EngineObject {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn property(&self, key: &str) -> Option<PropValue> {
        self.props.get(key).cloned()
    }

    fn set_property(&mut self, key: &str, value: PropValue) -> Result<(), PropertyError> {
        if key == "kind" {
            return Err(PropertyError::ReadOnly { key: key.to_string() });
        }
        let value = if TRANSFORM_KEYS.contains(&key) && self.caps.contains(Capabilities::OBJECT_3D) {
            let v = value.as_vec3().ok_or_else(|| PropertyError::TypeMismatch {
                key: key.to_string(),
                expected: "vec3",
                found: value.type_name(),
            })?;
            PropValue::Vec3(v)
        } else if key == "visible" && value.as_bool().is_none() {
            return Err(PropertyError::TypeMismatch {
                key: key.to_string(),
                expected: "bool",
                found: value.type_name(),
            });
        } else {
            value
        };
        self.props.insert(key.to_string(), value);
        self.refresh_bounds();
        Ok(())
    }

    fn local_transform(&self) -> Transform {
        let vec = |key: &str, default: Vec3| {
            self.props.get(key).and_then(PropValue::as_vec3).unwrap_or(default)
        };
        Transform::from_parts(
            vec("position", Vec3::zeros()),
            vec("rotation", Vec3::zeros()),
            vec("scale", Vec3::new(1.0, 1.0, 1.0)),
        )
    }

    fn bounds(&self) -> Option<AABB> {
        self.bounds
    }

    fn dispose(&mut self) {
        log::trace!("Disposing {}", self.kind);
        self.disposed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Externally owned engine object mounted as a "primitive"
///
/// The reconciler places and updates the wrapped object like any other
/// node but never disposes it: its lifetime belongs to whoever holds the
/// other `Rc`.
pub struct SharedObject {
    kind: String,
    inner: Rc<RefCell<dyn SceneObject>>,
}

impl SharedObject {
    /// Wrap a shared engine object
    pub fn new(inner: Rc<RefCell<dyn SceneObject>>) -> Self {
        let kind = inner.borrow().kind().to_string();
        Self { kind, inner }
    }

    /// The wrapped object
    pub fn inner(&self) -> &Rc<RefCell<dyn SceneObject>> {
        &self.inner
    }
}

impl SceneObject for SharedObject {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.borrow().capabilities()
    }

    fn property(&self, key: &str) -> Option<PropValue> {
        self.inner.borrow().property(key)
    }

    fn set_property(&mut self, key: &str, value: PropValue) -> Result<(), PropertyError> {
        self.inner.borrow_mut().set_property(key, value)
    }

    fn local_transform(&self) -> Transform {
        self.inner.borrow().local_transform()
    }

    fn default_attach(&self) -> Option<&'static str> {
        self.inner.borrow().default_attach()
    }

    fn bounds(&self) -> Option<AABB> {
        self.inner.borrow().bounds()
    }

    fn raycast(&self, ray: &Ray, geometry_bounds: Option<AABB>) -> Option<LocalHit> {
        self.inner.borrow().raycast(ray, geometry_bounds)
    }

    fn camera_kind(&self) -> Option<CameraKind> {
        self.inner.borrow().camera_kind()
    }

    fn projection_matrix(&self) -> Option<crate::foundation::math::Mat4> {
        self.inner.borrow().projection_matrix()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn arg_f32(args: &[PropValue], index: usize, default: f32) -> Result<f32, ConstructError> {
    match args.get(index) {
        None | Some(PropValue::Null) => Ok(default),
        Some(value) => value.as_f32().ok_or_else(|| {
            ConstructError::new(format!("argument {} must be a number, got {}", index, value.type_name()))
        }),
    }
}

fn apply_parameters(object: &mut EngineObject, args: &[PropValue]) -> Result<(), ConstructError> {
    match args.first() {
        None | Some(PropValue::Null) => Ok(()),
        Some(PropValue::Record(params)) => {
            for (key, value) in params {
                object
                    .set_property(key, value.clone())
                    .map_err(|e| ConstructError::new(e.to_string()))?;
            }
            Ok(())
        }
        Some(other) => Err(ConstructError::new(format!(
            "parameters must be a record, got {}",
            other.type_name()
        ))),
    }
}

/// Register the built-in object types in a catalogue
pub fn register_builtins(catalogue: &Catalogue) {
    catalogue.register_with_arity("group", 0, |_| Ok(Box::new(EngineObject::group())));
    catalogue.register_with_arity("mesh", 0, |_| Ok(Box::new(EngineObject::mesh())));
    catalogue.register_with_arity("boxGeometry", 3, |args| {
        Ok(Box::new(EngineObject::box_geometry(
            arg_f32(args, 0, 1.0)?,
            arg_f32(args, 1, 1.0)?,
            arg_f32(args, 2, 1.0)?,
        )))
    });
    for (tag, kind) in [
        ("meshStandardMaterial", "MeshStandardMaterial"),
        ("meshBasicMaterial", "MeshBasicMaterial"),
    ] {
        catalogue.register_with_arity(tag, 1, move |args| {
            let mut material = EngineObject::material(kind);
            apply_parameters(&mut material, args)?;
            Ok(Box::new(material))
        });
    }
    catalogue.register_with_arity("pointLight", 0, |_| Ok(Box::new(EngineObject::light("PointLight"))));
    catalogue.register_with_arity("ambientLight", 0, |_| Ok(Box::new(EngineObject::light("AmbientLight"))));
    catalogue.register_with_arity("perspectiveCamera", 4, |args| {
        Ok(Box::new(PerspectiveCamera::new(
            arg_f32(args, 0, 75.0)?,
            arg_f32(args, 1, 1.0)?,
            arg_f32(args, 2, 0.1)?,
            arg_f32(args, 3, 1000.0)?,
        )))
    });
    catalogue.register_with_arity("orthographicCamera", 6, |args| {
        let mut camera = OrthographicCamera::default();
        camera.left = arg_f32(args, 0, camera.left)?;
        camera.right = arg_f32(args, 1, camera.right)?;
        camera.top = arg_f32(args, 2, camera.top)?;
        camera.bottom = arg_f32(args, 3, camera.bottom)?;
        camera.near = arg_f32(args, 4, camera.near)?;
        camera.far = arg_f32(args, 5, camera.far)?;
        Ok(Box::new(camera))
    });
}
