//! Property values and dotted-path access
//!
//! Engine objects expose their mutable state as a flat set of named
//! properties. Nested configuration lives in [`PropValue::Record`]s and
//! references to other scene nodes in [`PropValue::Node`], so a dotted path
//! such as `shadow.mapSize.x` or `material.color` can be walked generically.

use std::collections::BTreeMap;

use crate::foundation::collections::NodeId;
use crate::foundation::math::Vec3;

use super::PropertyError;

/// Dynamically typed property value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropValue {
    /// Absent / cleared value
    #[default]
    Null,
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point scalar
    Float(f32),
    /// String
    Str(String),
    /// 3-component vector (positions, scales, euler rotations)
    Vec3(Vec3),
    /// Linear RGB color
    Color([f32; 3]),
    /// Reference to another node in the same arena
    Node(NodeId),
    /// Ordered list
    List(Vec<PropValue>),
    /// Nested record (configuration sub-objects)
    Record(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Vec3(_) => "vec3",
            Self::Color(_) => "color",
            Self::Node(_) => "node",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }

    /// Numeric view of the value
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Vector view of the value; scalars splat to all components
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(*v),
            Self::Float(_) | Self::Int(_) => self.as_f32().map(|s| Vec3::new(s, s, s)),
            Self::List(items) if items.len() == 3 => {
                let x = items[0].as_f32()?;
                let y = items[1].as_f32()?;
                let z = items[2].as_f32()?;
                Some(Vec3::new(x, y, z))
            }
            _ => None,
        }
    }

    /// Boolean view of the value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Node reference view of the value
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// True for [`PropValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Read a single nested field (`x|y|z` of vectors, `r|g|b` of colors,
    /// list indices, record keys)
    pub fn field(&self, segment: &str) -> Option<PropValue> {
        match self {
            Self::Vec3(v) => match segment {
                "x" => Some(Self::Float(v.x)),
                "y" => Some(Self::Float(v.y)),
                "z" => Some(Self::Float(v.z)),
                _ => None,
            },
            Self::Color(c) => color_channel(segment).map(|i| Self::Float(c[i])),
            Self::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            Self::Record(map) => map.get(segment).cloned(),
            _ => None,
        }
    }

    /// Read a nested path below this value
    pub fn get_path(&self, segments: &[&str]) -> Option<PropValue> {
        match segments.split_first() {
            None => Some(self.clone()),
            Some((head, rest)) => self.field(head)?.get_path(rest),
        }
    }

    /// Assign a nested path below this value, returning the previous leaf value
    pub fn set_path(&mut self, segments: &[&str], value: PropValue) -> Result<PropValue, PropertyError> {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(std::mem::replace(self, value));
        };
        if rest.is_empty() {
            return self.set_field(head, value);
        }
        let child = match self {
            Self::List(items) => head.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            Self::Record(map) => map.get_mut(*head),
            _ => None,
        };
        match child {
            Some(child) => child.set_path(rest, value),
            None => Err(PropertyError::InvalidPath { path: segments.join(".") }),
        }
    }

    fn set_field(&mut self, segment: &str, value: PropValue) -> Result<PropValue, PropertyError> {
        let invalid = || PropertyError::InvalidPath { path: segment.to_string() };
        match self {
            Self::Vec3(v) => {
                let scalar = value.as_f32().ok_or_else(|| PropertyError::TypeMismatch {
                    key: segment.to_string(),
                    expected: "float",
                    found: value.type_name(),
                })?;
                let slot = match segment {
                    "x" => &mut v.x,
                    "y" => &mut v.y,
                    "z" => &mut v.z,
                    _ => return Err(invalid()),
                };
                Ok(Self::Float(std::mem::replace(slot, scalar)))
            }
            Self::Color(c) => {
                let index = color_channel(segment).ok_or_else(invalid)?;
                let scalar = value.as_f32().ok_or_else(|| PropertyError::TypeMismatch {
                    key: segment.to_string(),
                    expected: "float",
                    found: value.type_name(),
                })?;
                Ok(Self::Float(std::mem::replace(&mut c[index], scalar)))
            }
            Self::List(items) => {
                let slot = segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(invalid)?;
                Ok(std::mem::replace(slot, value))
            }
            Self::Record(map) => Ok(map.insert(segment.to_string(), value).unwrap_or_default()),
            _ => Err(invalid()),
        }
    }
}

fn color_channel(segment: &str) -> Option<usize> {
    match segment {
        "r" => Some(0),
        "g" => Some(1),
        "b" => Some(2),
        _ => None,
    }
}

/// Split a dotted property path into segments
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for PropValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec3> for PropValue {
    fn from(value: Vec3) -> Self {
        Self::Vec3(value)
    }
}

impl From<NodeId> for PropValue {
    fn from(value: NodeId) -> Self {
        Self::Node(value)
    }
}

impl<const N: usize> From<[(&str, PropValue); N]> for PropValue {
    fn from(entries: [(&str, PropValue); N]) -> Self {
        Self::Record(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_component_path() {
        let mut value = PropValue::Vec3(Vec3::new(1.0, 2.0, 3.0));
        let prev = value.set_path(&["y"], PropValue::Float(5.0)).unwrap();
        assert_eq!(prev, PropValue::Float(2.0));
        assert_eq!(value.field("y"), Some(PropValue::Float(5.0)));
    }

    #[test]
    fn test_nested_record_path() {
        let mut shadow = PropValue::from([
            ("bias", PropValue::Float(0.0)),
            ("mapSize", PropValue::Vec3(Vec3::new(512.0, 512.0, 0.0))),
        ]);
        shadow.set_path(&["mapSize", "x"], PropValue::Float(1024.0)).unwrap();
        assert_eq!(shadow.get_path(&["mapSize", "x"]), Some(PropValue::Float(1024.0)));
        assert_eq!(shadow.get_path(&["bias"]), Some(PropValue::Float(0.0)));
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        let mut value = PropValue::Float(1.0);
        assert!(matches!(
            value.set_path(&["x", "y"], PropValue::Null),
            Err(PropertyError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_scalar_splats_to_vec3() {
        assert_eq!(PropValue::Float(2.0).as_vec3(), Some(Vec3::new(2.0, 2.0, 2.0)));
        assert_eq!(PropValue::Str("a".into()).as_vec3(), None);
    }

    #[test]
    fn test_split_path_ignores_empty_segments() {
        assert_eq!(split_path("material..color"), vec!["material", "color"]);
    }
}
