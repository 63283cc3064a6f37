//! Attach-slot resolution
//!
//! An attached child is assigned into a property slot of its container
//! (e.g. a material into a mesh's `material`) instead of being added to the
//! container's default child collection. Detaching puts the slot's previous
//! value back.

use crate::engine::{PropValue, PropertyError};
use crate::foundation::collections::NodeId;
use crate::scene::{AttachDescriptor, AttachRecord, SceneGraph};

/// Place `child` into `target` according to `descriptor`
///
/// A path slot must already exist on the target. When the slot holds
/// another live node, the later child wins and a warning is logged.
pub(crate) fn attach(
    graph: &mut SceneGraph,
    target: NodeId,
    child: NodeId,
    descriptor: &AttachDescriptor,
) -> Result<AttachRecord, PropertyError> {
    match descriptor {
        AttachDescriptor::Path(path) => {
            let current = graph
                .get_path(target, path)
                .ok_or_else(|| PropertyError::InvalidPath { path: path.clone() })?;
            if let PropValue::Node(other) = current {
                if other != child && graph.contains(other) {
                    log::warn!(
                        "Slot '{}' on {:?} is already claimed by {:?}; {:?} replaces it",
                        path,
                        target,
                        other,
                        child
                    );
                }
            }
            let previous = graph.set_path(target, path, PropValue::Node(child))?;
            log::trace!("Attached {:?} to {:?}.{}", child, target, path);
            Ok(AttachRecord::Slot {
                target,
                path: path.clone(),
                previous,
            })
        }
        AttachDescriptor::Resolver(resolve) => {
            let detach = resolve(graph, target, child);
            Ok(AttachRecord::Custom { target, detach })
        }
    }
}

/// Undo an attach
///
/// The previous value is restored only while the slot still holds `child`.
/// If a later child claimed the slot in the meantime, that child inherits
/// the previous value so its own detach restores the original.
pub(crate) fn detach(graph: &mut SceneGraph, child: NodeId, record: AttachRecord) {
    match record {
        AttachRecord::Slot { target, path, previous } => match graph.get_path(target, &path) {
            Some(PropValue::Node(current)) if current == child => {
                if let Err(e) = graph.set_path(target, &path, previous) {
                    log::warn!("Failed to restore slot '{}' on {:?}: {}", path, target, e);
                }
            }
            Some(PropValue::Node(later)) => {
                let claimed = graph.local_mut(later).and_then(|l| l.attached.as_mut());
                if let Some(AttachRecord::Slot {
                    target: later_target,
                    path: later_path,
                    previous: later_previous,
                }) = claimed
                {
                    if *later_target == target && *later_path == path && *later_previous == PropValue::Node(child) {
                        *later_previous = previous;
                    }
                }
            }
            _ => {}
        },
        AttachRecord::Custom { detach, .. } => detach(graph),
    }
}
