//! Scene graph arena
//!
//! Every node mounted by a root lives in one [`SceneGraph`] arena keyed by
//! [`NodeId`](crate::foundation::collections::NodeId). A node carries the
//! engine object itself (or nothing, for compound wrapper nodes), its
//! engine-level placement in the default child collection, and the
//! [`NodeLocalState`] bookkeeping the reconciler needs to tear it down.
//!
//! ## Architecture
//!
//! ```text
//! Element tree (declarative)
//!      ↓
//! Reconciler (create / insert / update / remove)
//!      ↓
//! SceneGraph arena (engine objects + local state)
//!      ↓
//! Renderer / raycaster
//! ```

mod local_state;
mod scene_graph;

pub use local_state::{
    AttachDescriptor, AttachFn, DetachFn, DisposalError, Disposer, NodeLocalState,
};
pub(crate) use local_state::AttachRecord;
pub use scene_graph::{GraphNode, NodeBody, RaycastHit, SceneGraph};
