//! # Reactive Scene
//!
//! A declarative scene-graph runtime: element trees are reconciled into a
//! retained 3D scene graph, a per-root reactive store holds shared state,
//! a render scheduler drives the frame loop and a pointer-event dispatcher
//! turns raw input into per-object events.
//!
//! ## Features
//!
//! - **Reconciler**: create/insert/update/remove/rebuild with attach slots
//! - **Store**: synchronous reads, deferred change notification
//! - **Scheduler**: `always`/`demand`/`never` frame loops with priorities
//! - **Events**: raycast picking with bubbling, hover tracking and capture
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use reactive_scene::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalogue = Catalogue::global();
//!     register_builtins(&catalogue);
//!     let host = ManualFrameHost::new();
//!     let mut root = Root::new(
//!         RootConfig::default(),
//!         catalogue,
//!         HeadlessRenderer::shared(),
//!         Rc::new(host.clone()),
//!     )?;
//!
//!     root.render(vec![Element::new("mesh")
//!         .child(Element::new("boxGeometry"))
//!         .child(Element::new("meshStandardMaterial"))])?;
//!     root.frame(16.0)?;
//!     root.unmount();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core configuration
pub mod core;
pub mod config;

// Building blocks
pub mod foundation;
pub mod engine;
pub mod catalogue;
pub mod scene;
pub mod input;
pub mod render;

// Runtime
pub mod store;
pub mod reconciler;
pub mod scheduler;
pub mod events;
pub mod root;

pub use root::{Root, RootError, RootResult};

#[cfg(test)]
mod tests;

/// Common imports for runtime users
pub mod prelude {
    pub use crate::{
        catalogue::{Catalogue, ConstructError, UnknownTagError},
        config::{Config, ConfigError},
        core::{CameraConfig, Frameloop, RootConfig, Size},
        engine::{register_builtins, EngineObject, PropValue, SceneObject},
        events::{EventKind, EventTarget, NativeEventKind, NativePointerEvent, PointerEvent},
        foundation::{collections::NodeId, math::Vec3},
        reconciler::{Element, NodeRef, Reconciler, ReconcilerError},
        render::{HeadlessRenderer, Renderer},
        root::{Root, RootError},
        scene::AttachDescriptor,
        scheduler::{FrameContext, FrameHost, ManualFrameHost},
        store::{StatePatch, Store},
    };
}
