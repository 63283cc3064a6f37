//! Input handling
//!
//! Surface-to-device coordinate mapping and the pointer raycaster used by
//! the event dispatcher.

pub mod picking;

pub use picking::{surface_to_ndc, Raycaster};
