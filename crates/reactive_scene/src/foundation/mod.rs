//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the runtime:
//! - Math types, transforms and rays
//! - Arena keys for scene nodes
//! - Frame clock driven by host timestamps
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod time;
pub mod logging;
