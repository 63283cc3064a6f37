//! # Core Module
//!
//! Shared configuration types used by the store, the scheduler and the
//! event dispatcher of a root.

pub mod config;

pub use config::{
    CameraConfig, DprRange, EventConfig, Frameloop, PerformanceConfig, RootConfig, Size,
};
