//! # Root Configuration
//!
//! Everything a root needs at mount time: render loop policy, surface size
//! and pixel ratio, default camera, adaptive-performance bounds and event
//! settings. All types are serializable so a host can keep them in a
//! `.toml` or `.ron` file next to its assets.

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};

/// Render loop policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frameloop {
    /// Render every animation frame
    #[default]
    Always,
    /// Render only after `invalidate()`
    Demand,
    /// Never schedule; the host calls `advance()` itself
    Never,
}

/// Surface size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
    /// Offset of the surface from the top of the page
    #[serde(default)]
    pub top: f32,
    /// Offset of the surface from the left of the page
    #[serde(default)]
    pub left: f32,
}

impl Size {
    /// Size at the origin
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height, top: 0.0, left: 0.0 }
    }

    /// Width / height (1 for degenerate sizes)
    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 { self.width / self.height } else { 1.0 }
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

/// Allowed device-pixel-ratio range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DprRange {
    /// Lowest ratio
    pub min: f32,
    /// Highest ratio
    pub max: f32,
}

impl DprRange {
    /// Clamp a device pixel ratio into the range
    pub fn clamp(&self, dpr: f32) -> f32 {
        crate::foundation::math::utils::clamp(dpr, self.min, self.max)
    }
}

impl Default for DprRange {
    fn default() -> Self {
        Self { min: 1.0, max: 2.0 }
    }
}

/// Default camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Vertical field of view in degrees (perspective)
    pub fov: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Initial position
    pub position: [f32; 3],
    /// Use an orthographic camera
    pub orthographic: bool,
    /// Zoom factor
    pub zoom: f32,
    /// Do not touch aspect/frustum when the surface resizes
    pub manual: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            position: [0.0, 0.0, 5.0],
            orthographic: false,
            zoom: 1.0,
            manual: false,
        }
    }
}

/// Adaptive performance bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Starting quality tier
    pub current: f32,
    /// Tier while regressed
    pub min: f32,
    /// Tier when recovered
    pub max: f32,
    /// Milliseconds without `regress()` calls before recovering
    pub debounce_ms: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            current: 1.0,
            min: 0.5,
            max: 1.0,
            debounce_ms: 200.0,
        }
    }
}

/// Pointer event settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Whether native input is processed
    pub enabled: bool,
    /// Priority among several roots sharing one surface (higher first)
    pub priority: i32,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { enabled: true, priority: 1 }
    }
}

/// Complete configuration of one root
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Render loop policy
    pub frameloop: Frameloop,
    /// Initial surface size
    pub size: Size,
    /// Allowed pixel-ratio range
    pub dpr: DprRange,
    /// Default camera
    pub camera: CameraConfig,
    /// Adaptive performance bounds
    pub performance: PerformanceConfig,
    /// Pointer events
    pub events: EventConfig,
    /// Log level used by hosts that initialize logging from the config
    pub log_level: Option<String>,
}

impl RootConfig {
    /// Set the render loop policy
    pub fn with_frameloop(mut self, frameloop: Frameloop) -> Self {
        self.frameloop = frameloop;
        self
    }

    /// Set the initial surface size
    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.size = Size::new(width, height);
        self
    }

    /// Set the pixel-ratio range
    pub fn with_dpr(mut self, min: f32, max: f32) -> Self {
        self.dpr = DprRange { min, max };
        self
    }

    /// Set the default camera
    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    /// Set the performance bounds
    pub fn with_performance(mut self, performance: PerformanceConfig) -> Self {
        self.performance = performance;
        self
    }

    /// Enable or disable pointer events
    pub fn with_events_enabled(mut self, enabled: bool) -> Self {
        self.events.enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size.width <= 0.0 || self.size.height <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "surface size must be positive, got {}x{}",
                self.size.width, self.size.height
            )));
        }
        if self.dpr.min <= 0.0 || self.dpr.min > self.dpr.max {
            return Err(ConfigError::Invalid(format!(
                "dpr range {}..{} is empty or non-positive",
                self.dpr.min, self.dpr.max
            )));
        }
        let perf = &self.performance;
        if perf.min > perf.max || perf.current < perf.min || perf.current > perf.max {
            return Err(ConfigError::Invalid(format!(
                "performance tiers must satisfy min <= current <= max, got {} / {} / {}",
                perf.min, perf.current, perf.max
            )));
        }
        if perf.debounce_ms < 0.0 {
            return Err(ConfigError::Invalid("performance debounce must not be negative".to_string()));
        }
        if self.camera.near <= 0.0 || self.camera.far <= self.camera.near {
            return Err(ConfigError::Invalid(format!(
                "camera clipping planes {}..{} are invalid",
                self.camera.near, self.camera.far
            )));
        }
        Ok(())
    }
}

impl Config for RootConfig {}
