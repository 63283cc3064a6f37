//! Adaptive performance tier
//!
//! Collaborators call `regress()` when they detect a slow frame (e.g. while
//! a camera rig is moving); the tier drops to `min` and comes back to `max`
//! once `debounce_ms` pass without another regression.
//!
//! The frame clock only advances on ticks, so the window opens on the
//! first tick after the regression rather than at the last tick before it.

use crate::core::PerformanceConfig;

/// Progress of the recovery window
#[derive(Debug, Clone, Copy, PartialEq)]
enum Recovery {
    /// Not regressed
    Idle,
    /// Regressed; the window opens on the next poll
    Armed,
    /// Regressed since the given tick
    Since(f64),
}

/// Current quality tier and its bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceState {
    /// Current tier, read by collaborators to scale quality
    pub current: f32,
    /// Tier while regressed
    pub min: f32,
    /// Tier when recovered
    pub max: f32,
    /// Recovery delay in milliseconds
    pub debounce_ms: f64,
    recovery: Recovery,
}

impl PerformanceState {
    /// Create from configuration
    pub fn new(config: &PerformanceConfig) -> Self {
        Self {
            current: config.current,
            min: config.min,
            max: config.max,
            debounce_ms: config.debounce_ms,
            recovery: Recovery::Idle,
        }
    }

    /// Drop to the minimum tier; repeated calls restart the debounce window
    pub fn regress(&mut self) {
        self.current = self.min;
        self.recovery = Recovery::Armed;
    }

    /// Whether a recovery is pending
    pub fn is_regressed(&self) -> bool {
        self.recovery != Recovery::Idle
    }

    /// Called once per tick; returns `true` when the tier recovers
    pub fn poll(&mut self, now_ms: f64) -> bool {
        match self.recovery {
            Recovery::Armed => {
                self.recovery = Recovery::Since(now_ms);
                false
            }
            Recovery::Since(at) if now_ms - at >= self.debounce_ms => {
                self.current = self.max;
                self.recovery = Recovery::Idle;
                true
            }
            _ => false,
        }
    }
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self::new(&PerformanceConfig::default())
    }
}
