//! Frame clock driven by host timestamps
//!
//! Hosts hand the scheduler a monotonic timestamp in milliseconds on each
//! animation frame; the clock turns that into elapsed/delta seconds.

/// Clock for frame timing
#[derive(Debug, Clone, Default)]
pub struct Clock {
    start_ms: Option<f64>,
    last_ms: f64,
    elapsed: f32,
    delta: f32,
    running: bool,
}

impl Clock {
    /// Create a new stopped clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `now_ms`
    pub fn start(&mut self, now_ms: f64) {
        self.start_ms = Some(now_ms);
        self.last_ms = now_ms;
        self.elapsed = 0.0;
        self.delta = 0.0;
        self.running = true;
    }

    /// Stop the clock; elapsed time is kept
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Advance to `now_ms` and return the delta in seconds
    ///
    /// A stopped clock is (re)started and reports a zero delta. Timestamps
    /// going backwards are clamped to a zero delta.
    pub fn tick(&mut self, now_ms: f64) -> f32 {
        if !self.running {
            let elapsed = self.elapsed;
            self.start(now_ms);
            self.elapsed = elapsed;
            return 0.0;
        }
        let delta_ms = (now_ms - self.last_ms).max(0.0);
        self.last_ms = now_ms;
        self.delta = (delta_ms / 1000.0) as f32;
        self.elapsed += self.delta;
        self.delta
    }

    /// Seconds since the clock started
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Seconds between the last two ticks
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Timestamp of the last tick in milliseconds
    pub fn now_ms(&self) -> f64 {
        self.last_ms
    }

    /// Check if the clock is running
    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_tick_has_zero_delta() {
        let mut clock = Clock::new();
        assert_eq!(clock.tick(1000.0), 0.0);
        assert!(clock.is_running());
    }

    #[test]
    fn test_tick_accumulates_elapsed() {
        let mut clock = Clock::new();
        clock.tick(0.0);
        assert_relative_eq!(clock.tick(16.0), 0.016);
        assert_relative_eq!(clock.tick(32.0), 0.016);
        assert_relative_eq!(clock.elapsed(), 0.032);
    }

    #[test]
    fn test_backwards_timestamp_clamps() {
        let mut clock = Clock::new();
        clock.tick(100.0);
        assert_eq!(clock.tick(50.0), 0.0);
    }
}
