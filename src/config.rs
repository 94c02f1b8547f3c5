//! Runtime configuration for the view-sync core.

use std::time::Duration;

use log::warn;

fn default_bus_capacity() -> usize {
    1024
}

fn default_row_height_px() -> f32 {
    48.0
}

fn default_animation_duration_ms() -> u64 {
    180
}

fn default_min_move_px() -> f32 {
    0.5
}

/// Tunables for bus buffering, row geometry, and reposition animation.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SyncConfig {
    /// Per-subscriber buffer of every event bus. A subscriber that falls
    /// further behind skips overwritten events (drop-oldest).
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    /// Base row extent in logical pixels, used to turn list indices into
    /// display positions.
    #[serde(default = "default_row_height_px")]
    pub row_height_px: f32,
    /// Duration of one reposition animation in milliseconds.
    #[serde(default = "default_animation_duration_ms")]
    pub animation_duration_ms: u64,
    /// Position deltas below this threshold snap without animating.
    #[serde(default = "default_min_move_px")]
    pub min_move_px: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            bus_capacity: default_bus_capacity(),
            row_height_px: default_row_height_px(),
            animation_duration_ms: default_animation_duration_ms(),
            min_move_px: default_min_move_px(),
        }
    }
}

impl SyncConfig {
    /// Parses config from TOML text, falling back to defaults on error.
    pub fn from_toml_str(text: &str) -> Self {
        match toml::from_str::<SyncConfig>(text) {
            Ok(config) => config.sanitized(),
            Err(err) => {
                warn!("Invalid sync config, using defaults: {}", err);
                SyncConfig::default()
            }
        }
    }

    /// Clamps out-of-range values instead of failing.
    pub fn sanitized(mut self) -> Self {
        if self.bus_capacity == 0 {
            warn!("bus_capacity must be at least 1, clamping");
            self.bus_capacity = 1;
        }
        if !(self.row_height_px.is_finite() && self.row_height_px > 0.0) {
            warn!("row_height_px must be positive, using default");
            self.row_height_px = default_row_height_px();
        }
        if !(self.min_move_px.is_finite() && self.min_move_px >= 0.0) {
            self.min_move_px = default_min_move_px();
        }
        self
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = SyncConfig::from_toml_str("bus_capacity = 64\n");
        assert_eq!(config.bus_capacity, 64);
        assert_eq!(config.row_height_px, default_row_height_px());
        assert_eq!(config.animation_duration_ms, default_animation_duration_ms());
    }

    #[test]
    fn invalid_toml_yields_defaults() {
        let config = SyncConfig::from_toml_str("bus_capacity = \"lots\"");
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn sanitize_clamps_zero_capacity() {
        let config = SyncConfig::from_toml_str("bus_capacity = 0\n");
        assert_eq!(config.bus_capacity, 1);
    }
}
