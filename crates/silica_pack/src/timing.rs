//! The seam to the external timing analyzer.
//!
//! The packer only needs setup pin criticalities; how they are computed is
//! the analyzer's business. Tests and the CLI use the map-backed and
//! uniform implementations.

use silica_netlist::PinId;
use std::collections::HashMap;

/// Provider of setup-timing criticalities for atom pins.
pub trait SetupTimingInfo {
    /// The setup criticality of a pin, in `[0, 1]`.
    fn setup_pin_criticality(&self, pin: PinId) -> f32;
}

/// Assigns every pin the same criticality.
///
/// `UniformCriticality(0.0)` effectively disables the timing term.
pub struct UniformCriticality(pub f32);

impl SetupTimingInfo for UniformCriticality {
    fn setup_pin_criticality(&self, _pin: PinId) -> f32 {
        self.0
    }
}

/// Map-backed criticalities; unknown pins read as zero.
#[derive(Default)]
pub struct MapCriticality {
    crits: HashMap<PinId, f32>,
}

impl MapCriticality {
    /// Creates an empty map (all pins zero-critical).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the criticality of a pin.
    pub fn set(&mut self, pin: PinId, crit: f32) {
        self.crits.insert(pin, crit);
    }
}

impl SetupTimingInfo for MapCriticality {
    fn setup_pin_criticality(&self, pin: PinId) -> f32 {
        self.crits.get(&pin).copied().unwrap_or(0.0)
    }
}
