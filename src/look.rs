// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Looks: a whole mixer's contents frozen into a single beam, so a complete
//! composition can be saved and later played back in one layer.

use crate::{clock_bank::ClockBank, mixer::Layer, snapshot::DrawEntity, types::Normal};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A beam that is actually a composite of several layers. All layer settings
/// are preserved from the mixer the look was captured from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Look {
    #[allow(missing_docs)]
    pub layers: Vec<Layer>,
}
impl Look {
    #[allow(missing_docs)]
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// Advances every beam inside this look.
    pub fn update_state(&mut self, delta_t: Duration, external_clocks: &ClockBank) {
        for layer in &mut self.layers {
            layer.update_state(delta_t, external_clocks);
        }
    }

    /// Draws every layer in this look, scaled by the outer level. The result
    /// is a collection so inner layer ordering survives on the wire.
    pub fn render(&self, level: Normal, mask: bool, external_clocks: &ClockBank) -> DrawEntity {
        DrawEntity::Collection(
            self.layers
                .iter()
                .filter_map(|layer| layer.render_scaled(level, mask, external_clocks))
                .collect(),
        )
    }
}
