// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The drawable-entity sum type. Beams don't need to be extensible by
//! downstream code, so a tagged variant beats trait objects here: the mixer
//! and publisher match on the variant and every beam stays plainly
//! serializable.

use crate::{
    clock_bank::ClockBank, line::Line, look::Look, snapshot::DrawEntity, tunnel::Tunnel,
    types::Normal,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Any scene entity that can produce draw commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[allow(clippy::large_enum_variant)]
pub enum Beam {
    /// An arc-ring tunnel.
    Tunnel(Tunnel),
    /// A straight line.
    Line(Line),
    /// A frozen copy of an entire mixer.
    Look(Look),
}
impl Default for Beam {
    fn default() -> Self {
        Self::Tunnel(Tunnel::default())
    }
}
impl Beam {
    /// Advances any time-dependent state within the beam.
    pub fn update_state(&mut self, delta_t: Duration, external_clocks: &ClockBank) {
        match self {
            Self::Tunnel(t) => t.update_state(delta_t, external_clocks),
            Self::Line(_) => (),
            Self::Look(l) => l.update_state(delta_t, external_clocks),
        }
    }

    /// Produces this beam's draw commands for the current tick, or None if
    /// there is nothing to draw.
    pub fn render(
        &self,
        level: Normal,
        mask: bool,
        external_clocks: &ClockBank,
    ) -> Option<DrawEntity> {
        match self {
            Self::Tunnel(t) => {
                let arcs = t.render(level, mask, external_clocks);
                (!arcs.is_empty()).then_some(DrawEntity::Arcs(arcs))
            }
            Self::Line(l) => Some(DrawEntity::Lines(l.render(level, mask))),
            Self::Look(look) => Some(look.render(level, mask, external_clocks)),
        }
    }
}
