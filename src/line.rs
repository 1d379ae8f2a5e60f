// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Line beams: straight strokes with a drawable sub-span, the second
//! primitive shape alongside tunnels. Lines carry no animator bank; they are
//! placed and styled directly.

use crate::{
    snapshot::LineRecord,
    types::{BipolarNormal, Normal, Phase},
};
use serde::{Deserialize, Serialize};

/// Stroke width in screen-fraction terms at full thickness knob deflection.
const THICKNESS_SCALE: f64 = 0.05;

/// A single straight beam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    #[allow(missing_docs)]
    pub thickness: Normal,
    /// Length as a screen-fraction.
    pub length: Normal,
    #[allow(missing_docs)]
    pub position_x: BipolarNormal,
    #[allow(missing_docs)]
    pub position_y: BipolarNormal,
    /// Rotation about the position, as a unit phase.
    pub rotation: Phase,
    /// Hue, as a unit phase around the color wheel.
    pub color: Normal,
    /// Start of the drawn span, as a fraction of the length.
    pub start: Phase,
    /// End of the drawn span, as a fraction of the length.
    pub stop: Phase,
}
impl Default for Line {
    fn default() -> Self {
        Self {
            thickness: Normal::new(0.25),
            length: Normal::new(0.5),
            position_x: BipolarNormal::ZERO,
            position_y: BipolarNormal::ZERO,
            rotation: Phase::ZERO,
            color: Normal::ZERO,
            start: Phase::ZERO,
            stop: Phase::new(0.999_999_9),
        }
    }
}
impl Line {
    /// Renders the line as a single draw record.
    pub fn render(&self, level: Normal, mask: bool) -> Vec<LineRecord> {
        let (hue, sat, val, level) = if mask {
            (0.0, 0.0, 0, 255)
        } else {
            (
                self.color.val(),
                1.0,
                255,
                (level.val() * 255.0).round() as u32,
            )
        };
        vec![LineRecord {
            level,
            thickness: (self.thickness.val() * THICKNESS_SCALE) as f32,
            hue: hue as f32,
            sat: sat as f32,
            val,
            x: (self.position_x.val() * 0.5) as f32,
            y: (self.position_y.val() * 0.5) as f32,
            length: self.length.val() as f32,
            start: self.start.val() as f32,
            stop: self.stop.val() as f32,
            rot_angle: self.rotation.val() as f32,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_record() {
        let line = Line::default();
        let records = line.render(Normal::new(0.5), false);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, 128);
        assert_eq!(record.val, 255);
        assert!((0.0..1.0).contains(&record.start));
        assert!((0.0..1.0).contains(&record.stop));
    }

    #[test]
    fn masked_line_is_black() {
        let record = &Line::default().render(Normal::ONE, true)[0];
        assert_eq!(record.level, 255);
        assert_eq!(record.val, 0);
    }
}
