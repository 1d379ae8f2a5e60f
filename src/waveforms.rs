// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Pure waveform evaluation. These are the building blocks of the animation
//! engine; they are called for every animator on every segment of every
//! frame, so they allocate nothing and hold no state.
//!
//! Every function shares the same contract:
//!
//! - `phase` is a unit angle; one full cycle spans [0.0, 1.0).
//! - `duty_cycle` gates the wave: a zero duty cycle, or a phase beyond it,
//!   yields 0.0; otherwise the wave is compressed into the active portion of
//!   the cycle.
//! - `smoothing` is a ramp half-width in unit-angle terms, meaningful for the
//!   discontinuous waves (square, sawtooth).
//! - `pulse` selects a unipolar variant on [0.0, 1.0]; the default output is
//!   bipolar on [-1.0, 1.0].

use crate::types::{Normal, Phase};
use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Largest useful smoothing half-width. Beyond this the flat portions of the
/// smoothed waves vanish entirely.
const MAX_SMOOTHING: f64 = 0.5;

/// Apply the duty-cycle gate. Returns the compressed phase if the wave is
/// active at this phase, or None if it is gated off.
#[inline(always)]
fn gate(phase: Phase, duty_cycle: Normal) -> Option<f64> {
    if duty_cycle == 0.0 || phase > duty_cycle {
        return None;
    }
    Some(phase.val() / duty_cycle.val())
}

/// Sine wave. The pulse variant is shifted a quarter-cycle and rescaled so
/// it starts at 0.0 and peaks at 1.0 mid-cycle.
pub fn sine(phase: Phase, _smoothing: Normal, duty_cycle: Normal, pulse: bool) -> f64 {
    let Some(angle) = gate(phase, duty_cycle) else {
        return 0.0;
    };
    if pulse {
        return ((TWO_PI * (angle - 0.25)).sin() + 1.0) / 2.0;
    }
    (TWO_PI * angle).sin()
}

/// Triangle wave with zero crossings at 0.25 and 0.75. The pulse variant
/// rises 0 to 1 and falls back over one cycle, peaking at 0.5.
pub fn triangle(phase: Phase, _smoothing: Normal, duty_cycle: Normal, pulse: bool) -> f64 {
    let Some(angle) = gate(phase, duty_cycle) else {
        return 0.0;
    };
    if pulse {
        return if angle < 0.5 {
            2.0 * angle
        } else {
            2.0 * (1.0 - angle)
        };
    }
    if angle < 0.25 {
        4.0 * angle
    } else if angle > 0.75 {
        4.0 * (angle - 1.0)
    } else {
        2.0 - 4.0 * angle
    }
}

/// Square wave, high for the first half-cycle. Nonzero smoothing replaces
/// the hard transitions at 0, 0.5, and 1 with linear ramps of the given
/// half-width.
pub fn square(phase: Phase, smoothing: Normal, duty_cycle: Normal, pulse: bool) -> f64 {
    let Some(angle) = gate(phase, duty_cycle) else {
        return 0.0;
    };
    if pulse {
        return square(Phase::new(angle / 2.0), smoothing, Normal::ONE, false);
    }
    let s = smoothing.val().min(MAX_SMOOTHING);
    if s == 0.0 {
        return if angle < 0.5 { 1.0 } else { -1.0 };
    }
    if angle < s {
        angle / s
    } else if angle > (0.5 - s) && angle < (0.5 + s) {
        -(angle - 0.5) / s
    } else if angle > (1.0 - s) {
        (angle - 1.0) / s
    } else if angle <= 0.5 - s {
        1.0
    } else {
        -1.0
    }
}

/// Sawtooth wave: a rising ramp from 0 to 1 over the first half-cycle, then
/// from -1 back to 0 over the second. Smoothing rounds the discontinuity at
/// 0.5 with a linear ramp of the given half-width.
pub fn sawtooth(phase: Phase, smoothing: Normal, duty_cycle: Normal, pulse: bool) -> f64 {
    let Some(angle) = gate(phase, duty_cycle) else {
        return 0.0;
    };
    if pulse {
        return sawtooth(Phase::new(angle / 2.0), smoothing, Normal::ONE, false);
    }
    let s = smoothing.val().min(MAX_SMOOTHING);
    if s == 0.0 {
        return if angle < 0.5 {
            2.0 * angle
        } else {
            2.0 * (angle - 1.0)
        };
    }
    if angle < 0.5 - s {
        angle / (0.5 - s)
    } else if angle > 0.5 + s {
        (angle - 1.0) / (0.5 - s)
    } else {
        -(angle - 0.5) / s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Waveform = fn(Phase, Normal, Normal, bool) -> f64;

    const ALL: [Waveform; 4] = [sine, triangle, square, sawtooth];

    fn grid() -> impl Iterator<Item = f64> {
        (0..200).map(|i| i as f64 / 200.0)
    }

    #[test]
    fn periodicity() {
        for f in ALL {
            for p in grid() {
                for pulse in [false, true] {
                    let a = f(Phase::new(p), Normal::new(0.1), Normal::ONE, pulse);
                    let b = f(Phase::new(p + 1.0), Normal::new(0.1), Normal::ONE, pulse);
                    assert!(
                        (a - b).abs() < 1e-9,
                        "periodicity violated at {p} pulse {pulse}"
                    );
                }
            }
        }
    }

    #[test]
    fn output_ranges() {
        for f in ALL {
            for p in grid() {
                for s in [0.0, 0.05, 0.25, 0.5] {
                    for d in [0.25, 0.5, 1.0] {
                        let v = f(Phase::new(p), Normal::new(s), Normal::new(d), false);
                        assert!((-1.0..=1.0).contains(&v), "bipolar out of range: {v}");
                        let v = f(Phase::new(p), Normal::new(s), Normal::new(d), true);
                        assert!((0.0..=1.0).contains(&v), "pulse out of range: {v}");
                    }
                }
            }
        }
    }

    #[test]
    fn zero_duty_cycle_is_silent() {
        for f in ALL {
            for p in grid() {
                assert_eq!(f(Phase::new(p), Normal::ZERO, Normal::ZERO, false), 0.0);
                assert_eq!(f(Phase::new(p), Normal::ZERO, Normal::ZERO, true), 0.0);
            }
        }
    }

    #[test]
    fn duty_cycle_gates_and_compresses() {
        // Beyond the duty cycle the wave is off.
        assert_eq!(sine(Phase::new(0.75), Normal::ZERO, Normal::new(0.5), false), 0.0);
        // Within it, the full wave is compressed into the active portion.
        let compressed = sine(Phase::new(0.125), Normal::ZERO, Normal::new(0.5), false);
        let bare = sine(Phase::new(0.25), Normal::ZERO, Normal::ONE, false);
        assert!((compressed - bare).abs() < 1e-9);
    }

    #[test]
    fn bare_sine_values() {
        let quarter = sine(Phase::new(0.25), Normal::ZERO, Normal::ONE, false);
        assert!((quarter - 1.0).abs() < 1e-9);
        let half = sine(Phase::new(0.5), Normal::ZERO, Normal::ONE, false);
        assert!(half.abs() < 1e-9);
        // Pulse variant starts at zero and peaks mid-cycle.
        assert!(sine(Phase::ZERO, Normal::ZERO, Normal::ONE, true).abs() < 1e-9);
        let peak = sine(Phase::new(0.5), Normal::ZERO, Normal::ONE, true);
        assert!((peak - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bare_triangle_values() {
        assert_eq!(triangle(Phase::ZERO, Normal::ZERO, Normal::ONE, false), 0.0);
        assert_eq!(
            triangle(Phase::new(0.25), Normal::ZERO, Normal::ONE, false),
            1.0
        );
        assert_eq!(
            triangle(Phase::new(0.75), Normal::ZERO, Normal::ONE, false),
            -1.0
        );
        assert_eq!(
            triangle(Phase::new(0.5), Normal::ZERO, Normal::ONE, true),
            1.0
        );
    }

    #[test]
    fn hard_square_values() {
        assert_eq!(square(Phase::new(0.1), Normal::ZERO, Normal::ONE, false), 1.0);
        assert_eq!(square(Phase::new(0.6), Normal::ZERO, Normal::ONE, false), -1.0);
    }

    #[test]
    fn smoothed_square_ramps() {
        let s = Normal::new(0.1);
        // Mid-ramp at the rising edge.
        let v = square(Phase::new(0.05), s, Normal::ONE, false);
        assert!((v - 0.5).abs() < 1e-9);
        // Flat top between ramps.
        assert_eq!(square(Phase::new(0.25), s, Normal::ONE, false), 1.0);
        // Center of the falling edge crosses zero.
        assert!(square(Phase::new(0.5), s, Normal::ONE, false).abs() < 1e-9);
    }

    #[test]
    fn sawtooth_ramp() {
        let v = sawtooth(Phase::new(0.25), Normal::ZERO, Normal::ONE, false);
        assert!((v - 0.5).abs() < 1e-9);
        let v = sawtooth(Phase::new(0.75), Normal::ZERO, Normal::ONE, false);
        assert!((v + 0.5).abs() < 1e-9);
        // Pulse variant is the rising half only.
        let v = sawtooth(Phase::new(0.5), Normal::ZERO, Normal::ONE, true);
        assert!((v - 0.5).abs() < 1e-9);
    }
}
