// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Ellipsoidal tunnels: concentric rings of arc segments with animated
//! geometry and color. The workhorse beam of the whole system.

use crate::{
    clock_bank::ClockBank,
    modulation::{AnimationTarget, ClipModulator},
    snapshot::ArcRecord,
    types::{BipolarNormal, Normal, Phase},
    waveforms,
};
use log::error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Radial units per second of rotation at full knob deflection.
const ROTATION_SPEED_SCALE: f64 = 0.69;

/// Radial units per second of marquee travel at full knob deflection.
const MARQUEE_SPEED_SCALE: f64 = 0.69;

/// Axis ratio at full aspect knob deflection; 0.5 on the knob is a circle.
const MAX_ASPECT: f64 = 2.0;

/// The blacking knob quantizes onto [-MAX_BLACKING, MAX_BLACKING].
const MAX_BLACKING: f64 = 16.0;

/// Stroke width in screen-fraction terms at full thickness knob deflection.
const THICKNESS_SCALE: f64 = 0.3;

/// A parametric ring of arcs. All knobs are unit or bipolar-unit floats so
/// they map directly onto controller hardware; scaling into screen terms
/// happens only when draw records are emitted.
///
/// The marquee and rotation angles accumulate tick over tick from their
/// speed knobs; they are continuous state owned by the tunnel, not derived
/// from the clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunnel {
    rotation_speed: BipolarNormal,
    marquee_speed: BipolarNormal,
    thickness: Normal,
    size: Normal,
    aspect_ratio: Normal,
    /// Hue center, as a unit phase around the color wheel.
    col_center: Normal,
    /// How strongly the per-segment modifier desaturates.
    col_width: Normal,
    /// Amplitude of the hue ramp around the ring.
    col_spread: Normal,
    col_saturation: Normal,
    /// Segment count; always at least 1.
    segments: u16,
    /// Blacking knob; quantized to an integer pattern at render time.
    /// Positive patterns skip segments, negative patterns leave gaps.
    blacking: BipolarNormal,
    position_x: BipolarNormal,
    position_y: BipolarNormal,
    curr_rotation: Phase,
    curr_marquee: Phase,
    animators: ClipModulator,
}
impl Default for Tunnel {
    fn default() -> Self {
        Self {
            rotation_speed: BipolarNormal::ZERO,
            marquee_speed: BipolarNormal::ZERO,
            thickness: Normal::new(0.25),
            size: Normal::new(0.5),
            aspect_ratio: Normal::new(0.5),
            col_center: Normal::ZERO,
            col_width: Normal::ZERO,
            col_spread: Normal::ZERO,
            col_saturation: Normal::ONE,
            segments: 6,
            blacking: BipolarNormal::ZERO,
            position_x: BipolarNormal::ZERO,
            position_y: BipolarNormal::ZERO,
            curr_rotation: Phase::ZERO,
            curr_marquee: Phase::ZERO,
            animators: ClipModulator::default(),
        }
    }
}
impl Tunnel {
    /// The animator bank.
    pub fn animators(&self) -> &ClipModulator {
        &self.animators
    }

    /// The animator bank, mutably; the control plane routes animator
    /// messages through this.
    pub fn animators_mut(&mut self) -> &mut ClipModulator {
        &mut self.animators
    }

    /// The blacking knob as an integer pattern on [-16, 16].
    fn blacking_integer(&self) -> i32 {
        (self.blacking.val() * MAX_BLACKING).round() as i32
    }

    /// The segment count, defended against the forbidden zero. A zero here
    /// is an internal invariant violation: the control mapping never
    /// produces one.
    fn segment_count(&self) -> u16 {
        debug_assert!(self.segments >= 1, "tunnel segment count must be >= 1");
        if self.segments < 1 {
            error!("Tunnel segment count was 0; clamping to 1.");
            1
        } else {
            self.segments
        }
    }

    /// True if segment `i` is removed by the blacking pattern.
    fn blacked(&self, i: u16) -> bool {
        let b = self.blacking_integer();
        match b.signum() {
            0 => false,
            // Positive patterns remove every (b+1)-th segment.
            1 => (i as i32 + 1) % (b + 1) == 0,
            // Negative patterns draw only every (|b|+1)-th segment.
            _ => i as i32 % (-b + 1) != 0,
        }
    }

    /// Advances the animator bank and integrates the rotation and marquee
    /// angles. Knob speeds integrate over wall time; modulation from the
    /// Rotation and Marquee targets integrates over master-clock beats, so a
    /// clock-locked animator advances the angle by exactly the integral of
    /// its value in beat time.
    pub fn update_state(&mut self, delta_t: Duration, external_clocks: &ClockBank) {
        self.animators.update_state(delta_t);
        let table = self.animators.modulation(Phase::ZERO, external_clocks);
        let secs = delta_t.as_secs_f64();
        let beats = external_clocks.master_beats(delta_t);
        self.curr_rotation += self.rotation_speed.val() * ROTATION_SPEED_SCALE * secs
            + table.get(AnimationTarget::Rotation) * beats;
        self.curr_marquee += self.marquee_speed.val() * MARQUEE_SPEED_SCALE * secs
            + table.get(AnimationTarget::Marquee) * beats;
    }

    /// Computes one frame of arcs at the given draw level.
    ///
    /// When `mask` is set the arcs are emitted as full-level black cutouts;
    /// geometry still animates so a mask layer moves like the beam it hides.
    pub fn render(
        &self,
        level: Normal,
        mask: bool,
        external_clocks: &ClockBank,
    ) -> Vec<ArcRecord> {
        let segments = self.segment_count();
        let seg_width = 1.0 / f64::from(segments);
        let mut arcs = Vec::with_capacity(segments as usize);

        for i in 0..segments {
            if self.blacked(i) {
                continue;
            }
            // The segment's rest phase: where it sits on the ring before
            // marquee travel. Spatially-aware animators key off this.
            let rest_phase = Phase::new(f64::from(i) * seg_width);
            let table = self.animators.modulation(rest_phase, external_clocks);

            let thickness = Normal::new(self.thickness.val() + table.get(AnimationTarget::Thickness));
            let size = Normal::new(self.size.val() + table.get(AnimationTarget::Size));
            let aspect = Normal::new(
                self.aspect_ratio.val() + table.get(AnimationTarget::AspectRatio),
            )
            .val()
                * MAX_ASPECT;

            let start = self.curr_marquee + rest_phase.val();
            let stop = start + seg_width * thickness.val();

            let stroke = thickness.val() * THICKNESS_SCALE;
            let rad_y = (size.val() - stroke / 2.0).max(0.0);
            let rad_x = (size.val() * aspect - stroke / 2.0).max(0.0);

            let x = BipolarNormal::new(
                self.position_x.val() + table.get(AnimationTarget::PositionX),
            )
            .val()
                * 0.5;
            let y = BipolarNormal::new(
                self.position_y.val() + table.get(AnimationTarget::PositionY),
            )
            .val()
                * 0.5;

            let (hue, sat, val, level) = if mask {
                (Phase::ZERO, Normal::ZERO, 0, 255)
            } else {
                (
                    self.segment_hue(rest_phase, &table),
                    self.segment_saturation(rest_phase, &table),
                    255,
                    (level.val() * 255.0).round() as u32,
                )
            };

            arcs.push(ArcRecord {
                level,
                thickness: stroke as f32,
                hue: hue.val() as f32,
                sat: sat.val() as f32,
                val,
                x: x as f32,
                y: y as f32,
                rad_x: rad_x as f32,
                rad_y: rad_y as f32,
                start: start.val() as f32,
                stop: stop.val() as f32,
                rot_angle: self.curr_rotation.val() as f32,
            });
        }
        arcs
    }

    /// The hue of a segment: the color center plus a sawtooth ramp around
    /// the ring, with amplitude from the spread knob and frequency scalable
    /// by the ColorPeriodicity target. Wraps around the color wheel.
    fn segment_hue(
        &self,
        rest_phase: Phase,
        table: &crate::modulation::ModulationTable,
    ) -> Phase {
        let spread = Normal::new(self.col_spread.val() + table.get(AnimationTarget::ColorSpread));
        let periods = (1.0 + table.get(AnimationTarget::ColorPeriodicity)).max(0.0);
        let ramp = waveforms::sawtooth(rest_phase * periods, Normal::ZERO, Normal::ONE, false);
        Phase::new(
            self.col_center.val()
                + table.get(AnimationTarget::Color)
                + 0.5 * spread.val() * ramp,
        )
    }

    /// The saturation of a segment: the saturation knob (plus modulation),
    /// desaturated per-segment by the width knob through a pulsed triangle.
    fn segment_saturation(
        &self,
        rest_phase: Phase,
        table: &crate::modulation::ModulationTable,
    ) -> Normal {
        let base = Normal::new(
            self.col_saturation.val() + table.get(AnimationTarget::ColorSaturation),
        );
        let modifier = waveforms::triangle(rest_phase, Normal::ZERO, Normal::ONE, true);
        Normal::new(base.val() * (1.0 - self.col_width.val() * modifier))
    }

    /// Emits the current value of all controllable tunnel state.
    pub fn emit_state<E: EmitStateChange>(&self, emitter: &mut E) {
        use StateChange::*;
        emitter.emit_tunnel_state_change(RotationSpeed(self.rotation_speed));
        emitter.emit_tunnel_state_change(MarqueeSpeed(self.marquee_speed));
        emitter.emit_tunnel_state_change(Thickness(self.thickness));
        emitter.emit_tunnel_state_change(Size(self.size));
        emitter.emit_tunnel_state_change(AspectRatio(self.aspect_ratio));
        emitter.emit_tunnel_state_change(ColorCenter(self.col_center));
        emitter.emit_tunnel_state_change(ColorWidth(self.col_width));
        emitter.emit_tunnel_state_change(ColorSpread(self.col_spread));
        emitter.emit_tunnel_state_change(ColorSaturation(self.col_saturation));
        emitter.emit_tunnel_state_change(Segments(self.segments));
        emitter.emit_tunnel_state_change(Blacking(self.blacking));
        emitter.emit_tunnel_state_change(PositionX(self.position_x));
        emitter.emit_tunnel_state_change(PositionY(self.position_y));
    }

    /// Handles a control event, emitting any state changes that result.
    pub fn control<E: EmitStateChange>(&mut self, msg: ControlMessage, emitter: &mut E) {
        use ControlMessage::*;
        match msg {
            Set(sc) => self.handle_state_change(sc, emitter),
            ResetPosition => {
                self.handle_state_change(StateChange::PositionX(BipolarNormal::ZERO), emitter);
                self.handle_state_change(StateChange::PositionY(BipolarNormal::ZERO), emitter);
            }
            ResetRotation => {
                self.curr_rotation = Phase::ZERO;
            }
            ResetMarquee => {
                self.curr_marquee = Phase::ZERO;
            }
        }
    }

    fn handle_state_change<E: EmitStateChange>(&mut self, sc: StateChange, emitter: &mut E) {
        use StateChange::*;
        match sc {
            RotationSpeed(v) => self.rotation_speed = v,
            MarqueeSpeed(v) => self.marquee_speed = v,
            Thickness(v) => self.thickness = v,
            Size(v) => self.size = v,
            AspectRatio(v) => self.aspect_ratio = v,
            ColorCenter(v) => self.col_center = v,
            ColorWidth(v) => self.col_width = v,
            ColorSpread(v) => self.col_spread = v,
            ColorSaturation(v) => self.col_saturation = v,
            Segments(v) => self.segments = v.max(1),
            Blacking(v) => self.blacking = v,
            PositionX(v) => self.position_x = v,
            PositionY(v) => self.position_y = v,
        };
        emitter.emit_tunnel_state_change(sc);
    }
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum StateChange {
    RotationSpeed(BipolarNormal),
    MarqueeSpeed(BipolarNormal),
    Thickness(Normal),
    Size(Normal),
    AspectRatio(Normal),
    ColorCenter(Normal),
    ColorWidth(Normal),
    ColorSpread(Normal),
    ColorSaturation(Normal),
    Segments(u16),
    Blacking(BipolarNormal),
    PositionX(BipolarNormal),
    PositionY(BipolarNormal),
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum ControlMessage {
    Set(StateChange),
    /// Recenter the beam.
    ResetPosition,
    ResetRotation,
    ResetMarquee,
}

#[allow(missing_docs)]
pub trait EmitStateChange {
    fn emit_tunnel_state_change(&mut self, sc: StateChange);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{
        ClockSourceExt, ControlMessage as AnimatorControlMessage,
        StateChange as AnimatorStateChange,
    };
    use crate::modulation::{
        AnimatorIdx, ControlMessage as SlotControlMessage, StateChange as SlotStateChange,
    };
    use crate::types::Normal;

    struct NullEmitter;
    impl crate::show::EmitStateChange for NullEmitter {
        fn emit(&mut self, _: crate::show::StateChange) {}
    }

    fn set(tunnel: &mut Tunnel, sc: StateChange) {
        tunnel.control(ControlMessage::Set(sc), &mut NullEmitter);
    }

    /// A static six-segment tunnel renders evenly spaced arcs whose span is
    /// the segment width scaled by the thickness knob.
    #[test]
    fn static_tunnel_geometry() {
        let clocks = ClockBank::default();
        let mut tunnel = Tunnel::default();
        set(&mut tunnel, StateChange::Segments(6));
        set(&mut tunnel, StateChange::Thickness(Normal::new(0.5)));
        set(&mut tunnel, StateChange::ColorCenter(Normal::ZERO));
        set(&mut tunnel, StateChange::Size(Normal::new(0.25)));

        let arcs = tunnel.render(Normal::ONE, false, &clocks);
        assert_eq!(arcs.len(), 6);
        for (k, arc) in arcs.iter().enumerate() {
            let expected_start = k as f32 / 6.0;
            assert!((arc.start - expected_start).abs() < 1e-6);
            let span = (arc.stop - arc.start).rem_euclid(1.0);
            assert!((span - 0.5 / 6.0).abs() < 1e-6, "span {span}");
            assert_eq!(arc.rot_angle, 0.0);
            assert_eq!(arc.level, 255);
            assert!((0.0..1.0).contains(&arc.start));
            assert!((0.0..1.0).contains(&arc.stop));
        }
    }

    #[test]
    fn all_phases_stay_in_range() {
        let clocks = ClockBank::default();
        let mut tunnel = Tunnel::default();
        set(&mut tunnel, StateChange::Segments(17));
        set(&mut tunnel, StateChange::MarqueeSpeed(BipolarNormal::new(0.7)));
        set(&mut tunnel, StateChange::ColorSpread(Normal::ONE));
        set(&mut tunnel, StateChange::ColorCenter(Normal::new(0.9)));
        for _ in 0..50 {
            tunnel.update_state(Duration::from_millis(17), &clocks);
            for arc in tunnel.render(Normal::ONE, false, &clocks) {
                for phase in [arc.start, arc.stop, arc.hue, arc.rot_angle] {
                    assert!((0.0..1.0).contains(&phase), "phase {phase} out of range");
                }
            }
        }
    }

    #[test]
    fn positive_blacking_skips_alternate_segments() {
        let clocks = ClockBank::default();
        let mut tunnel = Tunnel::default();
        set(&mut tunnel, StateChange::Segments(8));
        // Knob value that quantizes to a pattern integer of 1.
        set(&mut tunnel, StateChange::Blacking(BipolarNormal::new(1.0 / 16.0)));
        let arcs = tunnel.render(Normal::ONE, false, &clocks);
        assert_eq!(arcs.len(), 4);
        // The survivors are the even-indexed segments.
        for (n, arc) in arcs.iter().enumerate() {
            let expected_start = (2 * n) as f32 / 8.0;
            assert!((arc.start - expected_start).abs() < 1e-6);
        }
    }

    #[test]
    fn negative_blacking_draws_sparse_segments() {
        let clocks = ClockBank::default();
        let mut tunnel = Tunnel::default();
        set(&mut tunnel, StateChange::Segments(9));
        // Quantizes to -2: draw only every third segment.
        set(&mut tunnel, StateChange::Blacking(BipolarNormal::new(-2.0 / 16.0)));
        let arcs = tunnel.render(Normal::ONE, false, &clocks);
        assert_eq!(arcs.len(), 3);
    }

    #[test]
    fn zero_segments_clamps_to_one_in_release() {
        let clocks = ClockBank::default();
        let mut tunnel = Tunnel::default();
        set(&mut tunnel, StateChange::Segments(0));
        // The setter clamps, so rendering still yields one arc.
        assert_eq!(tunnel.render(Normal::ONE, false, &clocks).len(), 1);
    }

    #[test]
    fn masked_render_is_black_cutout() {
        let clocks = ClockBank::default();
        let tunnel = Tunnel::default();
        for arc in tunnel.render(Normal::new(0.5), true, &clocks) {
            assert_eq!(arc.level, 255);
            assert_eq!(arc.val, 0);
            assert_eq!(arc.sat, 0.0);
        }
    }

    /// A clock-locked sine animator driving rotation advances the rotation
    /// angle by the integral of its value over beat time.
    #[test]
    fn modulated_rotation_integrates_sine() {
        let mut clocks = ClockBank::default();
        let mut tunnel = Tunnel::default();

        let bank = tunnel.animators_mut();
        bank.control_animator(
            AnimatorIdx(0),
            AnimatorControlMessage::Set(AnimatorStateChange::Weight(Normal::new(0.5))),
            &mut NullEmitter,
        );
        bank.control_animator(
            AnimatorIdx(0),
            AnimatorControlMessage::SetClockSource(Some(ClockSourceExt::Master)),
            &mut NullEmitter,
        );
        bank.control_slot(
            AnimatorIdx(0),
            SlotControlMessage::Set(SlotStateChange::Target(AnimationTarget::Rotation)),
            &mut NullEmitter,
        );

        // Step through a quarter beat (master runs at 2 beats/sec) in fine
        // ticks.
        let dt = Duration::from_millis(1);
        for _ in 0..125 {
            clocks.update_state(dt, &mut NullEmitter);
            tunnel.update_state(dt, &clocks);
        }

        // integral of 0.5 sin(2 pi p) dp over [0, 1/4] beats
        let expected = 0.5 * (1.0 - (std::f64::consts::PI / 2.0).cos())
            / (2.0 * std::f64::consts::PI);
        let arcs = tunnel.render(Normal::ONE, false, &clocks);
        let got = arcs[0].rot_angle as f64;
        assert!(
            (got - expected).abs() < 0.01,
            "rot angle {got}, expected {expected}"
        );
    }
}
