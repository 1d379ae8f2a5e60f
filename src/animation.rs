// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The animator: a parameterized waveform that emits a scalar modulation
//! value each tick. Animators are plain data; the modulator bank that owns
//! them decides which beam parameter each one drives.

use crate::{
    clock::{Clock, ControllableClock},
    clock_bank::{ClockBank, ClockIdxExt, ClockSource},
    types::{BipolarNormal, Normal, Phase},
    waveforms,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{Display, EnumIter, FromRepr, IntoStaticStr};

/// The available waveform shapes.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    EnumIter,
    FromRepr,
    PartialEq,
    Eq,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Waveform {
    #[default]
    #[allow(missing_docs)]
    Sine,
    #[allow(missing_docs)]
    Triangle,
    #[allow(missing_docs)]
    Square,
    #[allow(missing_docs)]
    Sawtooth,
}
impl Waveform {
    fn eval(&self, phase: Phase, smoothing: Normal, duty_cycle: Normal, pulse: bool) -> f64 {
        match self {
            Self::Sine => waveforms::sine(phase, smoothing, duty_cycle, pulse),
            Self::Triangle => waveforms::triangle(phase, smoothing, duty_cycle, pulse),
            Self::Square => waveforms::square(phase, smoothing, duty_cycle, pulse),
            Self::Sawtooth => waveforms::sawtooth(phase, smoothing, duty_cycle, pulse),
        }
    }
}

/// A stateful oscillator. Per tick it emits
/// `weight * f(n_periods * spatial + phase, smoothing, duty_cycle, pulse)`,
/// where the temporal phase comes either from its own free-running clock or,
/// when clock-locked, from one of the show's shared clocks.
///
/// The only mutable state an animator carries across ticks is the free-run
/// phase accumulator inside its internal clock; everything else is a knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Animator {
    waveform: Waveform,
    pulse: bool,
    invert: bool,
    /// Spatial periodicity: how many wave cycles wrap around the ring.
    n_periods: u16,
    weight: Normal,
    /// Ramp half-width for the discontinuous waves, on [0, 0.5].
    smoothing: Normal,
    duty_cycle: Normal,
    internal_clock: Clock,
    clock_source: Option<ClockSource>,
}
impl Default for Animator {
    fn default() -> Self {
        Self {
            waveform: Waveform::default(),
            pulse: false,
            invert: false,
            n_periods: 0,
            weight: Normal::ZERO,
            smoothing: Normal::new(0.125),
            duty_cycle: Normal::ONE,
            internal_clock: Clock::new(),
            clock_source: None,
        }
    }
}
impl Animator {
    /// How far a single phase nudge moves the free-run accumulator.
    const NUDGE: f64 = 1.0 / 16.0;

    /// True if this animator contributes anything.
    pub fn active(&self) -> bool {
        self.weight > 0.0
    }

    #[allow(missing_docs)]
    pub fn weight(&self) -> Normal {
        self.weight
    }

    /// The temporal phase reference for this tick.
    fn phase(&self, external_clocks: &ClockBank) -> Phase {
        match self.clock_source {
            None => self.internal_clock.phase(),
            Some(source) => external_clocks.phase(source),
        }
    }

    /// The free-run speed knob position.
    fn speed(&self) -> BipolarNormal {
        BipolarNormal::new(self.internal_clock.rate / ControllableClock::RATE_SCALE)
    }

    fn set_speed(&mut self, speed: BipolarNormal) {
        self.internal_clock.rate = speed.val() * ControllableClock::RATE_SCALE;
    }

    /// Advances the free-run phase accumulator.
    pub fn update_state(&mut self, delta_t: Duration) {
        if self.active() {
            self.internal_clock.update_state(delta_t);
        }
    }

    /// The animator's current value at the given spatial phase offset.
    pub fn value(&self, spatial_phase: Phase, external_clocks: &ClockBank) -> f64 {
        if !self.active() {
            return 0.0;
        }
        let angle = spatial_phase * f64::from(self.n_periods) + self.phase(external_clocks);
        let mut result = self.weight.val()
            * self
                .waveform
                .eval(angle, self.smoothing, self.duty_cycle, self.pulse);
        // Clock-locked animators are scaled by their clock's submaster level.
        if let Some(source) = self.clock_source {
            result *= external_clocks.submaster_level(source).val();
        }
        if self.invert {
            -result
        } else {
            result
        }
    }

    /// Emits the current value of all controllable animator state.
    pub fn emit_state<E: EmitStateChange>(&self, emitter: &mut E) {
        use StateChange::*;
        emitter.emit_animator_state_change(Waveform(self.waveform));
        emitter.emit_animator_state_change(Pulse(self.pulse));
        emitter.emit_animator_state_change(Invert(self.invert));
        emitter.emit_animator_state_change(NPeriods(self.n_periods));
        emitter.emit_animator_state_change(Speed(self.speed()));
        emitter.emit_animator_state_change(Weight(self.weight));
        emitter.emit_animator_state_change(DutyCycle(self.duty_cycle));
        emitter.emit_animator_state_change(Smoothing(self.smoothing));
        emitter.emit_animator_state_change(ClockSource(self.clock_source));
    }

    /// Handles a control event, emitting any state changes that result.
    pub fn control<E: EmitStateChange>(&mut self, msg: ControlMessage, emitter: &mut E) {
        use ControlMessage::*;
        match msg {
            Set(sc) => self.handle_state_change(sc, emitter),
            SetClockSource(source) => {
                let source = match source {
                    Some(ClockSourceExt::Master) => Some(ClockSource::Master),
                    Some(ClockSourceExt::Aux(ext)) => match ext.try_into() {
                        Ok(idx) => Some(ClockSource::Aux(idx)),
                        Err(e) => {
                            log::error!("could not process animator control message: {e}");
                            return;
                        }
                    },
                    None => None,
                };
                self.handle_state_change(StateChange::ClockSource(source), emitter);
            }
            TogglePulse => {
                self.pulse = !self.pulse;
                emitter.emit_animator_state_change(StateChange::Pulse(self.pulse));
            }
            ToggleInvert => {
                self.invert = !self.invert;
                emitter.emit_animator_state_change(StateChange::Invert(self.invert));
            }
            NudgePhase(direction) => {
                self.internal_clock.phase_nudge(direction.val() * Self::NUDGE);
            }
            ResetPhase => {
                self.internal_clock.reset();
            }
        }
    }

    fn handle_state_change<E: EmitStateChange>(&mut self, sc: StateChange, emitter: &mut E) {
        use StateChange::*;
        match sc {
            Waveform(v) => self.waveform = v,
            Pulse(v) => self.pulse = v,
            Invert(v) => self.invert = v,
            NPeriods(v) => self.n_periods = v,
            Speed(v) => self.set_speed(v),
            Weight(v) => self.weight = v,
            DutyCycle(v) => self.duty_cycle = v,
            Smoothing(v) => self.smoothing = Normal::new(v.val().min(0.5)),
            ClockSource(v) => self.clock_source = v,
        };
        emitter.emit_animator_state_change(sc);
    }
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum StateChange {
    Waveform(Waveform),
    Pulse(bool),
    Invert(bool),
    NPeriods(u16),
    Speed(BipolarNormal),
    Weight(Normal),
    DutyCycle(Normal),
    Smoothing(Normal),
    ClockSource(Option<ClockSource>),
}

/// Unvalidated clock source, as it arrives from a controller.
#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum ClockSourceExt {
    Master,
    Aux(ClockIdxExt),
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum ControlMessage {
    Set(StateChange),
    /// Clock indexes need validation, so this path handles the fallible case.
    SetClockSource(Option<ClockSourceExt>),
    TogglePulse,
    ToggleInvert,
    /// Shift the free-run phase by a fraction of a nudge unit.
    NudgePhase(BipolarNormal),
    /// Snap the free-run phase back to zero.
    ResetPhase,
}

#[allow(missing_docs)]
pub trait EmitStateChange {
    fn emit_animator_state_change(&mut self, sc: StateChange);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEmitter;
    impl crate::show::EmitStateChange for NullEmitter {
        fn emit(&mut self, _: crate::show::StateChange) {}
    }

    fn set(animator: &mut Animator, sc: StateChange) {
        animator.control(ControlMessage::Set(sc), &mut NullEmitter);
    }

    #[test]
    fn zero_weight_is_inert() {
        let animator = Animator::default();
        let clocks = ClockBank::default();
        assert!(!animator.active());
        assert_eq!(animator.value(Phase::ZERO, &clocks), 0.0);
    }

    #[test]
    fn clock_locked_animator_follows_master() {
        let mut animator = Animator::default();
        set(&mut animator, StateChange::Weight(Normal::ONE));
        animator.control(
            ControlMessage::SetClockSource(Some(ClockSourceExt::Master)),
            &mut NullEmitter,
        );
        let mut clocks = ClockBank::default();
        // Run the master to a quarter beat; sine there is at its peak.
        clocks.update_state(Duration::from_millis(125), &mut NullEmitter);
        let v = animator.value(Phase::ZERO, &clocks);
        assert!((v - 1.0).abs() < 1e-9, "value {v}");
    }

    #[test]
    fn free_run_accumulates_speed() {
        let mut animator = Animator::default();
        set(&mut animator, StateChange::Weight(Normal::ONE));
        set(&mut animator, StateChange::Speed(BipolarNormal::new(-1.0)));
        let clocks = ClockBank::default();
        // Rate is -1.0 * RATE_SCALE = 1.5 Hz; a sixth of a second is a
        // quarter cycle.
        animator.update_state(Duration::from_secs_f64(1.0 / 6.0));
        let v = animator.value(Phase::ZERO, &clocks);
        assert!((v - 1.0).abs() < 1e-9, "value {v}");
    }

    #[test]
    fn invert_flips_sign() {
        let mut animator = Animator::default();
        set(&mut animator, StateChange::Weight(Normal::ONE));
        set(&mut animator, StateChange::Speed(BipolarNormal::new(-1.0)));
        animator.control(ControlMessage::ToggleInvert, &mut NullEmitter);
        let clocks = ClockBank::default();
        animator.update_state(Duration::from_secs_f64(1.0 / 6.0));
        assert!((animator.value(Phase::ZERO, &clocks) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn spatial_periodicity_offsets_phase() {
        let mut animator = Animator::default();
        set(&mut animator, StateChange::Weight(Normal::ONE));
        set(&mut animator, StateChange::NPeriods(1));
        let clocks = ClockBank::default();
        let quarter = animator.value(Phase::new(0.25), &clocks);
        assert!((quarter - 1.0).abs() < 1e-9);
    }
}
