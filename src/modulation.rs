// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The clip modulator: a beam's bank of animators, the targets they drive,
//! and the rules for mixing several animators onto one parameter.
//!
//! Animators themselves are plain data (see [crate::animation]); the owning
//! beam evaluates its bank against its own parameter set, so there are no
//! back-references from animators to beams.

use crate::{
    animation::{
        Animator, ControlMessage as AnimatorControlMessage,
        EmitStateChange as EmitAnimatorStateChange,
    },
    clock_bank::ClockBank,
    types::Phase,
};
use serde::{Deserialize, Serialize};
use strum::EnumCount;
use strum_macros::{Display, EnumCount as EnumCountMacro, EnumIter, FromRepr, IntoStaticStr};
use std::time::Duration;

/// How many animators each beam carries.
pub const ANIMATOR_COUNT: usize = 4;

/// Index of an animator slot within a bank.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AnimatorIdx(pub usize);

/// The beam parameters an animator can drive. `None` parks the animator.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    EnumCountMacro,
    EnumIter,
    FromRepr,
    PartialEq,
    Eq,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[allow(missing_docs)]
pub enum AnimationTarget {
    #[default]
    None,
    Rotation,
    Thickness,
    Size,
    AspectRatio,
    Color,
    ColorSpread,
    ColorPeriodicity,
    ColorSaturation,
    Marquee,
    PositionX,
    PositionY,
}

/// How an animator's output combines with earlier contributions to the same
/// target. The first contributor to a target always seeds the value.
#[derive(Clone, Copy, Debug, Default, Display, EnumIter, FromRepr, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[allow(missing_docs)]
pub enum MixMode {
    #[default]
    Sum,
    Max,
    Multiply,
}

/// One slot in the bank: an animator, where it points, and how it mixes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimatorSlot {
    #[allow(missing_docs)]
    pub animator: Animator,
    #[allow(missing_docs)]
    pub target: AnimationTarget,
    #[allow(missing_docs)]
    pub mix: MixMode,
}

/// The modulation produced by one bank evaluation, keyed by target.
///
/// Targets nothing contributed to resolve to 0.0, which is the identity
/// modulation for every parameter kind.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ModulationTable([Option<f64>; AnimationTarget::COUNT]);
impl ModulationTable {
    /// The summed modulation for the given target.
    pub fn get(&self, target: AnimationTarget) -> f64 {
        self.0[target as usize].unwrap_or(0.0)
    }

    fn fold(&mut self, target: AnimationTarget, mix: MixMode, value: f64) {
        let cell = &mut self.0[target as usize];
        *cell = Some(match (*cell, mix) {
            (None, _) => value,
            (Some(acc), MixMode::Sum) => acc + value,
            (Some(acc), MixMode::Max) => acc.max(value),
            (Some(acc), MixMode::Multiply) => acc * value,
        });
    }
}

/// An ordered bank of [ANIMATOR_COUNT] animators attached to one beam.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipModulator {
    slots: [AnimatorSlot; ANIMATOR_COUNT],
}
impl ClipModulator {
    /// Advances every animator's free-run state.
    pub fn update_state(&mut self, delta_t: Duration) {
        for slot in &mut self.slots {
            slot.animator.update_state(delta_t);
        }
    }

    /// Evaluates the whole bank at a spatial phase offset, producing the
    /// modulation table for this instant. Parked and zero-weight animators
    /// are skipped.
    pub fn modulation(&self, spatial_phase: Phase, clocks: &ClockBank) -> ModulationTable {
        let mut table = ModulationTable::default();
        for slot in &self.slots {
            if slot.target == AnimationTarget::None || !slot.animator.active() {
                continue;
            }
            let value = slot.animator.value(spatial_phase, clocks);
            table.fold(slot.target, slot.mix, value);
        }
        table
    }

    #[allow(missing_docs)]
    pub fn animator(&self, idx: AnimatorIdx) -> &AnimatorSlot {
        &self.slots[idx.0 % ANIMATOR_COUNT]
    }

    #[allow(missing_docs)]
    pub fn animator_mut(&mut self, idx: AnimatorIdx) -> &mut AnimatorSlot {
        &mut self.slots[idx.0 % ANIMATOR_COUNT]
    }

    /// Replaces a slot wholesale, for clipboard paste.
    pub fn replace(&mut self, idx: AnimatorIdx, slot: AnimatorSlot) {
        self.slots[idx.0 % ANIMATOR_COUNT] = slot;
    }

    /// Routes an animator control message to the selected slot.
    pub fn control_animator<E: EmitAnimatorStateChange>(
        &mut self,
        idx: AnimatorIdx,
        msg: AnimatorControlMessage,
        emitter: &mut E,
    ) {
        self.animator_mut(idx).animator.control(msg, emitter);
    }

    /// Handles a slot-level control message for the selected slot.
    pub fn control_slot<E: EmitStateChange>(
        &mut self,
        idx: AnimatorIdx,
        msg: ControlMessage,
        emitter: &mut E,
    ) {
        let slot = self.animator_mut(idx);
        match msg {
            ControlMessage::Set(sc) => {
                match sc {
                    StateChange::Target(t) => slot.target = t,
                    StateChange::Mix(m) => slot.mix = m,
                }
                emitter.emit_modulator_state_change(sc);
            }
        }
    }

    /// Emits the slot-level state (target, mix) plus the animator state for
    /// the selected slot.
    pub fn emit_slot_state<E: EmitStateChange + EmitAnimatorStateChange>(
        &self,
        idx: AnimatorIdx,
        emitter: &mut E,
    ) {
        let slot = self.animator(idx);
        emitter.emit_modulator_state_change(StateChange::Target(slot.target));
        emitter.emit_modulator_state_change(StateChange::Mix(slot.mix));
        slot.animator.emit_state(emitter);
    }
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum StateChange {
    Target(AnimationTarget),
    Mix(MixMode),
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum ControlMessage {
    Set(StateChange),
}

#[allow(missing_docs)]
pub trait EmitStateChange {
    fn emit_modulator_state_change(&mut self, sc: StateChange);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::StateChange as AnimatorStateChangeTest;
    use crate::types::Normal;

    struct NullEmitter;
    impl crate::show::EmitStateChange for NullEmitter {
        fn emit(&mut self, _: crate::show::StateChange) {}
    }

    fn activated(bank: &mut ClipModulator, idx: usize, target: AnimationTarget, weight: f64) {
        bank.control_animator(
            AnimatorIdx(idx),
            AnimatorControlMessage::Set(AnimatorStateChangeTest::Weight(Normal::new(weight))),
            &mut NullEmitter,
        );
        bank.control_slot(
            AnimatorIdx(idx),
            ControlMessage::Set(StateChange::Target(target)),
            &mut NullEmitter,
        );
    }

    #[test]
    fn empty_bank_is_identity() {
        let bank = ClipModulator::default();
        let clocks = ClockBank::default();
        let table = bank.modulation(Phase::ZERO, &clocks);
        use strum::IntoEnumIterator;
        for target in AnimationTarget::iter() {
            assert_eq!(table.get(target), 0.0);
        }
    }

    #[test]
    fn zero_weight_animators_sum_to_zero() {
        let mut bank = ClipModulator::default();
        let clocks = ClockBank::default();
        // Target all four animators at the same parameter but leave their
        // weights at zero.
        for i in 0..ANIMATOR_COUNT {
            bank.control_slot(
                AnimatorIdx(i),
                ControlMessage::Set(StateChange::Target(AnimationTarget::Thickness)),
                &mut NullEmitter,
            );
        }
        let table = bank.modulation(Phase::new(0.3), &clocks);
        assert_eq!(table.get(AnimationTarget::Thickness), 0.0);
    }

    #[test]
    fn same_target_contributions_sum() {
        let mut bank = ClipModulator::default();
        let clocks = ClockBank::default();
        activated(&mut bank, 0, AnimationTarget::Size, 0.5);
        activated(&mut bank, 1, AnimationTarget::Size, 0.25);
        // Sine at phase zero is zero; shift a quarter period spatially.
        bank.control_animator(
            AnimatorIdx(0),
            AnimatorControlMessage::Set(AnimatorStateChangeTest::NPeriods(1)),
            &mut NullEmitter,
        );
        bank.control_animator(
            AnimatorIdx(1),
            AnimatorControlMessage::Set(AnimatorStateChangeTest::NPeriods(1)),
            &mut NullEmitter,
        );
        let table = bank.modulation(Phase::new(0.25), &clocks);
        assert!((table.get(AnimationTarget::Size) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn max_mix_picks_larger_contribution() {
        let mut bank = ClipModulator::default();
        let clocks = ClockBank::default();
        activated(&mut bank, 0, AnimationTarget::Thickness, 0.25);
        activated(&mut bank, 1, AnimationTarget::Thickness, 1.0);
        for i in 0..2 {
            bank.control_animator(
                AnimatorIdx(i),
                AnimatorControlMessage::Set(AnimatorStateChangeTest::NPeriods(1)),
                &mut NullEmitter,
            );
        }
        bank.control_slot(
            AnimatorIdx(1),
            ControlMessage::Set(StateChange::Mix(MixMode::Max)),
            &mut NullEmitter,
        );
        let table = bank.modulation(Phase::new(0.25), &clocks);
        assert!((table.get(AnimationTarget::Thickness) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn parked_animators_do_not_contribute() {
        let mut bank = ClipModulator::default();
        let clocks = ClockBank::default();
        bank.control_animator(
            AnimatorIdx(0),
            AnimatorControlMessage::Set(AnimatorStateChangeTest::Weight(Normal::ONE)),
            &mut NullEmitter,
        );
        let table = bank.modulation(Phase::new(0.25), &clocks);
        use strum::IntoEnumIterator;
        for target in AnimationTarget::iter() {
            assert_eq!(table.get(target), 0.0);
        }
    }
}
