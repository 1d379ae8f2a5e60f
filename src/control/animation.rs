// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Bindings between control surfaces and the selected animator slot.

use super::{
    bipolar_from_midi, bipolar_to_midi, quadratic_knob_input, quadratic_knob_output,
    unipolar_from_midi, unipolar_to_midi, ControlMap, Device, MapperControlMessage,
    MapperStateChange, RadioButtons,
};
use crate::{
    animation::{
        ClockSourceExt, ControlMessage, StateChange, Waveform,
    },
    clock_bank::{ClockIdx, ClockIdxExt, N_CLOCKS},
    midi::{cc_ch0, event, note_on_ch0, Manager},
    modulation::{
        AnimationTarget, AnimatorIdx, ControlMessage as SlotControlMessage, MixMode,
        StateChange as SlotStateChange, ANIMATOR_COUNT,
    },
    osc::OscDevice,
    show::ControlMessage as ShowControlMessage,
    types::{BipolarNormal, Normal},
};
use strum::IntoEnumIterator;

// Animator knobs, top of the upper bank.
const SPEED: u8 = 48;
const WEIGHT: u8 = 49;
const DUTY_CYCLE: u8 = 50;
const SMOOTHING: u8 = 51;

/// Waveform select buttons start here, one per waveform.
const WAVEFORM_SELECT_0: u8 = 24;

/// Pulse/invert/phase buttons.
const PULSE: u8 = 28;
const INVERT: u8 = 29;
const RESET_PHASE: u8 = 30;

/// Target select buttons start here, one per (non-None) target.
const TARGET_SELECT_0: u8 = 35;

/// Mix mode radio buttons.
const MIX_SELECT_0: u8 = 100;

/// Clock source select: none, master, then one per aux clock.
const CLOCK_SOURCE_NONE: u8 = 108;
const CLOCK_SOURCE_MASTER: u8 = 109;
const CLOCK_SOURCE_AUX_0: u8 = 110;

/// Animator bank select buttons.
pub const ANIMATOR_SELECT_0: u8 = 0x57;

pub fn map_animator_controls(device: Device, map: &mut ControlMap) {
    use StateChange::*;
    let mut add = |mapping, creator| map.add(device, mapping, creator);

    add(
        cc_ch0(SPEED),
        Box::new(|v| animator_msg(Speed(quadratic_knob_input(bipolar_from_midi(v))))),
    );
    add(
        cc_ch0(WEIGHT),
        Box::new(|v| animator_msg(Weight(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(DUTY_CYCLE),
        Box::new(|v| animator_msg(DutyCycle(unipolar_from_midi(v)))),
    );
    // The smoothing knob spans the useful half-width range [0, 0.5].
    add(
        cc_ch0(SMOOTHING),
        Box::new(|v| animator_msg(Smoothing(Normal::new(unipolar_from_midi(v).val() * 0.5)))),
    );

    for (i, waveform) in crate::animation::Waveform::iter().enumerate() {
        add(
            note_on_ch0(WAVEFORM_SELECT_0 + i as u8),
            Box::new(move |_| animator_msg(Waveform(waveform))),
        );
    }

    add(
        note_on_ch0(PULSE),
        Box::new(|_| ShowControlMessage::Animator(ControlMessage::TogglePulse)),
    );
    add(
        note_on_ch0(INVERT),
        Box::new(|_| ShowControlMessage::Animator(ControlMessage::ToggleInvert)),
    );
    add(
        note_on_ch0(RESET_PHASE),
        Box::new(|_| ShowControlMessage::Animator(ControlMessage::ResetPhase)),
    );

    // One target button per variant; the first is None, which parks the
    // animator.
    for (i, target) in AnimationTarget::iter().enumerate() {
        add(
            note_on_ch0(TARGET_SELECT_0 + i as u8),
            Box::new(move |_| slot_msg(SlotStateChange::Target(target))),
        );
    }

    for (i, mix) in MixMode::iter().enumerate() {
        add(
            note_on_ch0(MIX_SELECT_0 + i as u8),
            Box::new(move |_| slot_msg(SlotStateChange::Mix(mix))),
        );
    }

    add(
        note_on_ch0(CLOCK_SOURCE_NONE),
        Box::new(|_| ShowControlMessage::Animator(ControlMessage::SetClockSource(None))),
    );
    add(
        note_on_ch0(CLOCK_SOURCE_MASTER),
        Box::new(|_| {
            ShowControlMessage::Animator(ControlMessage::SetClockSource(Some(
                ClockSourceExt::Master,
            )))
        }),
    );
    for i in 0..N_CLOCKS {
        add(
            note_on_ch0(CLOCK_SOURCE_AUX_0 + i as u8),
            Box::new(move |_| {
                ShowControlMessage::Animator(ControlMessage::SetClockSource(Some(
                    ClockSourceExt::Aux(ClockIdxExt(i)),
                )))
            }),
        );
    }

    for i in 0..ANIMATOR_COUNT {
        add(
            note_on_ch0(ANIMATOR_SELECT_0 + i as u8),
            Box::new(move |_| {
                ShowControlMessage::Mapper(MapperControlMessage::Set(MapperStateChange::Animator(
                    AnimatorIdx(i),
                )))
            }),
        );
    }
}

/// OSC addresses for the animator page of the tablet layout.
pub fn map_animator_osc_controls(map: &mut ControlMap) {
    use StateChange::*;
    let device = OscDevice::TouchOsc;
    let mut add = |addr, creator: super::OscCreator| map.add_osc(device, addr, creator);

    add(
        "/anim/speed",
        Box::new(|v| Some(animator_msg(Speed(BipolarNormal::new(v * 2.0 - 1.0))))),
    );
    add(
        "/anim/weight",
        Box::new(|v| Some(animator_msg(Weight(Normal::new(v))))),
    );
    add(
        "/anim/duty_cycle",
        Box::new(|v| Some(animator_msg(DutyCycle(Normal::new(v))))),
    );
    add(
        "/anim/smoothing",
        Box::new(|v| Some(animator_msg(Smoothing(Normal::new(v * 0.5))))),
    );
    add(
        "/anim/pulse",
        Box::new(|v| {
            (v > 0.0).then_some(ShowControlMessage::Animator(ControlMessage::TogglePulse))
        }),
    );
    add(
        "/anim/nudge",
        Box::new(|v| {
            Some(ShowControlMessage::Animator(ControlMessage::NudgePhase(
                BipolarNormal::new(v * 2.0 - 1.0),
            )))
        }),
    );
}

fn animator_msg(sc: StateChange) -> ShowControlMessage {
    ShowControlMessage::Animator(ControlMessage::Set(sc))
}

fn slot_msg(sc: SlotStateChange) -> ShowControlMessage {
    ShowControlMessage::AnimatorSlot(SlotControlMessage::Set(sc))
}

fn send_all(manager: &Manager, e: crate::midi::Event) {
    manager.send(Device::AkaiApc40, e);
    manager.send(Device::TouchOsc, e);
}

/// Emits midi to update surfaces after an animator state change.
pub fn update_animator_control(sc: StateChange, manager: &Manager) {
    use StateChange::*;
    match sc {
        Waveform(w) => {
            let selected = note_on_ch0(WAVEFORM_SELECT_0 + w as u8);
            waveform_radio().select(selected, |e| send_all(manager, e));
        }
        Pulse(v) => send_all(manager, event(note_on_ch0(PULSE), v as u8)),
        Invert(v) => send_all(manager, event(note_on_ch0(INVERT), v as u8)),
        NPeriods(_) => (),
        Speed(v) => send_all(
            manager,
            event(cc_ch0(SPEED), bipolar_to_midi(quadratic_knob_output(v))),
        ),
        Weight(v) => send_all(manager, event(cc_ch0(WEIGHT), unipolar_to_midi(v))),
        DutyCycle(v) => send_all(manager, event(cc_ch0(DUTY_CYCLE), unipolar_to_midi(v))),
        Smoothing(v) => send_all(
            manager,
            event(cc_ch0(SMOOTHING), unipolar_to_midi(Normal::new(v.val() * 2.0))),
        ),
        ClockSource(source) => {
            let selected = note_on_ch0(match source {
                None => CLOCK_SOURCE_NONE,
                Some(crate::clock_bank::ClockSource::Master) => CLOCK_SOURCE_MASTER,
                Some(crate::clock_bank::ClockSource::Aux(idx)) => {
                    CLOCK_SOURCE_AUX_0 + clock_idx_offset(idx)
                }
            });
            clock_source_radio().select(selected, |e| send_all(manager, e));
        }
    }
}

/// Emits midi to update surfaces after a slot (target/mix) state change.
pub fn update_animator_slot_control(sc: SlotStateChange, manager: &Manager) {
    match sc {
        SlotStateChange::Target(target) => {
            let selected = note_on_ch0(TARGET_SELECT_0 + target as u8);
            target_radio().select(selected, |e| send_all(manager, e));
        }
        SlotStateChange::Mix(mix) => {
            let selected = note_on_ch0(MIX_SELECT_0 + mix as u8);
            mix_radio().select(selected, |e| send_all(manager, e));
        }
    }
}

fn clock_idx_offset(idx: ClockIdx) -> u8 {
    idx.val() as u8
}

fn waveform_radio() -> RadioButtons {
    RadioButtons {
        mappings: Waveform::iter()
            .enumerate()
            .map(|(i, _)| note_on_ch0(WAVEFORM_SELECT_0 + i as u8))
            .collect(),
        off: 0,
        on: 1,
    }
}

fn target_radio() -> RadioButtons {
    RadioButtons {
        mappings: AnimationTarget::iter()
            .enumerate()
            .map(|(i, _)| note_on_ch0(TARGET_SELECT_0 + i as u8))
            .collect(),
        off: 0,
        on: 1,
    }
}

fn mix_radio() -> RadioButtons {
    RadioButtons {
        mappings: MixMode::iter()
            .enumerate()
            .map(|(i, _)| note_on_ch0(MIX_SELECT_0 + i as u8))
            .collect(),
        off: 0,
        on: 1,
    }
}

fn clock_source_radio() -> RadioButtons {
    let mut mappings = vec![
        note_on_ch0(CLOCK_SOURCE_NONE),
        note_on_ch0(CLOCK_SOURCE_MASTER),
    ];
    mappings.extend((0..N_CLOCKS).map(|i| note_on_ch0(CLOCK_SOURCE_AUX_0 + i as u8)));
    RadioButtons {
        mappings,
        off: 0,
        on: 1,
    }
}
