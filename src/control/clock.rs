// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Bindings between control surfaces and the clock bank. The master clock
//! and each auxiliary clock get a strip: tap, nudge, retrigger, rate, and
//! submaster level.

use super::{
    bipolar_from_midi, bipolar_to_midi, quadratic_knob_input, quadratic_knob_output,
    unipolar_from_midi, unipolar_to_midi, ControlMap, Device,
};
use crate::{
    clock::{ControlMessage as ClockControlMessage, StateChange as ClockStateChange},
    clock_bank::{ClockIdxExt, ControlMessage, StateChange, N_CLOCKS},
    midi::{cc, event, note_on, Manager},
    osc::OscDevice,
    show::ControlMessage as ShowControlMessage,
    types::{BipolarNormal, Normal},
};
use std::time::Instant;

const TAP: u8 = 0x30;
const NUDGE: u8 = 0x31;
const RETRIGGER: u8 = 0x32;
const RATE: u8 = 0x07;
const SUBMASTER: u8 = 0x08;

/// The master clock uses the strip one past the aux clocks.
const MASTER_STRIP: u8 = N_CLOCKS as u8;

fn strip_channel(channel: Option<ClockIdxExt>) -> u8 {
    match channel {
        None => MASTER_STRIP,
        Some(idx) => idx.0 as u8,
    }
}

fn clock_msg(channel: Option<ClockIdxExt>, msg: ClockControlMessage) -> ShowControlMessage {
    ShowControlMessage::Clock(ControlMessage { channel, msg })
}

pub fn map_clock_controls(device: Device, map: &mut ControlMap) {
    let mut add = |mapping, creator| map.add(device, mapping, creator);

    let strips = (0..N_CLOCKS)
        .map(|i| Some(ClockIdxExt(i)))
        .chain(std::iter::once(None));
    for channel in strips {
        let strip = strip_channel(channel);
        add(
            note_on(strip, TAP),
            Box::new(move |_| clock_msg(channel, ClockControlMessage::Tap(Instant::now()))),
        );
        add(
            note_on(strip, NUDGE),
            Box::new(move |_| clock_msg(channel, ClockControlMessage::Nudge)),
        );
        add(
            note_on(strip, RETRIGGER),
            Box::new(move |v| {
                clock_msg(
                    channel,
                    ClockControlMessage::Set(ClockStateChange::Retrigger(v > 0)),
                )
            }),
        );
        add(
            cc(strip, RATE),
            Box::new(move |v| {
                clock_msg(
                    channel,
                    ClockControlMessage::Set(ClockStateChange::Rate(quadratic_knob_input(
                        bipolar_from_midi(v),
                    ))),
                )
            }),
        );
        add(
            cc(strip, SUBMASTER),
            Box::new(move |v| {
                clock_msg(
                    channel,
                    ClockControlMessage::Set(ClockStateChange::SubmasterLevel(
                        unipolar_from_midi(v),
                    )),
                )
            }),
        );
    }
}

/// OSC addresses for the clock page of the tablet layout.
pub fn map_clock_osc_controls(map: &mut ControlMap) {
    let device = OscDevice::TouchOsc;

    let strips = (0..N_CLOCKS)
        .map(|i| Some(ClockIdxExt(i)))
        .chain(std::iter::once(None));
    for channel in strips {
        let name = match channel {
            None => "master".to_string(),
            Some(idx) => idx.0.to_string(),
        };
        map.add_osc(
            device,
            format!("/clock/{name}/tap"),
            Box::new(move |v| {
                (v > 0.0).then_some(clock_msg(channel, ClockControlMessage::Tap(Instant::now())))
            }),
        );
        map.add_osc(
            device,
            format!("/clock/{name}/rate"),
            Box::new(move |v| {
                Some(clock_msg(
                    channel,
                    ClockControlMessage::Set(ClockStateChange::Rate(BipolarNormal::new(
                        v * 2.0 - 1.0,
                    ))),
                ))
            }),
        );
        map.add_osc(
            device,
            format!("/clock/{name}/submaster"),
            Box::new(move |v| {
                Some(clock_msg(
                    channel,
                    ClockControlMessage::Set(ClockStateChange::SubmasterLevel(Normal::new(v))),
                ))
            }),
        );
    }
}

/// Emits midi to update clock strips given a state change.
pub fn update_clock_control(sc: StateChange, manager: &Manager) {
    let strip = strip_channel(sc.channel.map(|idx| ClockIdxExt(idx.val())));

    let send = |e| {
        manager.send(Device::BehringerCmdMm1, e);
    };

    match sc.change {
        ClockStateChange::Rate(v) => send(event(
            cc(strip, RATE),
            bipolar_to_midi(quadratic_knob_output(v)),
        )),
        ClockStateChange::Retrigger(v) => send(event(note_on(strip, RETRIGGER), v as u8)),
        ClockStateChange::SubmasterLevel(v) => {
            send(event(cc(strip, SUBMASTER), unipolar_to_midi(v)))
        }
        ClockStateChange::Ticked(v) => send(event(note_on(strip, TAP), v as u8)),
    }
}
