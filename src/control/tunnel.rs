// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Bindings between control surfaces and tunnel parameters.

use super::{
    bipolar_from_midi, bipolar_to_midi, quadratic_knob_input, quadratic_knob_output,
    unipolar_from_midi, unipolar_to_midi, ControlMap, Device,
};
use crate::{
    midi::{cc_ch0, event, note_on_ch0, Manager},
    osc::OscDevice,
    show::ControlMessage as ShowControlMessage,
    tunnel::{ControlMessage, StateChange},
    types::{BipolarNormal, Normal},
};

// Color knobs, top of the lower bank.
const COL_CENTER: u8 = 16;
const COL_WIDTH: u8 = 17;
const COL_SPREAD: u8 = 18;
const COL_SAT: u8 = 19;

// Geometry knobs, bottom of the lower bank.
const ROTATION_SPEED: u8 = 20;
const THICKNESS: u8 = 21;
const SIZE: u8 = 22;
const ASPECT_RATIO: u8 = 23;

// Segment knobs, bottom of the upper bank.
const SEGMENTS: u8 = 52;
const BLACKING: u8 = 53;
const MARQUEE_SPEED: u8 = 54;
const POSITION_X: u8 = 56;
const POSITION_Y: u8 = 57;

/// "Shift": recenter the beam.
const RESET_POSITION: u8 = 0x62;

pub fn map_tunnel_controls(device: Device, map: &mut ControlMap) {
    use StateChange::*;
    let mut add = |mapping, creator| map.add(device, mapping, creator);

    add(
        cc_ch0(COL_CENTER),
        Box::new(|v| tunnel_msg(ColorCenter(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(COL_WIDTH),
        Box::new(|v| tunnel_msg(ColorWidth(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(COL_SPREAD),
        Box::new(|v| tunnel_msg(ColorSpread(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(COL_SAT),
        Box::new(|v| tunnel_msg(ColorSaturation(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(ROTATION_SPEED),
        Box::new(|v| tunnel_msg(RotationSpeed(quadratic_knob_input(bipolar_from_midi(v))))),
    );
    add(
        cc_ch0(THICKNESS),
        Box::new(|v| tunnel_msg(Thickness(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(SIZE),
        Box::new(|v| tunnel_msg(Size(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(ASPECT_RATIO),
        Box::new(|v| tunnel_msg(AspectRatio(unipolar_from_midi(v)))),
    );
    add(
        cc_ch0(SEGMENTS),
        Box::new(|v| tunnel_msg(Segments(u16::from(v.max(1))))),
    );
    add(
        cc_ch0(BLACKING),
        Box::new(|v| tunnel_msg(Blacking(bipolar_from_midi(v)))),
    );
    add(
        cc_ch0(MARQUEE_SPEED),
        Box::new(|v| tunnel_msg(MarqueeSpeed(quadratic_knob_input(bipolar_from_midi(v))))),
    );
    add(
        cc_ch0(POSITION_X),
        Box::new(|v| tunnel_msg(PositionX(bipolar_from_midi(v)))),
    );
    add(
        cc_ch0(POSITION_Y),
        Box::new(|v| tunnel_msg(PositionY(bipolar_from_midi(v)))),
    );
    add(
        note_on_ch0(RESET_POSITION),
        Box::new(|_| ShowControlMessage::Tunnel(ControlMessage::ResetPosition)),
    );
}

/// OSC fader addresses mirroring the knob bank, one page of the tablet
/// layout.
pub fn map_tunnel_osc_controls(map: &mut ControlMap) {
    use StateChange::*;
    let device = OscDevice::TouchOsc;
    let mut add = |addr, creator: fn(f64) -> StateChange| {
        map.add_osc(device, addr, Box::new(move |v| Some(tunnel_msg(creator(v)))));
    };

    add("/tunnel/rotation_speed", |v| {
        RotationSpeed(BipolarNormal::new(v * 2.0 - 1.0))
    });
    add("/tunnel/marquee_speed", |v| {
        MarqueeSpeed(BipolarNormal::new(v * 2.0 - 1.0))
    });
    add("/tunnel/thickness", |v| Thickness(Normal::new(v)));
    add("/tunnel/size", |v| Size(Normal::new(v)));
    add("/tunnel/aspect_ratio", |v| AspectRatio(Normal::new(v)));
    add("/tunnel/col_center", |v| ColorCenter(Normal::new(v)));
    add("/tunnel/col_width", |v| ColorWidth(Normal::new(v)));
    add("/tunnel/col_spread", |v| ColorSpread(Normal::new(v)));
    add("/tunnel/col_sat", |v| ColorSaturation(Normal::new(v)));
    add("/tunnel/segments", |v| Segments(((v * 126.0) as u16) + 1));
    add("/tunnel/blacking", |v| {
        Blacking(BipolarNormal::new(v * 2.0 - 1.0))
    });
}

fn tunnel_msg(sc: StateChange) -> ShowControlMessage {
    ShowControlMessage::Tunnel(ControlMessage::Set(sc))
}

/// Emits midi to update surface knob positions given a state change.
pub fn update_tunnel_control(sc: StateChange, manager: &Manager) {
    use StateChange::*;

    let mut send = |control, value| {
        let e = event(cc_ch0(control), value);
        manager.send(Device::AkaiApc40, e);
        manager.send(Device::TouchOsc, e);
    };

    match sc {
        RotationSpeed(v) => send(ROTATION_SPEED, bipolar_to_midi(quadratic_knob_output(v))),
        MarqueeSpeed(v) => send(MARQUEE_SPEED, bipolar_to_midi(quadratic_knob_output(v))),
        Thickness(v) => send(THICKNESS, unipolar_to_midi(v)),
        Size(v) => send(SIZE, unipolar_to_midi(v)),
        AspectRatio(v) => send(ASPECT_RATIO, unipolar_to_midi(v)),
        ColorCenter(v) => send(COL_CENTER, unipolar_to_midi(v)),
        ColorWidth(v) => send(COL_WIDTH, unipolar_to_midi(v)),
        ColorSpread(v) => send(COL_SPREAD, unipolar_to_midi(v)),
        ColorSaturation(v) => send(COL_SAT, unipolar_to_midi(v)),
        Segments(v) => send(SEGMENTS, (v.min(127)) as u8),
        Blacking(v) => send(BLACKING, bipolar_to_midi(v)),
        PositionX(v) => send(POSITION_X, bipolar_to_midi(v)),
        PositionY(v) => send(POSITION_Y, bipolar_to_midi(v)),
    }
}
