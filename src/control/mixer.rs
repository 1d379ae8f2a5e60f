// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Bindings between control surfaces and the mixer's layer strips.

use super::{
    unipolar_from_midi, unipolar_to_midi, ControlMap, Device, MapperControlMessage,
    MapperStateChange,
};
use crate::{
    midi::{cc, event, note_on, Manager},
    mixer::{
        ControlMessage, LayerControlMessage, LayerIdx, LayerStateChange, Mixer, StateChange,
        VideoChannel,
    },
    osc::OscDevice,
    show::ControlMessage as ShowControlMessage,
    types::Normal,
};

const FADER: u8 = 0x7;
const BUMP: u8 = 0x32;
const MASK: u8 = 0x31;
const LOOK_INDICATOR: u8 = 0x30;
const CLEAR: u8 = 0x34;

/// Track-select buttons, one per strip.
pub const LAYER_SELECT: u8 = 0x33;

/// The midi note for the 0th video channel selector.
const VIDEO_CHAN_0: u8 = 66;

/// How many layer strips one surface page carries.
pub const PAGE_SIZE: usize = 8;

/// Clipboard controls, channel 0 only.
const SAVE_LOOK: u8 = 0x52;
const LOAD_LOOK: u8 = 0x53;
const ANIMATOR_COPY: u8 = 0x54;
const ANIMATOR_PASTE: u8 = 0x55;

pub fn map_mixer_controls(device: Device, page: usize, map: &mut ControlMap) {
    use LayerControlMessage::*;

    let mut add = |mapping, creator| map.add(device, mapping, creator);

    // Offset the layer indexes to correspond to this page.
    let layer_offset = page * PAGE_SIZE;

    for strip in 0..PAGE_SIZE {
        let layer = LayerIdx(strip + layer_offset);
        let mkmsg = move |msg: LayerControlMessage| -> ShowControlMessage {
            ShowControlMessage::Mixer(ControlMessage { layer, msg })
        };
        add(
            cc(strip as u8, FADER),
            Box::new(move |v| mkmsg(Set(LayerStateChange::Level(unipolar_from_midi(v))))),
        );
        add(note_on(strip as u8, BUMP), Box::new(move |_| mkmsg(Bump)));
        add(
            note_on(strip as u8, MASK),
            Box::new(move |_| mkmsg(ToggleMask)),
        );
        add(
            note_on(strip as u8, CLEAR),
            Box::new(move |_| mkmsg(Clear)),
        );
        add(
            note_on(strip as u8, LAYER_SELECT),
            Box::new(move |_| {
                ShowControlMessage::Mapper(MapperControlMessage::Set(MapperStateChange::Layer(
                    layer,
                )))
            }),
        );

        for vc in 0..Mixer::N_VIDEO_CHANNELS {
            add(
                note_on(strip as u8, vc as u8 + VIDEO_CHAN_0),
                Box::new(move |_| mkmsg(ToggleVideoChannel(VideoChannel(vc)))),
            );
        }
    }

    // The clipboard controls live on the primary page only.
    if page == 0 {
        add(
            note_on(0, SAVE_LOOK),
            Box::new(|_| ShowControlMessage::Mapper(MapperControlMessage::SaveLook)),
        );
        add(
            note_on(0, LOAD_LOOK),
            Box::new(|_| ShowControlMessage::Mapper(MapperControlMessage::LoadLook)),
        );
        add(
            note_on(0, ANIMATOR_COPY),
            Box::new(|_| ShowControlMessage::Mapper(MapperControlMessage::AnimatorCopy)),
        );
        add(
            note_on(0, ANIMATOR_PASTE),
            Box::new(|_| ShowControlMessage::Mapper(MapperControlMessage::AnimatorPaste)),
        );
    }
}

/// OSC fader addresses for every layer strip.
pub fn map_mixer_osc_controls(map: &mut ControlMap) {
    let device = OscDevice::TouchOsc;
    for layer in 0..Mixer::DEFAULT_LAYER_COUNT {
        map.add_osc(
            device,
            format!("/mixer/level/{layer}"),
            Box::new(move |v| {
                Some(ShowControlMessage::Mixer(ControlMessage {
                    layer: LayerIdx(layer),
                    msg: LayerControlMessage::Set(LayerStateChange::Level(Normal::new(v))),
                }))
            }),
        );
        map.add_osc(
            device,
            format!("/mixer/bump/{layer}"),
            Box::new(move |v| {
                // Bump decays on its own; the release half of the button is
                // ignored.
                (v > 0.0).then_some(ShowControlMessage::Mixer(ControlMessage {
                    layer: LayerIdx(layer),
                    msg: LayerControlMessage::Bump,
                }))
            }),
        );
    }
}

/// Emits midi to update surface strips given a state change.
pub fn update_mixer_control(sc: StateChange, manager: &Manager) {
    use LayerStateChange::*;

    let page = sc.layer.0 / PAGE_SIZE;
    let strip = (sc.layer.0 % PAGE_SIZE) as u8;

    let send = |e| {
        // Page 0 lives on the APC40, page 1 on the APC20 wing.
        manager.send(
            if page == 0 {
                Device::AkaiApc40
            } else {
                Device::AkaiApc20
            },
            e,
        );
        manager.send(Device::TouchOsc, e);
    };

    match sc.change {
        Level(v) => send(event(cc(strip, FADER), unipolar_to_midi(v))),
        Mask(v) => send(event(note_on(strip, MASK), v as u8)),
        ContainsLook(v) => send(event(note_on(strip, LOOK_INDICATOR), v as u8)),
        VideoChannel((vc, v)) => send(event(
            note_on(strip, vc.0 as u8 + VIDEO_CHAN_0),
            v as u8,
        )),
    }
}
