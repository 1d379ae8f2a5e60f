// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The control plane: the binding table that maps surface events onto scene
//! mutations, the dispatcher that feeds events in and echoes state back out,
//! and the page/bank state that decides which layer and animator the
//! hardware is currently talking to.

mod animation;
mod clock;
mod device;
mod mixer;
mod tunnel;

pub use device::Device;

use crate::{
    beam::Beam,
    clock_bank::ClockBank,
    look::Look,
    midi::{self, Event, Mapping},
    mixer::{LayerIdx, Mixer},
    modulation::{AnimatorIdx, AnimatorSlot, ANIMATOR_COUNT},
    osc::{self, OscDevice},
    show::{ControlMessage as ShowControlMessage, EmitStateChange, StateChange as ShowStateChange},
    types::{BipolarNormal, Normal},
    util::{ChannelPair, DiscardCounter},
};
use anyhow::Result;
use crossbeam_channel::Sender;
use log::{debug, error};
use once_cell::sync::Lazy;
use rosc::OscMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many controller events can queue between ticks before senders start
/// dropping. Generous for human hands, small enough to bound a runaway
/// surface.
const CONTROL_QUEUE_DEPTH: usize = 512;

/// An event from any control transport, as it arrives off the wire.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    #[allow(missing_docs)]
    Midi((Device, Event)),
    #[allow(missing_docs)]
    Osc((OscDevice, OscMessage)),
}

type MidiCreator = Box<dyn Fn(u8) -> ShowControlMessage + Send + Sync>;
type OscCreator = Box<dyn Fn(f64) -> Option<ShowControlMessage> + Send + Sync>;

/// The binding table: (surface, control address) to control-message creator.
/// Built once at startup; remapping means rebuilding the process, which has
/// never mattered in practice.
pub struct ControlMap {
    midi: HashMap<(Device, Mapping), MidiCreator>,
    osc: HashMap<(OscDevice, String), OscCreator>,
}
impl ControlMap {
    fn new() -> Self {
        let mut map = Self {
            midi: HashMap::new(),
            osc: HashMap::new(),
        };
        tunnel::map_tunnel_controls(Device::AkaiApc40, &mut map);
        tunnel::map_tunnel_controls(Device::TouchOsc, &mut map);
        tunnel::map_tunnel_osc_controls(&mut map);

        animation::map_animator_controls(Device::AkaiApc40, &mut map);
        animation::map_animator_controls(Device::TouchOsc, &mut map);
        animation::map_animator_osc_controls(&mut map);

        mixer::map_mixer_controls(Device::AkaiApc40, 0, &mut map);
        mixer::map_mixer_controls(Device::AkaiApc20, 1, &mut map);
        mixer::map_mixer_controls(Device::TouchOsc, 0, &mut map);
        mixer::map_mixer_osc_controls(&mut map);

        // The tablet reaches the clocks over OSC; its midi strip numbers
        // are taken by the mixer bindings.
        clock::map_clock_controls(Device::BehringerCmdMm1, &mut map);
        clock::map_clock_osc_controls(&mut map);
        map
    }

    /// Registers a midi binding. Duplicate bindings are a programming error.
    fn add(&mut self, device: Device, mapping: Mapping, creator: MidiCreator) {
        if self.midi.insert((device, mapping), creator).is_some() {
            panic!("duplicate midi control definition: {device:?} {mapping:?}");
        }
    }

    /// Registers an OSC address binding.
    fn add_osc(&mut self, device: OscDevice, addr: impl Into<String>, creator: OscCreator) {
        let addr = addr.into();
        if self.osc.insert((device, addr.clone()), creator).is_some() {
            panic!("duplicate osc control definition: {device:?} {addr}");
        }
    }

    /// Maps a midi event to a show control message, or None if unbound.
    pub fn dispatch_midi(&self, device: Device, event: Event) -> Option<ShowControlMessage> {
        self.midi
            .get(&(device, event.mapping))
            .map(|creator| creator(event.value))
    }

    /// Maps an OSC message to a show control message, or None if unbound or
    /// malformed.
    pub fn dispatch_osc(&self, device: OscDevice, msg: &OscMessage) -> Option<ShowControlMessage> {
        let creator = self.osc.get(&(device, msg.addr.clone()))?;
        match osc::get_float(&msg.args) {
            Ok(v) => creator(v),
            Err(e) => {
                debug!("Discarding OSC message at {}: {e}.", msg.addr);
                None
            }
        }
    }
}

static CONTROL_MAP: Lazy<ControlMap> = Lazy::new(ControlMap::new);

/// Owns the control transports: routes incoming events through the binding
/// table and fans echo updates back out to every bound surface.
pub struct Dispatcher {
    midi: midi::Manager,
    events: ChannelPair<ControlEvent>,
    discards: DiscardCounter,
}
impl Dispatcher {
    /// Connects all configured devices. Transport setup failures are fatal;
    /// the show should not start half-deaf.
    pub fn new(
        midi_devices: Vec<midi::DeviceSpec>,
        osc_devices: Vec<osc::DeviceSpec>,
    ) -> Result<Self> {
        let events = ChannelPair::bounded(CONTROL_QUEUE_DEPTH);
        let discards = DiscardCounter::default();
        for spec in osc_devices {
            osc::listen(spec, events.sender.clone(), discards.clone())?;
        }
        let midi = midi::Manager::new(midi_devices, events.sender.clone(), discards.clone())?;
        Ok(Self {
            midi,
            events,
            discards,
        })
    }

    /// A sender onto the control event queue, for tests and in-process
    /// surfaces.
    pub fn event_sender(&self) -> Sender<ControlEvent> {
        self.events.sender.clone()
    }

    /// How many events have been discarded (malformed or overflow).
    pub fn discard_count(&self) -> usize {
        self.discards.count()
    }

    /// Drains every queued controller event, in arrival order per transport,
    /// returning the control messages they map to. Never blocks; the caller
    /// applies the messages and then uses this dispatcher as the echo
    /// emitter.
    pub fn drain(&mut self) -> Vec<ShowControlMessage> {
        let mut messages = Vec::new();
        while let Ok(event) = self.events.receiver.try_recv() {
            let mapped = match &event {
                ControlEvent::Midi((device, e)) => {
                    let mapped = CONTROL_MAP.dispatch_midi(*device, *e);
                    if mapped.is_none() {
                        debug!("Unbound midi event from {device}: {}.", e.mapping);
                    }
                    mapped
                }
                ControlEvent::Osc((device, m)) => CONTROL_MAP.dispatch_osc(*device, m),
            };
            if let Some(msg) = mapped {
                messages.push(msg);
            }
        }
        messages
    }
}
impl EmitStateChange for Dispatcher {
    /// Mirrors scene state changes out to every bound surface, which is both
    /// the LED echo path and what makes last-writer-wins visible everywhere.
    fn emit(&mut self, sc: ShowStateChange) {
        match sc {
            ShowStateChange::Tunnel(sc) => tunnel::update_tunnel_control(sc, &self.midi),
            ShowStateChange::Animator(sc) => animation::update_animator_control(sc, &self.midi),
            ShowStateChange::AnimatorSlot(sc) => {
                animation::update_animator_slot_control(sc, &self.midi)
            }
            ShowStateChange::Mixer(sc) => mixer::update_mixer_control(sc, &self.midi),
            ShowStateChange::Clock(sc) => clock::update_clock_control(sc, &self.midi),
            ShowStateChange::Mapper(sc) => update_mapper_control(sc, &self.midi),
        }
    }
}

/// Stateful page/bank tracking: which mixer layer the surfaces are editing,
/// and which animator slot is selected for each layer. Page changes are
/// local state, not scene mutations; changing page pushes a full state
/// snapshot for that page so every surface stays consistent.
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlMapper {
    current_layer: LayerIdx,
    /// Animator selection per layer, so flipping between layers lands on
    /// the slot you left selected there.
    current_animator_for_layer: Vec<AnimatorIdx>,
    animator_clipboard: Option<AnimatorSlot>,
    look_clipboard: Option<Look>,
}
impl ControlMapper {
    #[allow(missing_docs)]
    pub fn new(n_layers: usize) -> Self {
        Self {
            current_layer: LayerIdx(0),
            current_animator_for_layer: vec![AnimatorIdx(0); n_layers],
            animator_clipboard: None,
            look_clipboard: None,
        }
    }

    fn current_animator_idx(&self) -> AnimatorIdx {
        self.current_animator_for_layer[self.current_layer.0]
    }

    fn current_beam<'m>(&self, mixer: &'m mut Mixer) -> &'m mut Beam {
        mixer.beam(self.current_layer)
    }

    /// Routes a show control message to its subsystem, applying the current
    /// page/bank selection where the message is implicitly addressed.
    pub fn handle_control_message<E: EmitStateChange>(
        &mut self,
        msg: ShowControlMessage,
        mixer: &mut Mixer,
        clocks: &mut ClockBank,
        emitter: &mut E,
    ) {
        use ShowControlMessage::*;
        match msg {
            Tunnel(tm) => {
                if let Beam::Tunnel(t) = self.current_beam(mixer) {
                    t.control(tm, emitter);
                }
            }
            Animator(am) => {
                let idx = self.current_animator_idx();
                if let Beam::Tunnel(t) = self.current_beam(mixer) {
                    t.animators_mut().control_animator(idx, am, emitter);
                }
            }
            AnimatorSlot(sm) => {
                let idx = self.current_animator_idx();
                if let Beam::Tunnel(t) = self.current_beam(mixer) {
                    t.animators_mut().control_slot(idx, sm, emitter);
                }
            }
            Mixer(mm) => mixer.control(mm, emitter),
            Clock(cm) => clocks.control(cm, emitter),
            Mapper(um) => self.control(um, mixer, emitter),
        }
    }

    /// Emits all controllable state: the page/bank selection, the selected
    /// beam and animator, and the whole mixer and clock bank.
    pub fn emit_state<E: EmitStateChange>(
        &self,
        mixer: &mut Mixer,
        clocks: &ClockBank,
        emitter: &mut E,
    ) {
        emitter.emit(ShowStateChange::Mapper(MapperStateChange::Layer(
            self.current_layer,
        )));
        self.emit_current_layer_state(mixer, emitter);
        mixer.emit_state(emitter);
        clocks.emit_state(emitter);
    }

    /// Pushes the state of the selected beam and its selected animator.
    fn emit_current_layer_state<E: EmitStateChange>(&self, mixer: &mut Mixer, emitter: &mut E) {
        let idx = self.current_animator_idx();
        if let Beam::Tunnel(t) = self.current_beam(mixer) {
            t.emit_state(emitter);
            t.animators().emit_slot_state(idx, emitter);
        }
        emitter.emit(ShowStateChange::Mapper(MapperStateChange::Animator(idx)));
    }

    fn control<E: EmitStateChange>(
        &mut self,
        msg: MapperControlMessage,
        mixer: &mut Mixer,
        emitter: &mut E,
    ) {
        use MapperControlMessage::*;
        match msg {
            Set(sc) => self.handle_state_change(sc, mixer, emitter),
            AnimatorCopy => {
                let idx = self.current_animator_idx();
                if let Beam::Tunnel(t) = self.current_beam(mixer) {
                    self.animator_clipboard = Some(t.animators().animator(idx).clone());
                }
            }
            AnimatorPaste => {
                let Some(slot) = self.animator_clipboard.clone() else {
                    return;
                };
                let idx = self.current_animator_idx();
                if let Beam::Tunnel(t) = self.current_beam(mixer) {
                    t.animators_mut().replace(idx, slot);
                }
                self.emit_current_layer_state(mixer, emitter);
            }
            SaveLook => {
                self.look_clipboard = Some(mixer.as_look());
            }
            LoadLook => {
                let Some(look) = self.look_clipboard.clone() else {
                    return;
                };
                *self.current_beam(mixer) = Beam::Look(look);
                self.emit_current_layer_state(mixer, emitter);
            }
        }
    }

    fn handle_state_change<E: EmitStateChange>(
        &mut self,
        sc: MapperStateChange,
        mixer: &mut Mixer,
        emitter: &mut E,
    ) {
        match sc {
            MapperStateChange::Layer(layer) => {
                if layer.0 >= mixer.layer_count() {
                    error!("layer selection {} out of range", layer.0);
                    return;
                }
                if layer == self.current_layer {
                    return;
                }
                self.current_layer = layer;
                self.emit_current_layer_state(mixer, emitter);
                emitter.emit(ShowStateChange::Mapper(sc));
            }
            MapperStateChange::Animator(idx) => {
                self.current_animator_for_layer[self.current_layer.0] =
                    AnimatorIdx(idx.0 % ANIMATOR_COUNT);
                self.emit_current_layer_state(mixer, emitter);
            }
        }
    }
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum MapperControlMessage {
    Set(MapperStateChange),
    AnimatorCopy,
    AnimatorPaste,
    /// Freeze the whole mixer into the look clipboard.
    SaveLook,
    /// Drop the look clipboard into the selected layer.
    LoadLook,
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum MapperStateChange {
    Layer(LayerIdx),
    Animator(AnimatorIdx),
}

/// Echo mapper selection changes to the surfaces that display them.
fn update_mapper_control(sc: MapperStateChange, manager: &midi::Manager) {
    use crate::midi::note_on;
    match sc {
        MapperStateChange::Layer(layer) => {
            let page = layer.0 / mixer::PAGE_SIZE;
            let channel = (layer.0 % mixer::PAGE_SIZE) as u8;
            let device = if page == 0 {
                Device::AkaiApc40
            } else {
                Device::AkaiApc20
            };
            RadioButtons {
                mappings: (0..mixer::PAGE_SIZE as u8)
                    .map(|ch| note_on(ch, mixer::LAYER_SELECT))
                    .collect(),
                off: 0,
                on: 1,
            }
            .select(note_on(channel, mixer::LAYER_SELECT), |e| {
                manager.send(device, e)
            });
        }
        MapperStateChange::Animator(idx) => {
            let selected = note_on(0, animation::ANIMATOR_SELECT_0 + idx.0 as u8);
            RadioButtons {
                mappings: (0..ANIMATOR_COUNT as u8)
                    .map(|i| note_on(0, animation::ANIMATOR_SELECT_0 + i))
                    .collect(),
                off: 0,
                on: 1,
            }
            .select(selected, |e| {
                manager.send(Device::AkaiApc40, e);
                manager.send(Device::TouchOsc, e);
            });
        }
    }
}

/// Scales a 7-bit controller value onto a bipolar knob with a detent at the
/// center of travel.
pub fn bipolar_from_midi(val: u8) -> BipolarNormal {
    let denom = if val > 64 { 63. } else { 64. };
    BipolarNormal::new((f64::from(val) - 64.) / denom)
}

#[allow(missing_docs)]
pub fn bipolar_to_midi(val: BipolarNormal) -> u8 {
    u16::min((((val.val() + 1.0) / 2.0) * 128.) as u16, 127) as u8
}

#[allow(missing_docs)]
pub fn unipolar_from_midi(val: u8) -> Normal {
    Normal::new(f64::from(val) / 127.)
}

#[allow(missing_docs)]
pub fn unipolar_to_midi(val: Normal) -> u8 {
    (val.val() * 127.) as u8
}

/// Scales knob input with a quadratic curve, for more resolution near zero.
fn quadratic_knob_input(v: BipolarNormal) -> BipolarNormal {
    let mut scaled = v.val().powi(2);
    if v < 0. {
        scaled *= -1.;
    }
    BipolarNormal::new(scaled)
}

/// Inverse of [quadratic_knob_input], for echoing values back to knobs.
fn quadratic_knob_output(v: BipolarNormal) -> BipolarNormal {
    let mut scaled = v.val().abs().sqrt();
    if v < 0. {
        scaled *= -1.;
    }
    BipolarNormal::new(scaled)
}

/// A collection of button mappings of which only one can be lit. Knows how
/// to emit the midi to light just the selected one.
struct RadioButtons {
    mappings: Vec<Mapping>,
    off: u8,
    on: u8,
}
impl RadioButtons {
    /// Emits midi to ensure only the selected mapping is lit. Performs no
    /// check that the selected mapping is actually a member.
    fn select<S: FnMut(Event)>(&self, selected: Mapping, mut send: S) {
        for mapping in &self.mappings {
            let value = if *mapping == selected {
                self.on
            } else {
                self.off
            };
            send(Event {
                mapping: *mapping,
                value,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_scaling_round_trips() {
        fn roundtrip(v: f64) {
            let v = BipolarNormal::new(v);
            assert_eq!(v, quadratic_knob_output(quadratic_knob_input(v)));
        }
        roundtrip(0.0);
        roundtrip(0.1);
        roundtrip(-0.1);
        roundtrip(1.0);
        roundtrip(-1.0);

        assert_eq!(bipolar_from_midi(64), 0.0);
        assert_eq!(bipolar_from_midi(127), 1.0);
        assert_eq!(bipolar_from_midi(0), -1.0);
        assert_eq!(unipolar_from_midi(127), 1.0);
        assert_eq!(unipolar_to_midi(Normal::ONE), 127);
    }

    #[test]
    fn control_map_builds_without_duplicates() {
        // Building the map panics on a duplicate binding, so forcing the
        // lazy cell is the whole test.
        let map = &*CONTROL_MAP;
        assert!(!map.midi.is_empty());
        assert!(!map.osc.is_empty());
    }

    #[test]
    fn out_of_range_values_clamp_at_the_edge() {
        // 7-bit values can't exceed 127, but the scaling still clamps
        // whatever arrives.
        assert!(bipolar_from_midi(200).val() <= 1.0);
        assert!(unipolar_from_midi(255).val() <= 1.0);
    }
}
