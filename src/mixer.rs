// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The mixer: an ordered, leveled, maskable stack of beams, fanned out to
//! one or more video channels.

use crate::{
    beam::Beam,
    clock_bank::ClockBank,
    look::Look,
    snapshot::DrawEntity,
    types::Normal,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};

/// A transient full-level override on a mixer layer. Triggering holds the
/// layer at full for a beat-ish moment, then decays linearly back to the
/// faded level, so a bump reads as a flash rather than a toggle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BumpEnvelope {
    age: Option<Duration>,
}
impl BumpEnvelope {
    const HOLD: Duration = Duration::from_millis(100);
    const DECAY: Duration = Duration::from_millis(300);

    /// Starts (or restarts) the envelope.
    pub fn trigger(&mut self) {
        self.age = Some(Duration::ZERO);
    }

    /// Advances the envelope.
    pub fn update_state(&mut self, delta_t: Duration) {
        if let Some(age) = self.age {
            let new_age = age + delta_t;
            self.age = (new_age < Self::HOLD + Self::DECAY).then_some(new_age);
        }
    }

    /// The envelope's current level contribution.
    pub fn level(&self) -> Normal {
        match self.age {
            None => Normal::ZERO,
            Some(age) if age < Self::HOLD => Normal::ONE,
            Some(age) => {
                let into_decay = (age - Self::HOLD).as_secs_f64();
                Normal::new(1.0 - into_decay / Self::DECAY.as_secs_f64())
            }
        }
    }
}

/// Index of a virtual video channel.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct VideoChannel(pub usize);

/// One slot in the mixer stack. By default a layer holds a quiet placeholder
/// tunnel and outputs to video channel 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    #[allow(missing_docs)]
    pub beam: Beam,
    #[allow(missing_docs)]
    pub level: Normal,
    #[allow(missing_docs)]
    pub bump: BumpEnvelope,
    #[allow(missing_docs)]
    pub mask: bool,
    #[allow(missing_docs)]
    pub video_channels: HashSet<VideoChannel>,
    /// Operator-facing label; not transmitted.
    pub name: String,
}
impl Default for Layer {
    fn default() -> Self {
        let mut video_channels = HashSet::new();
        video_channels.insert(VideoChannel(0));
        Self {
            beam: Beam::default(),
            level: Normal::ZERO,
            bump: BumpEnvelope::default(),
            mask: false,
            video_channels,
            name: String::new(),
        }
    }
}
impl Layer {
    /// Advances the beam and the bump envelope.
    pub fn update_state(&mut self, delta_t: Duration, external_clocks: &ClockBank) {
        self.beam.update_state(delta_t, external_clocks);
        self.bump.update_state(delta_t);
    }

    /// The level this layer currently draws at: the fader, overridden by the
    /// bump envelope when that is higher.
    pub fn effective_level(&self) -> Normal {
        self.level.max(self.bump.level())
    }

    /// Renders this layer, or None when it is silent.
    pub fn render(&self, external_clocks: &ClockBank) -> Option<DrawEntity> {
        self.render_scaled(Normal::ONE, false, external_clocks)
    }

    /// Renders with an outer level scale and mask flag, for layers nested
    /// inside a look.
    pub fn render_scaled(
        &self,
        level_scale: Normal,
        mask: bool,
        external_clocks: &ClockBank,
    ) -> Option<DrawEntity> {
        let level = self.effective_level() * level_scale;
        if level == 0.0 {
            return None;
        }
        self.beam
            .render(level, self.mask || mask, external_clocks)
    }
}

/// Index of a mixer layer.
#[derive(Debug, Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LayerIdx(pub usize);

/// Holds the layer stack and understands how layers compose into channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mixer {
    layers: Vec<Layer>,
}
impl Default for Mixer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LAYER_COUNT)
    }
}
impl Mixer {
    /// How many independent video output streams exist.
    pub const N_VIDEO_CHANNELS: usize = 8;

    #[allow(missing_docs)]
    pub const DEFAULT_LAYER_COUNT: usize = 16;

    /// A mixer with the given number of (empty) layers. The layer count is
    /// fixed for the mixer's lifetime.
    pub fn new(n_layers: usize) -> Self {
        Self {
            layers: (0..n_layers).map(|_| Layer::default()).collect(),
        }
    }

    #[allow(missing_docs)]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// The beam in the given layer.
    pub fn beam(&mut self, layer: LayerIdx) -> &mut Beam {
        &mut self.layers[layer.0].beam
    }

    /// Iterates over all layers mutably, for presets and test setup.
    pub fn layers(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.layers.iter_mut()
    }

    /// Clones the contents of this mixer as a look.
    pub fn as_look(&self) -> Look {
        Look::from_layers(self.layers.clone())
    }

    /// Clobbers the state of this mixer with the provided look.
    pub fn set_look<E: EmitStateChange>(&mut self, look: Look, emitter: &mut E) {
        let n = self.layers.len();
        self.layers = look.layers;
        self.layers.resize_with(n, Layer::default);
        self.emit_state(emitter);
    }

    /// Advances every layer.
    pub fn update_state(&mut self, delta_t: Duration, external_clocks: &ClockBank) {
        for layer in &mut self.layers {
            layer.update_state(delta_t, external_clocks);
        }
    }

    /// Renders the current state of the mixer: one draw tree per video
    /// channel. Each tree is an ordered collection of layer outputs, lower
    /// layer index first, so the client composites in stack order.
    pub fn render(&self, external_clocks: &ClockBank) -> Vec<DrawEntity> {
        let mut channels: Vec<Vec<DrawEntity>> = (0..Self::N_VIDEO_CHANNELS)
            .map(|_| Vec::new())
            .collect();
        for layer in &self.layers {
            let Some(rendered) = layer.render(external_clocks) else {
                continue;
            };
            for vc in &layer.video_channels {
                if vc.0 < Self::N_VIDEO_CHANNELS {
                    channels[vc.0].push(rendered.clone());
                }
            }
        }
        channels.into_iter().map(DrawEntity::Collection).collect()
    }

    /// Emits the current value of all controllable mixer state.
    pub fn emit_state<E: EmitStateChange>(&self, emitter: &mut E) {
        for (index, layer) in self.layers.iter().enumerate() {
            let mut emit = |change| {
                emitter.emit_mixer_state_change(StateChange {
                    layer: LayerIdx(index),
                    change,
                })
            };
            emit(LayerStateChange::Level(layer.level));
            emit(LayerStateChange::Mask(layer.mask));
            emit(LayerStateChange::ContainsLook(matches!(
                layer.beam,
                Beam::Look(_)
            )));
            for vc in 0..Self::N_VIDEO_CHANNELS {
                let vc = VideoChannel(vc);
                emit(LayerStateChange::VideoChannel((
                    vc,
                    layer.video_channels.contains(&vc),
                )));
            }
        }
    }

    /// Handles a control event, emitting any state changes that result.
    pub fn control<E: EmitStateChange>(&mut self, msg: ControlMessage, emitter: &mut E) {
        use LayerControlMessage::*;
        let Some(layer) = self.layers.get_mut(msg.layer.0) else {
            log::error!("mixer layer {} out of range", msg.layer.0);
            return;
        };
        match msg.msg {
            Set(sc) => self.handle_state_change(
                StateChange {
                    layer: msg.layer,
                    change: sc,
                },
                emitter,
            ),
            Bump => {
                layer.bump.trigger();
            }
            ToggleMask => {
                let toggled = !layer.mask;
                self.handle_state_change(
                    StateChange {
                        layer: msg.layer,
                        change: LayerStateChange::Mask(toggled),
                    },
                    emitter,
                );
            }
            ToggleVideoChannel(vc) => {
                let toggled = !layer.video_channels.contains(&vc);
                self.handle_state_change(
                    StateChange {
                        layer: msg.layer,
                        change: LayerStateChange::VideoChannel((vc, toggled)),
                    },
                    emitter,
                );
            }
            Clear => {
                layer.beam = Beam::default();
                self.handle_state_change(
                    StateChange {
                        layer: msg.layer,
                        change: LayerStateChange::ContainsLook(false),
                    },
                    emitter,
                );
            }
        }
    }

    fn handle_state_change<E: EmitStateChange>(&mut self, sc: StateChange, emitter: &mut E) {
        use LayerStateChange::*;
        let layer = &mut self.layers[sc.layer.0];
        match sc.change {
            Level(v) => layer.level = v,
            Mask(v) => layer.mask = v,
            VideoChannel((vc, active)) => {
                if active {
                    layer.video_channels.insert(vc);
                } else {
                    layer.video_channels.remove(&vc);
                }
            }
            ContainsLook(_) => (),
        };
        emitter.emit_mixer_state_change(sc);
    }
}

/// A mixer control message, addressed to one layer.
#[derive(Debug, Clone)]
pub struct ControlMessage {
    #[allow(missing_docs)]
    pub layer: LayerIdx,
    #[allow(missing_docs)]
    pub msg: LayerControlMessage,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum LayerControlMessage {
    Set(LayerStateChange),
    /// Fire the bump envelope.
    Bump,
    ToggleMask,
    ToggleVideoChannel(VideoChannel),
    /// Replace the layer's beam with the placeholder.
    Clear,
}

/// A mixer state change, tagged with the layer it applies to.
#[derive(Debug, Clone)]
pub struct StateChange {
    #[allow(missing_docs)]
    pub layer: LayerIdx,
    #[allow(missing_docs)]
    pub change: LayerStateChange,
}

#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum LayerStateChange {
    Level(Normal),
    Mask(bool),
    VideoChannel((VideoChannel, bool)),
    /// Outgoing only: whether the layer holds a look.
    ContainsLook(bool),
}

#[allow(missing_docs)]
pub trait EmitStateChange {
    fn emit_mixer_state_change(&mut self, sc: StateChange);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::{
        ControlMessage as TunnelControlMessage, StateChange as TunnelStateChange, Tunnel,
    };
    use crate::types::Normal;

    struct NullEmitter;
    impl crate::show::EmitStateChange for NullEmitter {
        fn emit(&mut self, _: crate::show::StateChange) {}
    }

    fn set_level(mixer: &mut Mixer, layer: usize, level: f64) {
        mixer.control(
            ControlMessage {
                layer: LayerIdx(layer),
                msg: LayerControlMessage::Set(LayerStateChange::Level(Normal::new(level))),
            },
            &mut NullEmitter,
        );
    }

    fn distinct_tunnel(hue: f64) -> Beam {
        let mut tunnel = Tunnel::default();
        tunnel.control(
            TunnelControlMessage::Set(TunnelStateChange::ColorCenter(Normal::new(hue))),
            &mut NullEmitter,
        );
        Beam::Tunnel(tunnel)
    }

    #[test]
    fn empty_mixer_renders_empty_collections() {
        let mixer = Mixer::default();
        let clocks = ClockBank::default();
        let channels = mixer.render(&clocks);
        assert_eq!(channels.len(), Mixer::N_VIDEO_CHANNELS);
        for channel in channels {
            assert_eq!(channel, DrawEntity::empty());
        }
    }

    #[test]
    fn layer_order_is_preserved() {
        let mut mixer = Mixer::default();
        let clocks = ClockBank::default();
        *mixer.beam(LayerIdx(0)) = distinct_tunnel(0.25);
        *mixer.beam(LayerIdx(1)) = distinct_tunnel(0.75);
        set_level(&mut mixer, 0, 1.0);
        set_level(&mut mixer, 1, 1.0);

        let channels = mixer.render(&clocks);
        let DrawEntity::Collection(entities) = &channels[0] else {
            panic!("expected a collection");
        };
        assert_eq!(entities.len(), 2);
        let hues: Vec<f32> = entities
            .iter()
            .map(|e| match e {
                DrawEntity::Arcs(arcs) => arcs[0].hue,
                other => panic!("expected arcs, got {other:?}"),
            })
            .collect();
        assert!((hues[0] - 0.25).abs() < 1e-6);
        assert!((hues[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn silent_layers_are_omitted() {
        let mut mixer = Mixer::default();
        let clocks = ClockBank::default();
        set_level(&mut mixer, 3, 0.5);
        let channels = mixer.render(&clocks);
        let DrawEntity::Collection(entities) = &channels[0] else {
            panic!("expected a collection");
        };
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn video_channel_fan_out() {
        let mut mixer = Mixer::default();
        let clocks = ClockBank::default();
        set_level(&mut mixer, 0, 1.0);
        mixer.control(
            ControlMessage {
                layer: LayerIdx(0),
                msg: LayerControlMessage::ToggleVideoChannel(VideoChannel(3)),
            },
            &mut NullEmitter,
        );
        let channels = mixer.render(&clocks);
        assert_ne!(channels[0], DrawEntity::empty());
        assert_ne!(channels[3], DrawEntity::empty());
        assert_eq!(channels[1], DrawEntity::empty());
    }

    #[test]
    fn bump_decay_is_monotonic_and_total() {
        let mut layer = Layer::default();
        layer.bump.trigger();
        assert_eq!(layer.effective_level(), 1.0);

        let mut last = 1.0;
        let mut elapsed = Duration::ZERO;
        let step = Duration::from_millis(10);
        while elapsed < Duration::from_millis(400) {
            layer.bump.update_state(step);
            elapsed += step;
            let level = layer.effective_level().val();
            assert!(level <= last + 1e-9, "bump level rose during decay");
            last = level;
        }
        assert_eq!(layer.effective_level(), 0.0);
    }

    #[test]
    fn bump_overrides_lower_fader() {
        let mut mixer = Mixer::default();
        let clocks = ClockBank::default();
        mixer.control(
            ControlMessage {
                layer: LayerIdx(0),
                msg: LayerControlMessage::Bump,
            },
            &mut NullEmitter,
        );
        let channels = mixer.render(&clocks);
        let DrawEntity::Collection(entities) = &channels[0] else {
            panic!("expected a collection");
        };
        let DrawEntity::Arcs(arcs) = &entities[0] else {
            panic!("expected arcs");
        };
        assert_eq!(arcs[0].level, 255);
    }

    #[test]
    fn masked_layer_does_not_suppress_others() {
        let mut mixer = Mixer::default();
        let clocks = ClockBank::default();
        set_level(&mut mixer, 0, 1.0);
        set_level(&mut mixer, 1, 1.0);
        mixer.control(
            ControlMessage {
                layer: LayerIdx(0),
                msg: LayerControlMessage::ToggleMask,
            },
            &mut NullEmitter,
        );
        let channels = mixer.render(&clocks);
        let DrawEntity::Collection(entities) = &channels[0] else {
            panic!("expected a collection");
        };
        // Both layers still render; the masked one is a black cutout.
        assert_eq!(entities.len(), 2);
        let DrawEntity::Arcs(masked) = &entities[0] else {
            panic!("expected arcs");
        };
        assert_eq!(masked[0].val, 0);
        let DrawEntity::Arcs(unmasked) = &entities[1] else {
            panic!("expected arcs");
        };
        assert_eq!(unmasked[0].val, 255);
    }

    #[test]
    fn look_round_trip_preserves_layers() {
        let mut mixer = Mixer::default();
        *mixer.beam(LayerIdx(2)) = distinct_tunnel(0.5);
        set_level(&mut mixer, 2, 1.0);
        let look = mixer.as_look();

        let mut other = Mixer::default();
        other.set_look(look, &mut NullEmitter);
        assert_eq!(other.layer_count(), Mixer::DEFAULT_LAYER_COUNT);
        let clocks = ClockBank::default();
        let channels = other.render(&clocks);
        assert_ne!(channels[0], DrawEntity::empty());
    }
}
