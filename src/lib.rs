// Copyright (c) 2024 Mike Tsao. All rights reserved.

#![warn(missing_docs)]

//! Gyre is a live visual-performance server. It turns MIDI and OSC performer
//! input plus clock-synchronized waveform animation into a stream of compact
//! per-frame draw commands, broadcast to rasterizing display clients over
//! the network. The clients draw; this crate decides what gets drawn.

/// The animator: a parameterized waveform emitting a modulation value each tick.
pub mod animation;
/// The drawable-entity sum type.
pub mod beam;
/// Phase-accumulating clocks and tap-tempo estimation.
pub mod clock;
/// The master clock and the auxiliary clock bank.
pub mod clock_bank;
/// The control plane: binding tables, dispatch, and page/bank state.
pub mod control;
/// Line beams.
pub mod line;
/// Looks: whole mixers frozen into a single beam.
pub mod look;
/// MIDI surface I/O.
pub mod midi;
/// The mixer: ordered, leveled, maskable layers.
pub mod mixer;
/// Animator banks and their targets.
pub mod modulation;
/// OSC surface input.
pub mod osc;
/// Frame serialization and broadcast.
pub mod publish;
/// Startup configuration.
pub mod settings;
/// The show aggregate and the tick loop.
pub mod show;
/// The frame wire contract.
pub mod snapshot;
/// Ellipsoidal tunnels.
pub mod tunnel;
/// Common numeric types.
pub mod types;
/// Small cross-thread helpers.
pub mod util;
/// Pure waveform evaluation.
pub mod waveforms;

/// The most commonly used imports.
pub mod prelude {
    pub use crate::{
        beam::Beam,
        clock_bank::{ClockBank, ClockSource},
        mixer::{LayerIdx, Mixer, VideoChannel},
        settings::Settings,
        show::{Show, ShowState},
        tunnel::Tunnel,
        types::{BipolarNormal, Normal, Phase, Timestamp},
        util::RunFlag,
    };
}
