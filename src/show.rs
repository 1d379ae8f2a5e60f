// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The show: one owned aggregate of everything that makes pictures -- the
//! mixer, the clocks, the control mapper -- plus the fixed-rate tick loop
//! that drives it all and the snapshot export that persists it.

use crate::{
    animation, clock_bank,
    clock_bank::ClockBank,
    control::{self, ControlMapper, Dispatcher},
    midi::DeviceSpec as MidiDeviceSpec,
    mixer,
    mixer::Mixer,
    modulation,
    osc::DeviceSpec as OscDeviceSpec,
    publish::{FramePublisher, RenderedFrame},
    tunnel,
    types::Timestamp,
    util::{LogThrottle, RunFlag},
};
use anyhow::{bail, Result};
use log::{error, info, warn};
use rmp_serde::{Deserializer, Serializer};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// How often the show autosaves, when a save path is set.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(60);

/// The default tick period, a hair under 60 Hz.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(17);

/// Top-level enum for the control messages the show can receive.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum ControlMessage {
    Tunnel(tunnel::ControlMessage),
    Animator(animation::ControlMessage),
    AnimatorSlot(modulation::ControlMessage),
    Mixer(mixer::ControlMessage),
    Clock(clock_bank::ControlMessage),
    Mapper(control::MapperControlMessage),
}

/// Top-level enum for state changes flowing back out to surfaces.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum StateChange {
    Tunnel(tunnel::StateChange),
    Animator(animation::StateChange),
    AnimatorSlot(modulation::StateChange),
    Mixer(mixer::StateChange),
    Clock(clock_bank::StateChange),
    Mapper(control::MapperStateChange),
}

/// Anything that can publish show state changes to the outside world.
pub trait EmitStateChange {
    #[allow(missing_docs)]
    fn emit(&mut self, sc: StateChange);
}

impl<T: EmitStateChange> tunnel::EmitStateChange for T {
    fn emit_tunnel_state_change(&mut self, sc: tunnel::StateChange) {
        self.emit(StateChange::Tunnel(sc))
    }
}
impl<T: EmitStateChange> animation::EmitStateChange for T {
    fn emit_animator_state_change(&mut self, sc: animation::StateChange) {
        self.emit(StateChange::Animator(sc))
    }
}
impl<T: EmitStateChange> modulation::EmitStateChange for T {
    fn emit_modulator_state_change(&mut self, sc: modulation::StateChange) {
        self.emit(StateChange::AnimatorSlot(sc))
    }
}
impl<T: EmitStateChange> mixer::EmitStateChange for T {
    fn emit_mixer_state_change(&mut self, sc: mixer::StateChange) {
        self.emit(StateChange::Mixer(sc))
    }
}
impl<T: EmitStateChange> clock_bank::EmitStateChange for T {
    fn emit_clock_bank_state_change(&mut self, sc: clock_bank::StateChange) {
        self.emit(StateChange::Clock(sc))
    }
}

/// Everything that persists in a snapshot: the scene, the clocks, and the
/// surface page/bank selections.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShowState {
    #[allow(missing_docs)]
    pub mapper: ControlMapper,
    #[allow(missing_docs)]
    pub mixer: Mixer,
    #[allow(missing_docs)]
    pub clocks: ClockBank,
}

/// The running show.
pub struct Show {
    dispatcher: Dispatcher,
    state: ShowState,
    save_path: Option<PathBuf>,
    last_save: Option<Instant>,
}
impl Show {
    /// Creates a new show, connecting all configured control transports.
    pub fn new(
        midi_devices: Vec<MidiDeviceSpec>,
        osc_devices: Vec<OscDeviceSpec>,
        n_layers: usize,
        save_path: Option<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(midi_devices, osc_devices)?,
            state: ShowState {
                mapper: ControlMapper::new(n_layers),
                mixer: Mixer::new(n_layers),
                clocks: ClockBank::default(),
            },
            save_path,
            last_save: None,
        })
    }

    /// Applies a setup function to the mixer, for presets and test scenes.
    pub fn setup(&mut self, setup: impl FnOnce(&mut Mixer)) {
        setup(&mut self.state.mixer);
    }

    /// Loads a saved snapshot into self. Fails if the saved mixer dimensions
    /// don't match the current show.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let loaded: ShowState = ShowState::deserialize(&mut Deserializer::new(file))?;
        if loaded.mixer.layer_count() != self.state.mixer.layer_count() {
            bail!(
                "Mixer size mismatch. Loaded: {}, show: {}.",
                loaded.mixer.layer_count(),
                self.state.mixer.layer_count()
            );
        }
        self.state = loaded;
        Ok(())
    }

    /// Exports the current state as a snapshot file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        self.state
            .serialize(&mut Serializer::new(BufWriter::new(&mut file)))?;
        Ok(())
    }

    /// Saves if a save path is set and the autosave interval has elapsed.
    fn autosave(&mut self) -> Result<()> {
        let Some(path) = &self.save_path else {
            return Ok(());
        };
        let now = Instant::now();
        let due = match self.last_save {
            Some(t) => t + AUTOSAVE_INTERVAL <= now,
            None => true,
        };
        if due {
            info!("Autosaving.");
            let result = self.save(&path.clone());
            if result.is_ok() {
                self.last_save = Some(now);
            }
            return result;
        }
        Ok(())
    }

    /// Runs the show until the flag clears: the fixed-tick loop described in
    /// the module docs. Binds the publisher before the first tick so
    /// configuration errors abort startup instead of surfacing mid-show.
    pub fn run(
        &mut self,
        run_flag: RunFlag,
        publish_addr: &str,
        tick_interval: Duration,
    ) -> Result<()> {
        info!("Show is starting.");
        let ctx = zmq::Context::new();
        let publisher = FramePublisher::start(&ctx, publish_addr)?;

        // Mirror full initial state to every surface.
        self.state.mapper.emit_state(
            &mut self.state.mixer,
            &self.state.clocks,
            &mut self.dispatcher,
        );

        let start = Instant::now();
        let mut frame_number: u32 = 0;
        let mut last_update = start;
        let mut slip_log = LogThrottle::per_minute();

        while run_flag.should_run() {
            let tick_start = Instant::now();

            // Drain controller input, applying mutations in arrival order.
            // The dispatcher doubles as the echo emitter, so every mutation
            // is mirrored back to all surfaces: last writer wins, and every
            // surface sees it.
            for msg in self.dispatcher.drain() {
                self.state.mapper.handle_control_message(
                    msg,
                    &mut self.state.mixer,
                    &mut self.state.clocks,
                    &mut self.dispatcher,
                );
            }

            // Advance all clocks and scene state by measured wall time.
            let now = Instant::now();
            self.update_state(now - last_update);
            last_update = now;

            // Render and hand off; the channel send never blocks.
            publisher.send(RenderedFrame {
                number: frame_number,
                timestamp: Timestamp::since(start),
                channels: self.state.mixer.render(&self.state.clocks),
            });
            frame_number = frame_number.wrapping_add(1);

            if let Err(e) = self.autosave() {
                error!("Autosave error: {e}.");
            }

            // Sleep off the rest of the tick; a missed deadline skips the
            // sleep and logs the slip.
            let deadline = tick_start + tick_interval;
            let now = Instant::now();
            match deadline.checked_duration_since(now) {
                Some(remaining) => thread::sleep(remaining),
                None => {
                    if slip_log.should_log() {
                        warn!("Tick loop slipped by {:?}.", now - deadline);
                    }
                }
            }
        }

        // Finish cleanly: close the publisher only after the loop has
        // exited, so nothing is published after this returns.
        publisher.close();
        info!("Show stopped.");
        Ok(())
    }

    fn update_state(&mut self, delta_t: Duration) {
        self.state
            .clocks
            .update_state(delta_t, &mut self.dispatcher);
        self.state
            .mixer
            .update_state(delta_t, &self.state.clocks);
    }

    /// How many controller events have been discarded so far.
    pub fn discard_count(&self) -> usize {
        self.dispatcher.discard_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        control::{ControlEvent, Device},
        midi::{cc_ch0, event},
        snapshot::{DrawEntity, Snapshot},
    };

    fn offline_show() -> Show {
        Show::new(Vec::new(), Vec::new(), Mixer::DEFAULT_LAYER_COUNT, None).unwrap()
    }

    /// Booting an empty show and rendering one frame yields an empty
    /// collection (tag 0, count 0) on every configured channel.
    #[test]
    fn empty_scene_first_frame() {
        let show = offline_show();
        let channels = show.state.mixer.render(&show.state.clocks);
        assert_eq!(channels.len(), Mixer::N_VIDEO_CHANNELS);
        for root in channels {
            let snapshot = Snapshot {
                frame_number: 0,
                time: Timestamp(0),
                root,
            };
            let bytes = rmp_serde::to_vec(&snapshot).unwrap();
            // frame number 0, timestamp 0, then [0, [0, []]]
            assert_eq!(bytes, vec![0x93, 0x00, 0x00, 0x92, 0x00, 0x92, 0x00, 0x90]);
        }
    }

    /// A controller event injected at the transport boundary flows through
    /// the binding table into the scene.
    #[test]
    fn midi_event_mutates_scene() {
        let mut show = offline_show();
        // Raise layer 0's fader so the tunnel renders.
        show.setup(|mixer| {
            use crate::mixer::{ControlMessage, LayerControlMessage, LayerIdx, LayerStateChange};
            use crate::types::Normal;
            mixer.control(
                ControlMessage {
                    layer: LayerIdx(0),
                    msg: LayerControlMessage::Set(LayerStateChange::Level(Normal::ONE)),
                },
                &mut NullEmitter,
            );
        });

        // Thickness knob to zero: arcs collapse to zero span.
        let sender = show.dispatcher.event_sender();
        sender
            .send(ControlEvent::Midi((
                Device::AkaiApc40,
                event(cc_ch0(21), 0),
            )))
            .unwrap();

        for msg in show.dispatcher.drain() {
            show.state.mapper.handle_control_message(
                msg,
                &mut show.state.mixer,
                &mut show.state.clocks,
                &mut NullEmitter,
            );
        }

        let channels = show.state.mixer.render(&show.state.clocks);
        let DrawEntity::Collection(entities) = &channels[0] else {
            panic!("expected a collection");
        };
        let DrawEntity::Arcs(arcs) = &entities[0] else {
            panic!("expected arcs");
        };
        for arc in arcs {
            let span = (arc.stop - arc.start).rem_euclid(1.0);
            assert!(span.abs() < 1e-6, "span {span} should be zero");
        }
    }

    struct NullEmitter;
    impl EmitStateChange for NullEmitter {
        fn emit(&mut self, _: StateChange) {}
    }

    /// Snapshot export round-trips through a file.
    #[test]
    fn snapshot_save_load_round_trip() {
        let dir = std::env::temp_dir().join("gyre-show-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot");

        let mut show = offline_show();
        show.setup(|mixer| {
            use crate::mixer::LayerIdx;
            if let crate::beam::Beam::Tunnel(t) = mixer.beam(LayerIdx(0)) {
                t.control(
                    tunnel::ControlMessage::Set(tunnel::StateChange::Segments(11)),
                    &mut NullEmitter,
                );
            }
        });
        show.save(&path).unwrap();

        let mut restored = offline_show();
        restored.load(&path).unwrap();
        restored.setup(|mixer| {
            use crate::mixer::LayerIdx;
            let crate::beam::Beam::Tunnel(t) = mixer.beam(LayerIdx(0)) else {
                panic!("expected a tunnel");
            };
            let arcs = t.render(crate::types::Normal::ONE, false, &ClockBank::default());
            assert_eq!(arcs.len(), 11);
        });
        std::fs::remove_file(&path).ok();
    }

    /// After the run flag clears, run() returns and the publisher is gone.
    #[test]
    fn shutdown_finishes_in_flight_tick() {
        let flag = RunFlag::new();
        let thread_flag = flag.clone();
        let handle = thread::spawn(move || {
            let mut show = offline_show();
            show.run(
                thread_flag,
                "inproc://show-shutdown-test",
                Duration::from_millis(5),
            )
        });
        thread::sleep(Duration::from_millis(100));
        flag.stop();
        let result = handle.join().expect("show thread panicked");
        assert!(result.is_ok());
    }
}
