// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The show's clocks: one master clock that defines beat time, plus a bank
//! of independently tap-tempo'd auxiliary clocks that animations can follow.

use crate::{
    clock::{
        ControlMessage as ClockControlMessage, ControllableClock,
        EmitStateChange as EmitClockStateChange, StateChange as ClockStateChange,
    },
    types::{Normal, Phase},
};
use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many auxiliary clocks are available.
pub const N_CLOCKS: usize = 4;

/// Index of an auxiliary clock. Validated to always be in range.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClockIdx(usize);
impl ClockIdx {
    #[allow(missing_docs)]
    pub fn val(&self) -> usize {
        self.0
    }
}

/// A "request" for an auxiliary clock index, from a controller or a wire
/// message. Must be validated to become a proper [ClockIdx].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClockIdxExt(pub usize);
impl TryFrom<ClockIdxExt> for ClockIdx {
    type Error = Error;
    fn try_from(value: ClockIdxExt) -> Result<Self, Self::Error> {
        if value.0 >= N_CLOCKS {
            bail!("clock index {} out of range", value.0);
        }
        Ok(ClockIdx(value.0))
    }
}

/// Which clock an animator follows when it is clock-locked.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockSource {
    /// The show's master beat clock.
    Master,
    /// One of the auxiliary clocks.
    Aux(ClockIdx),
}

/// The master clock plus the auxiliary clock bank, behind one aggregate so
/// that everything that needs beat time sees a consistent view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockBank {
    master: ControllableClock,
    aux: [ControllableClock; N_CLOCKS],
}
impl Default for ClockBank {
    fn default() -> Self {
        Self {
            master: ControllableClock::new_with_rate(Self::DEFAULT_MASTER_RATE),
            aux: Default::default(),
        }
    }
}
impl ClockBank {
    /// 120 BPM in cycles per second.
    const DEFAULT_MASTER_RATE: f64 = 2.0;

    /// The master clock's current beat phase.
    pub fn master_phase(&self) -> Phase {
        self.master.phase()
    }

    /// Completed master beats since the show started.
    pub fn beat_number(&self) -> u64 {
        self.master.beat_count()
    }

    /// How many master beats elapse over the provided wall-time interval at
    /// the current master rate. Used to integrate beat-domain quantities
    /// (such as rotation modulation) over a tick.
    pub fn master_beats(&self, delta_t: Duration) -> f64 {
        self.master.rate() * delta_t.as_secs_f64()
    }

    /// The phase of the referenced clock.
    pub fn phase(&self, source: ClockSource) -> Phase {
        match source {
            ClockSource::Master => self.master.phase(),
            ClockSource::Aux(idx) => self.aux[idx.0].phase(),
        }
    }

    /// The submaster level of the referenced clock.
    pub fn submaster_level(&self, source: ClockSource) -> Normal {
        match source {
            ClockSource::Master => self.master.submaster_level(),
            ClockSource::Aux(idx) => self.aux[idx.0].submaster_level(),
        }
    }

    /// Advances every clock by one timestep.
    pub fn update_state<E: EmitStateChange>(&mut self, delta_t: Duration, emitter: &mut E) {
        self.master.update_state(
            delta_t,
            &mut ChannelEmitter {
                channel: None,
                emitter,
            },
        );
        for (i, clock) in self.aux.iter_mut().enumerate() {
            clock.update_state(
                delta_t,
                &mut ChannelEmitter {
                    channel: Some(ClockIdx(i)),
                    emitter,
                },
            );
        }
    }

    /// Emits the current value of all controllable clock state.
    pub fn emit_state<E: EmitStateChange>(&self, emitter: &mut E) {
        self.master.emit_state(&mut ChannelEmitter {
            channel: None,
            emitter,
        });
        for (i, clock) in self.aux.iter().enumerate() {
            clock.emit_state(&mut ChannelEmitter {
                channel: Some(ClockIdx(i)),
                emitter,
            });
        }
    }

    /// Handles a control event, emitting any state changes that result.
    pub fn control<E: EmitStateChange>(&mut self, msg: ControlMessage, emitter: &mut E) {
        match msg.channel {
            None => self.master.control(
                msg.msg,
                &mut ChannelEmitter {
                    channel: None,
                    emitter,
                },
            ),
            Some(ext) => {
                let channel: ClockIdx = match ext.try_into() {
                    Ok(id) => id,
                    Err(e) => {
                        log::error!("could not process clock control message: {e}");
                        return;
                    }
                };
                self.aux[channel.0].control(
                    msg.msg,
                    &mut ChannelEmitter {
                        channel: Some(channel),
                        emitter,
                    },
                );
            }
        }
    }
}

/// Adds the clock channel into outgoing clock messages.
struct ChannelEmitter<'e, E: EmitStateChange> {
    /// None addresses the master clock.
    channel: Option<ClockIdx>,
    emitter: &'e mut E,
}
impl<'e, E: EmitStateChange> EmitClockStateChange for ChannelEmitter<'e, E> {
    fn emit_clock_state_change(&mut self, sc: ClockStateChange) {
        self.emitter.emit_clock_bank_state_change(StateChange {
            channel: self.channel,
            change: sc,
        })
    }
}

/// A clock control message, addressed to the master (None) or an aux clock.
#[derive(Debug, Copy, Clone)]
pub struct ControlMessage {
    #[allow(missing_docs)]
    pub channel: Option<ClockIdxExt>,
    #[allow(missing_docs)]
    pub msg: ClockControlMessage,
}

/// A clock state change, tagged with the clock it came from.
#[derive(Debug, Copy, Clone)]
pub struct StateChange {
    #[allow(missing_docs)]
    pub channel: Option<ClockIdx>,
    #[allow(missing_docs)]
    pub change: ClockStateChange,
}

#[allow(missing_docs)]
pub trait EmitStateChange {
    fn emit_clock_bank_state_change(&mut self, sc: StateChange);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEmitter;
    impl crate::show::EmitStateChange for NullEmitter {
        fn emit(&mut self, _: crate::show::StateChange) {}
    }

    #[test]
    fn clock_index_validation() {
        assert!(ClockIdx::try_from(ClockIdxExt(0)).is_ok());
        assert!(ClockIdx::try_from(ClockIdxExt(N_CLOCKS)).is_err());
    }

    #[test]
    fn master_beats_integrate_rate() {
        let bank = ClockBank::default();
        let beats = bank.master_beats(Duration::from_millis(500));
        assert!((beats - 1.0).abs() < 1e-9);
    }

    #[test]
    fn master_and_aux_phases_are_independent() {
        let mut bank = ClockBank::default();
        bank.update_state(Duration::from_millis(125), &mut NullEmitter);
        // Master runs at the default rate; aux clocks start stopped.
        assert!((bank.master_phase().val() - 0.25).abs() < 1e-9);
        let aux = ClockSource::Aux(ClockIdx(0));
        assert_eq!(bank.phase(aux), Phase::ZERO);
    }
}
