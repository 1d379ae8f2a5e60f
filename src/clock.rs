// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Phase-accumulating clocks and tap-tempo estimation.

use crate::types::{BipolarNormal, Normal, Phase};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A bare phase accumulator: a phase on [0, 1) advanced by `rate` cycles per
/// second on every state update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clock {
    phase: Phase,
    /// Cycles per second. Signed; negative rates run the phase backwards.
    pub rate: f64,
    /// Did the phase wrap on the most recent update?
    ticked: bool,
    /// Reset phase to zero on the next update instead of advancing.
    reset_on_update: bool,
}
impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
impl Clock {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self {
            phase: Phase::ZERO,
            rate: 0.0,
            ticked: true,
            reset_on_update: false,
        }
    }

    /// Advances the phase by one timestep.
    pub fn update_state(&mut self, delta_t: Duration) {
        if self.reset_on_update {
            self.ticked = true;
            self.phase = Phase::ZERO;
            self.reset_on_update = false;
        } else {
            let new_angle = self.phase.val() + self.rate * delta_t.as_secs_f64();
            self.ticked = !(0.0..1.0).contains(&new_angle);
            self.phase = Phase::new(new_angle);
        }
    }

    #[allow(missing_docs)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Requests a phase reset at the next update.
    pub fn reset(&mut self) {
        self.reset_on_update = true;
    }

    /// Shifts the phase immediately by the given amount, wrapping.
    pub fn phase_nudge(&mut self, amount: f64) {
        self.phase += amount;
    }

    /// True if the phase wrapped on the most recent update.
    pub fn ticked(&self) -> bool {
        self.ticked
    }
}

/// Warm-up states of the tap-tempo estimator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapTempoState {
    /// Fewer than two taps; the estimate is the default period.
    Cold,
    /// An estimate exists but the window is not yet full.
    Warm,
    /// A full window of consistent taps.
    Locked,
}

/// Estimates a beat period from a series of tap events.
///
/// The estimate is the median of the pairwise deltas in a sliding window of
/// the last [TapTempo::WINDOW] taps. A tap arriving more than twice the
/// current period after its predecessor is treated as the start of a new
/// phrase: the window restarts rather than polluting the estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapTempo {
    #[serde(skip, default)]
    taps: Vec<Instant>,
    period_secs: f64,
}
impl Default for TapTempo {
    fn default() -> Self {
        Self {
            taps: Vec::with_capacity(Self::WINDOW),
            period_secs: Self::DEFAULT_PERIOD.as_secs_f64(),
        }
    }
}
impl TapTempo {
    /// Sliding window size, in taps.
    pub const WINDOW: usize = 4;

    /// 120 BPM, the cold-start estimate.
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(500);

    /// Processes a tap at the provided instant. Returns the new rate estimate
    /// in cycles per second if the tap updated it.
    ///
    /// Taking the instant as an argument rather than sampling the clock here
    /// keeps the estimator deterministic under test.
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        if let Some(last) = self.taps.last() {
            let delta = now.saturating_duration_since(*last).as_secs_f64();
            if delta > 2.0 * self.period_secs {
                self.taps.clear();
                self.taps.push(now);
                return None;
            }
        }
        if self.taps.len() == Self::WINDOW {
            self.taps.remove(0);
        }
        self.taps.push(now);
        if self.taps.len() < 2 {
            return None;
        }

        let mut deltas: Vec<f64> = self
            .taps
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_secs_f64())
            .collect();
        deltas.sort_by(f64::total_cmp);
        let mid = deltas.len() / 2;
        self.period_secs = if deltas.len() % 2 == 0 {
            (deltas[mid - 1] + deltas[mid]) / 2.0
        } else {
            deltas[mid]
        };
        Some(self.rate())
    }

    /// The current period estimate.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period_secs)
    }

    /// The current rate estimate in cycles per second.
    pub fn rate(&self) -> f64 {
        1.0 / self.period_secs
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> TapTempoState {
        match self.taps.len() {
            0 | 1 => TapTempoState::Cold,
            n if n < Self::WINDOW => TapTempoState::Warm,
            _ => TapTempoState::Locked,
        }
    }
}

/// A clock with a complete set of performer-facing controls: rate knob, tap
/// tempo, phase nudge, retrigger mode, and a submaster level that scales any
/// animation following this clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllableClock {
    clock: Clock,
    sync: TapTempo,
    /// If true, every tap resets phase to zero instead of feeding the
    /// estimator.
    retrigger: bool,
    submaster_level: Normal,
    beats: u64,
    #[serde(skip, default)]
    tick_age: Option<Duration>,
}
impl Default for ControllableClock {
    fn default() -> Self {
        Self {
            clock: Clock::new(),
            sync: TapTempo::default(),
            retrigger: false,
            submaster_level: Normal::ONE,
            beats: 0,
            tick_age: None,
        }
    }
}
impl ControllableClock {
    /// Cycles per second at full knob deflection. Negative so that turning
    /// the knob clockwise runs animations in the visually expected direction
    /// around the ring.
    pub const RATE_SCALE: f64 = -1.5;

    /// How long the tick indicator stays lit on bound surfaces.
    const TICK_DISPLAY_DURATION: Duration = Duration::from_millis(250);

    /// A clock running at the given rate in cycles per second.
    pub fn new_with_rate(rate: f64) -> Self {
        let mut c = Self::default();
        c.clock.rate = rate;
        c
    }

    #[allow(missing_docs)]
    pub fn phase(&self) -> Phase {
        self.clock.phase()
    }

    #[allow(missing_docs)]
    pub fn rate(&self) -> f64 {
        self.clock.rate
    }

    #[allow(missing_docs)]
    pub fn submaster_level(&self) -> Normal {
        self.submaster_level
    }

    /// Completed cycles since the show started.
    pub fn beat_count(&self) -> u64 {
        self.beats
    }

    /// Advances the clock; may emit tick-indicator state changes.
    pub fn update_state<E: EmitStateChange>(&mut self, delta_t: Duration, emitter: &mut E) {
        self.clock.update_state(delta_t);
        if self.clock.ticked() {
            self.beats += 1;
            emitter.emit_clock_state_change(StateChange::Ticked(true));
            self.tick_age = Some(Duration::ZERO);
        } else if let Some(tick_age) = self.tick_age {
            let new_tick_age = tick_age + delta_t;
            if new_tick_age > Self::TICK_DISPLAY_DURATION {
                self.tick_age = None;
                emitter.emit_clock_state_change(StateChange::Ticked(false));
            } else {
                self.tick_age = Some(new_tick_age);
            }
        }
    }

    /// Emits the current value of all controllable state.
    pub fn emit_state<E: EmitStateChange>(&self, emitter: &mut E) {
        use StateChange::*;
        emitter.emit_clock_state_change(Rate(BipolarNormal::new(
            self.clock.rate / Self::RATE_SCALE,
        )));
        emitter.emit_clock_state_change(Retrigger(self.retrigger));
        emitter.emit_clock_state_change(SubmasterLevel(self.submaster_level));
        emitter.emit_clock_state_change(Ticked(self.tick_age.is_some()));
    }

    /// Handles a control event, emitting any state changes that result.
    pub fn control<E: EmitStateChange>(&mut self, msg: ControlMessage, emitter: &mut E) {
        use ControlMessage::*;
        match msg {
            Set(sc) => self.handle_state_change(sc, emitter),
            Tap(at) => {
                if self.retrigger {
                    self.clock.reset();
                } else if let Some(rate) = self.sync.tap(at) {
                    self.clock.rate = rate;
                    emitter.emit_clock_state_change(StateChange::Rate(BipolarNormal::new(
                        self.clock.rate / Self::RATE_SCALE,
                    )));
                }
            }
            Nudge => {
                self.clock.reset();
            }
        }
    }

    fn handle_state_change<E: EmitStateChange>(&mut self, sc: StateChange, emitter: &mut E) {
        use StateChange::*;
        match sc {
            Rate(v) => self.clock.rate = v.val() * Self::RATE_SCALE,
            Retrigger(v) => self.retrigger = v,
            SubmasterLevel(v) => self.submaster_level = v,
            Ticked(_) => (),
        };
        emitter.emit_clock_state_change(sc);
    }
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum StateChange {
    Rate(BipolarNormal),
    Retrigger(bool),
    SubmasterLevel(Normal),
    /// Outgoing only; no effect as a control.
    Ticked(bool),
}

#[derive(Debug, Copy, Clone)]
#[allow(missing_docs)]
pub enum ControlMessage {
    Set(StateChange),
    /// A tap event with the instant it arrived.
    Tap(Instant),
    /// Resync phase to zero.
    Nudge,
}

#[allow(missing_docs)]
pub trait EmitStateChange {
    fn emit_clock_state_change(&mut self, sc: StateChange);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEmitter;
    impl EmitStateChange for NullEmitter {
        fn emit_clock_state_change(&mut self, _: StateChange) {}
    }

    #[test]
    fn clock_advances_and_wraps() {
        let mut clock = Clock::new();
        clock.rate = 2.0;
        clock.update_state(Duration::from_millis(250));
        assert!((clock.phase().val() - 0.5).abs() < 1e-9);
        assert!(!clock.ticked());
        clock.update_state(Duration::from_millis(300));
        assert!(clock.ticked());
        assert!((clock.phase().val() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn clock_reset_takes_effect_on_next_update() {
        let mut clock = Clock::new();
        clock.rate = 1.0;
        clock.update_state(Duration::from_millis(300));
        clock.reset();
        clock.update_state(Duration::from_millis(100));
        assert_eq!(clock.phase(), Phase::ZERO);
        assert!(clock.ticked());
    }

    #[test]
    fn tap_tempo_converges_on_steady_taps() {
        let mut sync = TapTempo::default();
        let start = Instant::now();
        let period = Duration::from_millis(400);
        assert_eq!(sync.state(), TapTempoState::Cold);
        let mut rate = None;
        for i in 0..6u32 {
            rate = sync.tap(start + period * i).or(rate);
        }
        assert_eq!(sync.state(), TapTempoState::Locked);
        let rate = rate.unwrap();
        assert!((rate - 2.5).abs() < 1e-6, "estimated rate {rate}");
        assert!((sync.period().as_secs_f64() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn tap_tempo_median_rejects_jitter() {
        let mut sync = TapTempo::default();
        let start = Instant::now();
        // Three clean deltas of 500ms with one 560ms outlier in the middle;
        // the median should stay at 500ms.
        let mut t = start;
        for delta_ms in [0u64, 500, 560, 500, 500] {
            t += Duration::from_millis(delta_ms);
            sync.tap(t);
        }
        let period = sync.period().as_secs_f64();
        assert!((period - 0.5).abs() < 0.011, "period {period}");
    }

    #[test]
    fn tap_tempo_restarts_after_long_gap() {
        let mut sync = TapTempo::default();
        let start = Instant::now();
        for i in 0..4u32 {
            sync.tap(start + Duration::from_millis(400) * i);
        }
        assert_eq!(sync.state(), TapTempoState::Locked);
        // A tap far beyond 2x the period restarts the window.
        assert!(sync.tap(start + Duration::from_secs(10)).is_none());
        assert_eq!(sync.state(), TapTempoState::Cold);
        // The previous estimate survives until new taps replace it.
        assert!((sync.period().as_secs_f64() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn nudge_resyncs_phase() {
        let mut clock = ControllableClock::new_with_rate(1.0);
        clock.update_state(Duration::from_millis(300), &mut NullEmitter);
        clock.control(ControlMessage::Nudge, &mut NullEmitter);
        clock.update_state(Duration::from_millis(100), &mut NullEmitter);
        assert_eq!(clock.phase(), Phase::ZERO);
    }

    #[test]
    fn beats_count_wraps() {
        let mut clock = ControllableClock::new_with_rate(2.0);
        for _ in 0..10 {
            clock.update_state(Duration::from_millis(250), &mut NullEmitter);
        }
        assert_eq!(clock.beat_count(), 5);
    }
}
