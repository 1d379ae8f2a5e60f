// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Small cross-thread helpers.

use crossbeam_channel::{Receiver, Sender};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

/// A convenience struct that bundles both halves of a [crossbeam_channel]
/// together.
#[derive(Debug)]
pub struct ChannelPair<T> {
    #[allow(missing_docs)]
    pub sender: Sender<T>,
    #[allow(missing_docs)]
    pub receiver: Receiver<T>,
}
impl<T> Default for ChannelPair<T> {
    fn default() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }
}
impl<T> ChannelPair<T> {
    /// Creates a bounded pair. The controller input queue is bounded so that
    /// a flood of events cannot grow memory without limit; senders drop on a
    /// full queue rather than block.
    pub fn bounded(cap: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(cap);
        Self { sender, receiver }
    }
}

/// A cloneable flag used to control program flow across threads.
///
/// The tick loop checks this at the top of every iteration; setting it false
/// lets the loop finish its in-flight tick and exit cleanly.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);
impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}
impl RunFlag {
    /// Creates a flag set to run.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Returns true if the program should continue.
    pub fn should_run(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Commands the program to stop.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A shared counter for events that are dropped rather than surfaced as
/// errors, such as malformed controller packets.
#[derive(Debug, Clone, Default)]
pub struct DiscardCounter(Arc<AtomicUsize>);
impl DiscardCounter {
    #[allow(missing_docs)]
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[allow(missing_docs)]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Rate-limits noisy error logging. Transient I/O failures can repeat every
/// tick; the policy is to log at most once per interval per call site.
#[derive(Debug)]
pub struct LogThrottle {
    interval: std::time::Duration,
    last: Option<std::time::Instant>,
}
impl LogThrottle {
    /// One log line per minute, the default policy for device I/O errors.
    pub fn per_minute() -> Self {
        Self {
            interval: std::time::Duration::from_secs(60),
            last: None,
        }
    }

    /// Returns true if the caller should log now.
    pub fn should_log(&mut self) -> bool {
        let now = std::time::Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_throttle_suppresses_repeats() {
        let mut throttle = LogThrottle::per_minute();
        assert!(throttle.should_log());
        assert!(!throttle.should_log());
    }

    #[test]
    fn run_flag_round_trip() {
        let flag = RunFlag::new();
        assert!(flag.should_run());
        let other = flag.clone();
        other.stop();
        assert!(!flag.should_run());
    }

    #[test]
    fn bounded_channel_drops_when_full() {
        let pair: ChannelPair<u8> = ChannelPair::bounded(1);
        assert!(pair.sender.try_send(1).is_ok());
        assert!(pair.sender.try_send(2).is_err());
        assert_eq!(pair.receiver.try_recv().unwrap(), 1);
    }
}
