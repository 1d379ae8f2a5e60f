// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The known MIDI control surfaces.

use crate::midi::{event, note_on, Output};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The MIDI surface types the show can work with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Device {
    /// The primary performance surface.
    AkaiApc40,
    /// The mixer wing, adding a second page of layer strips.
    AkaiApc20,
    /// A TouchOSC layout speaking MIDI through a bridge.
    TouchOsc,
    /// Dedicated clock-control surface.
    BehringerCmdMm1,
}
impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::AkaiApc40 => "Akai APC40",
                Self::AkaiApc20 => "Akai APC20",
                Self::TouchOsc => "Touch OSC",
                Self::BehringerCmdMm1 => "Behringer CMD MM-1",
            }
        )
    }
}
impl Device {
    /// Every known device type, for startup port matching.
    pub fn all() -> Vec<Self> {
        vec![
            Self::AkaiApc40,
            Self::AkaiApc20,
            Self::TouchOsc,
            Self::BehringerCmdMm1,
        ]
    }

    /// The port name this device advertises.
    pub fn device_name(&self) -> &str {
        match self {
            Self::AkaiApc40 => "Akai APC40",
            Self::AkaiApc20 => "Akai APC20",
            Self::TouchOsc => "TouchOSC Bridge",
            Self::BehringerCmdMm1 => "CMD MM-1",
        }
    }

    /// Device-specific midi initialization: darken every LED the binding
    /// table uses, so a freshly connected surface starts from a known state
    /// before the full state push arrives.
    pub fn init_midi(&self, out: &mut Output) -> Result<()> {
        match self {
            Self::AkaiApc40 | Self::AkaiApc20 => {
                for channel in 0..8 {
                    for note in [0x30, 0x31, 0x32, 0x33, 0x34] {
                        out.send(event(note_on(channel, note), 0))?;
                    }
                    for note in 66..74 {
                        out.send(event(note_on(channel, note), 0))?;
                    }
                }
                Ok(())
            }
            Self::TouchOsc | Self::BehringerCmdMm1 => Ok(()),
        }
    }
}
