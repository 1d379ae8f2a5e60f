// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Startup configuration: where to publish, how fast to tick, and which
//! surfaces to look for. Intended to be serialized next to the binary.

use crate::{midi::DeviceSpec as MidiDeviceSpec, mixer::Mixer, osc::DeviceSpec as OscDeviceSpec};
use anyhow::Result;
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Read, path::PathBuf, time::Duration};

/// Global show configuration.
#[derive(Debug, Derivative, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Where the frame publisher binds.
    #[derivative(Default(value = "\"tcp://*:6000\".into()"))]
    pub publish_addr: String,

    /// Tick period in milliseconds.
    #[derivative(Default(value = "17"))]
    pub tick_interval_ms: u64,

    /// How many mixer layers the show carries. Fixed for the show's
    /// lifetime and validated against loaded snapshots.
    #[derivative(Default(value = "Mixer::DEFAULT_LAYER_COUNT"))]
    pub mixer_layers: usize,

    /// MIDI surfaces to connect at startup, by port name.
    pub midi_devices: Vec<MidiDeviceSpec>,

    /// OSC devices to listen for.
    pub osc_devices: Vec<OscDeviceSpec>,

    /// Where snapshots autosave, if anywhere.
    pub save_path: Option<PathBuf>,
}
impl Settings {
    const FILENAME: &'static str = "gyre.json";

    /// Loads settings from the working directory.
    pub fn load() -> Result<Self> {
        let path = PathBuf::from(Self::FILENAME);
        let mut contents = String::new();
        File::open(&path)
            .map_err(|e| anyhow::format_err!("couldn't open {path:?}: {e}"))?
            .read_to_string(&mut contents)
            .map_err(|e| anyhow::format_err!("couldn't read {path:?}: {e}"))?;
        serde_json::from_str(&contents)
            .map_err(|e| anyhow::format_err!("couldn't parse {path:?}: {e}"))
    }

    /// Writes the current settings back out, pretty-printed.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(PathBuf::from(Self::FILENAME), json)?;
        Ok(())
    }

    /// The tick period as a [Duration].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.publish_addr, "tcp://*:6000");
        assert_eq!(settings.tick_interval(), Duration::from_millis(17));
        assert_eq!(settings.mixer_layers, Mixer::DEFAULT_LAYER_COUNT);
        assert!(settings.midi_devices.is_empty());
    }

    #[test]
    fn json_round_trip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let restored: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.publish_addr, settings.publish_addr);
        assert_eq!(restored.tick_interval_ms, settings.tick_interval_ms);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let restored: Settings = serde_json::from_str(r#"{"tick-interval-ms": 33}"#).unwrap();
        assert_eq!(restored.tick_interval_ms, 33);
        assert_eq!(restored.publish_addr, "tcp://*:6000");
    }
}
