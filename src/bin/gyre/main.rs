// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The gyre server binary: load settings, find surfaces, run the show.

use anyhow::Result;
use gyre::{
    control::Device,
    midi::{list_ports, DeviceSpec},
    prelude::*,
};
use log::{info, warn};

fn main() -> Result<()> {
    env_logger::init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            info!("Using default settings ({e}).");
            Settings::default()
        }
    };

    let midi_devices = if settings.midi_devices.is_empty() {
        detect_midi_devices()?
    } else {
        settings.midi_devices.clone()
    };
    if midi_devices.is_empty() {
        warn!("No midi surfaces found; running with network control only.");
    }

    let mut show = Show::new(
        midi_devices,
        settings.osc_devices.clone(),
        settings.mixer_layers,
        settings.save_path.clone(),
    )?;

    if let Some(path) = &settings.save_path {
        if path.exists() {
            show.load(path)?;
            info!("Loaded show from {path:?}.");
        }
    }

    show.run(
        RunFlag::new(),
        &settings.publish_addr,
        settings.tick_interval(),
    )
}

/// Scans the midi ports for surfaces we know, matching by advertised name.
fn detect_midi_devices() -> Result<Vec<DeviceSpec>> {
    let (inputs, outputs) = list_ports()?;
    info!("Available midi inputs: {inputs:?}");
    info!("Available midi outputs: {outputs:?}");

    Ok(Device::all()
        .into_iter()
        .filter_map(|device| {
            let name = device.device_name().to_string();
            (inputs.contains(&name) && outputs.contains(&name)).then_some(DeviceSpec {
                device,
                input_port_name: name.clone(),
                output_port_name: name,
            })
        })
        .collect())
}
