// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! Talking to external MIDI control surfaces: port discovery, input
//! connections that decode surface events onto the control queue, and an
//! output writer that echoes state back to surface LEDs.

use crate::{
    control::{ControlEvent, Device},
    util::{DiscardCounter, LogThrottle},
};
use anyhow::{anyhow, bail, Result};
use crossbeam_channel::Sender;
use log::{debug, error, info};
use midir::{MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, thread};

/// What kind of midi event a mapping refers to.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum EventType {
    NoteOn,
    NoteOff,
    ControlChange,
}

/// A specification of a midi control address: event type, channel, and
/// control/note number.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mapping {
    #[allow(missing_docs)]
    pub event_type: EventType,
    #[allow(missing_docs)]
    pub channel: u8,
    #[allow(missing_docs)]
    pub control: u8,
}
impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{}",
            match self.event_type {
                EventType::NoteOn => "NoteOn ",
                EventType::NoteOff => "NoteOff",
                EventType::ControlChange => "CntChng",
            },
            self.channel,
            self.control
        )
    }
}

/// Helper constructor for a note-on mapping.
pub const fn note_on(channel: u8, control: u8) -> Mapping {
    Mapping {
        event_type: EventType::NoteOn,
        channel,
        control,
    }
}

/// Most controls live on channel 0.
pub const fn note_on_ch0(control: u8) -> Mapping {
    note_on(0, control)
}

/// Helper constructor for a control-change mapping.
pub const fn cc(channel: u8, control: u8) -> Mapping {
    Mapping {
        event_type: EventType::ControlChange,
        channel,
        control,
    }
}

/// Most controls live on channel 0.
pub const fn cc_ch0(control: u8) -> Mapping {
    cc(0, control)
}

/// A fully-specified midi event.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Event {
    #[allow(missing_docs)]
    pub mapping: Mapping,
    #[allow(missing_docs)]
    pub value: u8,
}

/// Helper constructor for a midi event.
pub const fn event(mapping: Mapping, value: u8) -> Event {
    Event { mapping, value }
}

/// The data needed to describe a surface to connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceSpec {
    #[allow(missing_docs)]
    pub device: Device,
    #[allow(missing_docs)]
    pub input_port_name: String,
    #[allow(missing_docs)]
    pub output_port_name: String,
}

/// Returns the available input and output ports by name.
pub fn list_ports() -> Result<(Vec<String>, Vec<String>)> {
    let input = MidiInput::new("gyre")?;
    let inputs = input
        .ports()
        .iter()
        .filter_map(|p| input.port_name(p).ok())
        .collect::<Vec<String>>();
    let output = MidiOutput::new("gyre")?;
    let outputs = output
        .ports()
        .iter()
        .filter_map(|p| output.port_name(p).ok())
        .collect::<Vec<String>>();
    Ok((inputs, outputs))
}

fn get_named_port<T: MidiIO>(source: &T, name: &str) -> Result<T::Port> {
    for port in source.ports() {
        if let Ok(this_name) = source.port_name(&port) {
            if this_name == name {
                return Ok(port);
            }
        }
    }
    bail!("no port found with name {name}");
}

/// An open midi output connection.
pub struct Output {
    name: String,
    conn: MidiOutputConnection,
}
impl Output {
    #[allow(missing_docs)]
    pub fn new(name: String) -> Result<Self> {
        let output = MidiOutput::new(&name)?;
        let port = get_named_port(&output, &name)?;
        let conn = output
            .connect(&port, &name)
            .map_err(|err| anyhow!("failed to connect to midi output: {err}"))?;
        Ok(Self { name, conn })
    }

    #[allow(missing_docs)]
    pub fn send(&mut self, event: Event) -> Result<()> {
        let status = match event.mapping.event_type {
            EventType::ControlChange => 11 << 4,
            EventType::NoteOn => 9 << 4,
            EventType::NoteOff => 8 << 4,
        } + event.mapping.channel;
        let msg = [status, event.mapping.control, event.value];
        self.conn
            .send(&msg)
            .map_err(|err| anyhow!("midi send to {} failed: {err}", self.name))
    }
}

/// An open midi input connection. Events are decoded in the midir callback
/// thread and enqueued onto the bounded control event channel; the tick loop
/// drains them at the top of each tick.
pub struct Input {
    _conn: MidiInputConnection<()>,
}
impl Input {
    #[allow(missing_docs)]
    pub fn new(
        name: String,
        device: Device,
        sender: Sender<ControlEvent>,
        discards: DiscardCounter,
    ) -> Result<Self> {
        let input = MidiInput::new(&name)?;
        let port = get_named_port(&input, &name)?;
        let handler_name = name.clone();

        let conn = input
            .connect(
                &port,
                &name,
                move |_, msg: &[u8], _| {
                    if msg.len() < 3 {
                        discards.increment();
                        return;
                    }
                    let control = msg[1];
                    let value = msg[2];
                    let event_type = match msg[0] >> 4 {
                        // Most surfaces send NoteOn with velocity 0 instead
                        // of a true NoteOff.
                        8 | 9 if value == 0 => EventType::NoteOff,
                        9 => EventType::NoteOn,
                        11 => EventType::ControlChange,
                        other => {
                            debug!(
                                "Ignoring midi event on {handler_name} of unimplemented type {other}."
                            );
                            return;
                        }
                    };
                    let channel = msg[0] & 15;
                    let decoded = Event {
                        mapping: Mapping {
                            event_type,
                            channel,
                            control,
                        },
                        value,
                    };
                    // A full queue means the tick thread is badly behind;
                    // dropping the event beats blocking a device callback.
                    if sender
                        .try_send(ControlEvent::Midi((device, decoded)))
                        .is_err()
                    {
                        discards.increment();
                    }
                },
                (),
            )
            .map_err(|err| anyhow!("failed to connect to midi input: {err}"))?;
        Ok(Input { _conn: conn })
    }
}

/// Maintains all connected surfaces. Inputs feed the control queue; outputs
/// are owned by a dedicated writer thread fed through an unbounded echo
/// queue, so a slow device write can never stall the tick loop.
pub struct Manager {
    _inputs: Vec<Input>,
    echo: Option<Sender<(Device, Event)>>,
    writer: Option<thread::JoinHandle<()>>,
}
impl Manager {
    /// Connects every configured surface and starts the echo writer.
    pub fn new(
        device_specs: Vec<DeviceSpec>,
        sender: Sender<ControlEvent>,
        discards: DiscardCounter,
    ) -> Result<Self> {
        let mut inputs = Vec::new();
        let mut outputs: Vec<(Device, Output)> = Vec::new();
        for spec in device_specs {
            let input = Input::new(
                spec.input_port_name,
                spec.device,
                sender.clone(),
                discards.clone(),
            )?;
            let mut output = Output::new(spec.output_port_name)?;
            spec.device.init_midi(&mut output)?;
            inputs.push(input);
            outputs.push((spec.device, output));
            info!("Connected midi surface {}.", spec.device);
        }

        let (echo_send, echo_recv) = crossbeam_channel::unbounded::<(Device, Event)>();
        let writer = thread::Builder::new()
            .name("midi-echo".to_string())
            .spawn(move || {
                let mut throttles: HashMap<Device, LogThrottle> = HashMap::new();
                let mut disconnected: Vec<Device> = Vec::new();
                while let Ok((device, event)) = echo_recv.recv() {
                    if disconnected.contains(&device) {
                        continue;
                    }
                    for (d, output) in &mut outputs {
                        if *d != device {
                            continue;
                        }
                        if let Err(e) = output.send(event) {
                            if throttles
                                .entry(device)
                                .or_insert_with(LogThrottle::per_minute)
                                .should_log()
                            {
                                error!("Marking {device} disconnected: {e}.");
                            }
                            disconnected.push(device);
                        }
                    }
                }
            })?;

        Ok(Self {
            _inputs: inputs,
            echo: Some(echo_send),
            writer: Some(writer),
        })
    }

    /// Queues an echo event for the given surface. Never blocks.
    pub fn send(&self, device: Device, event: Event) {
        if let Some(echo) = &self.echo {
            let _ = echo.send((device, event));
        }
    }
}
impl Drop for Manager {
    fn drop(&mut self) {
        self.echo.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}
