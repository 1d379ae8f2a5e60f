// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! OSC input from tablet surfaces. Each configured device gets a UDP
//! listener thread that decodes packets, unpacks bundles, and forwards the
//! inner messages onto the control queue.

use crate::{control::ControlEvent, util::DiscardCounter};
use anyhow::{bail, Result};
use crossbeam_channel::Sender;
use derive_more::Display;
use log::error;
use rosc::{OscMessage, OscPacket, OscType};
use serde::{Deserialize, Serialize};
use std::{
    net::{SocketAddr, UdpSocket},
    thread,
};

/// The OSC device types the show can work with.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum OscDevice {
    /// A TouchOSC tablet layout.
    TouchOsc,
}

/// The data needed to describe an OSC device to listen for.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceSpec {
    #[allow(missing_docs)]
    pub device: OscDevice,
    /// The local address to bind the listener to.
    pub addr: SocketAddr,
}

/// Starts a listener thread for one OSC device. Returns once the socket is
/// bound; a bind failure is a fatal configuration error.
pub fn listen(
    spec: DeviceSpec,
    sender: Sender<ControlEvent>,
    discards: DiscardCounter,
) -> Result<()> {
    let socket = UdpSocket::bind(spec.addr)?;
    let mut buf = [0u8; rosc::decoder::MTU];

    thread::Builder::new()
        .name(format!("osc-{}", spec.device))
        .spawn(move || loop {
            let packet = match socket.recv(&mut buf) {
                Ok(size) => match rosc::decoder::decode_udp(&buf[..size]) {
                    Ok((_, packet)) => packet,
                    Err(e) => {
                        error!("Malformed OSC packet from {}: {e}.", spec.device);
                        discards.increment();
                        continue;
                    }
                },
                Err(e) => {
                    error!("Error receiving from OSC device {}: {e}.", spec.device);
                    continue;
                }
            };
            forward_packet(packet, spec.device, &sender, &discards);
        })?;
    Ok(())
}

/// Recursively unpacks OSC packets, forwarding every inner message.
fn forward_packet(
    packet: OscPacket,
    device: OscDevice,
    sender: &Sender<ControlEvent>,
    discards: &DiscardCounter,
) {
    match packet {
        OscPacket::Message(m) => {
            if sender.try_send(ControlEvent::Osc((device, m))).is_err() {
                discards.increment();
            }
        }
        OscPacket::Bundle(bundle) => {
            for subpacket in bundle.content {
                forward_packet(subpacket, device, sender, discards);
            }
        }
    }
}

/// Coerces a single OSC argument to a float. OSC surfaces send Float or
/// Double depending on the layout editor's mood.
pub fn get_float(args: &[OscType]) -> Result<f64> {
    match args.first() {
        Some(OscType::Float(v)) => Ok(f64::from(*v)),
        Some(OscType::Double(v)) => Ok(*v),
        other => bail!("expected an OSC float argument, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_coercion() {
        assert_eq!(get_float(&[OscType::Float(0.5)]).unwrap(), 0.5);
        assert_eq!(get_float(&[OscType::Double(0.25)]).unwrap(), 0.25);
        assert!(get_float(&[OscType::Int(1)]).is_err());
        assert!(get_float(&[]).is_err());
    }
}
