// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The frame publisher: serializes each tick's rendered draw trees and
//! broadcasts them, one PUB message per video channel, topic-prefixed with
//! the channel number.
//!
//! Delivery is best-effort and latest-frame-wins. If the publisher thread
//! falls behind the tick loop, it drains its queue and publishes only the
//! newest frame; slow subscribers are zmq's problem, not ours.

use crate::{snapshot::DrawEntity, snapshot::Snapshot, types::Timestamp, util::LogThrottle};
use anyhow::Result;
use crossbeam_channel::{Sender, TryRecvError};
use log::{error, info, warn};
use rmp_serde::Serializer;
use serde::Serialize;
use std::thread::{self, JoinHandle};

/// One tick's rendered output: a draw tree per video channel, plus frame
/// identity. This is what the tick thread hands off; all zmq and msgpack
/// work happens on the publisher thread.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    /// Monotonic frame number.
    pub number: u32,
    /// Frame timestamp, milliseconds since show start.
    pub timestamp: Timestamp,
    /// One draw tree per video channel, in channel order.
    pub channels: Vec<DrawEntity>,
}

/// Handle to the running publisher service. Dropping (or closing) the handle
/// shuts the service down; no frames are sent after `close` returns.
#[derive(Debug)]
pub struct FramePublisher {
    sender: Option<Sender<RenderedFrame>>,
    handle: Option<JoinHandle<()>>,
}

impl FramePublisher {
    /// Binds the PUB socket and starts the publisher thread. A bind failure
    /// is fatal; it means the operator's configuration is wrong and the show
    /// cannot start.
    pub fn start(ctx: &zmq::Context, addr: &str) -> Result<Self> {
        let socket = ctx.socket(zmq::PUB)?;
        socket.bind(addr)?;
        info!("Frame publisher bound to {addr}.");

        let (sender, receiver) = crossbeam_channel::unbounded::<RenderedFrame>();
        let handle = thread::Builder::new()
            .name("publisher".to_string())
            .spawn(move || {
                let mut send_buf = Vec::new();
                let mut throttle = LogThrottle::per_minute();
                loop {
                    // Block for the next frame, then optimistically drain any
                    // backlog: latest frame wins.
                    let mut frame = match receiver.recv() {
                        Ok(frame) => frame,
                        Err(_) => {
                            info!("Frame publisher shutting down.");
                            return;
                        }
                    };
                    let mut dropped = 0u32;
                    loop {
                        match receiver.try_recv() {
                            Ok(newer) => {
                                dropped += 1;
                                frame = newer;
                            }
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => {
                                info!("Frame publisher shutting down.");
                                return;
                            }
                        }
                    }
                    if dropped > 0 {
                        warn!("Frame publisher dropped {dropped} stale frames.");
                    }
                    publish_frame(&socket, &mut send_buf, &mut throttle, frame);
                }
            })?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Hands a frame to the publisher thread. Never blocks; if the service
    /// has died the frame is dropped and the condition logged.
    pub fn send(&self, frame: RenderedFrame) {
        if let Some(sender) = &self.sender {
            if sender.send(frame).is_err() {
                error!("Frame publisher is gone; dropping frame.");
            }
        }
    }

    /// Stops the service, waiting for the in-flight frame to finish.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FramePublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serializes and sends one snapshot per video channel. Error conditions are
/// logged (throttled) and the affected message dropped; the loop continues.
fn publish_frame(
    socket: &zmq::Socket,
    send_buf: &mut Vec<u8>,
    throttle: &mut LogThrottle,
    frame: RenderedFrame,
) {
    for (video_channel, root) in frame.channels.into_iter().enumerate() {
        let snapshot = Snapshot {
            frame_number: frame.number,
            time: frame.timestamp,
            root,
        };
        let topic = [video_channel as u8; 1];
        send_buf.clear();
        if let Err(e) = snapshot.serialize(&mut Serializer::new(&mut *send_buf)) {
            if throttle.should_log() {
                error!(
                    "Snapshot serialization error for frame {} channel {video_channel}: {e}.",
                    snapshot.frame_number
                );
            }
            continue;
        }
        let messages: [&[u8]; 2] = [&topic, send_buf];
        if let Err(e) = socket.send_multipart(messages.iter(), 0) {
            if throttle.should_log() {
                error!(
                    "Snapshot send error for frame {} channel {video_channel}: {e}.",
                    snapshot.frame_number
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn recv_snapshot(sub: &zmq::Socket) -> Option<(u8, Snapshot)> {
        let parts = sub.recv_multipart(0).ok()?;
        assert_eq!(parts.len(), 2);
        let snapshot = rmp_serde::from_slice(&parts[1]).ok()?;
        Some((parts[0][0], snapshot))
    }

    #[test]
    fn publishes_one_snapshot_per_channel() {
        let ctx = zmq::Context::new();
        let addr = "inproc://publish-per-channel";
        let publisher = FramePublisher::start(&ctx, addr).unwrap();

        let sub = ctx.socket(zmq::SUB).unwrap();
        sub.connect(addr).unwrap();
        sub.set_subscribe(b"").unwrap();
        sub.set_rcvtimeo(2000).unwrap();
        // Give the subscription a moment to propagate.
        std::thread::sleep(Duration::from_millis(50));

        publisher.send(RenderedFrame {
            number: 7,
            timestamp: Timestamp(123),
            channels: vec![DrawEntity::empty(), DrawEntity::empty()],
        });

        let (topic, snapshot) = recv_snapshot(&sub).expect("first channel");
        assert_eq!(topic, 0);
        assert_eq!(snapshot.frame_number, 7);
        assert_eq!(snapshot.time, Timestamp(123));
        assert_eq!(snapshot.root, DrawEntity::empty());

        let (topic, _) = recv_snapshot(&sub).expect("second channel");
        assert_eq!(topic, 1);

        publisher.close();
    }

    #[test]
    fn close_terminates_the_service() {
        let ctx = zmq::Context::new();
        let publisher = FramePublisher::start(&ctx, "inproc://publish-close").unwrap();
        publisher.send(RenderedFrame {
            number: 0,
            timestamp: Timestamp(0),
            channels: vec![DrawEntity::empty()],
        });
        // close joins the thread; afterwards nothing is left running to
        // publish, which is the shutdown contract.
        publisher.close();
    }
}
