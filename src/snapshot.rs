// Copyright (c) 2024 Mike Tsao. All rights reserved.

//! The frame wire contract shared with rasterizing clients.
//!
//! Each published message is one msgpack record: frame number, frame
//! timestamp, and a single draw entity. Entities are self-describing
//! two-element envelopes `[type_tag, payload]`:
//!
//! - tag 0: a collection, `[count, [entity, entity, ...]]`
//! - tag 1: a list of arc records
//! - tag 2: a list of line records
//!
//! Records serialize positionally (rmp-serde's struct encoding), so field
//! order here is load-bearing and must not change.

use crate::types::Timestamp;
use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeTuple,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt;

/// A command to draw a single arc segment.
///
/// Geometry is normalized: positions are offsets from screen center on
/// [-0.5, 0.5], radii are screen-fractions, and all angles are unit phases
/// on [0, 1).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArcRecord {
    /// Draw level, 0-255.
    pub level: u32,
    /// Stroke thickness as a screen-fraction.
    pub thickness: f32,
    /// Hue as a unit phase.
    pub hue: f32,
    /// Saturation on [0, 1].
    pub sat: f32,
    /// HSV value, 0-255.
    pub val: u32,
    #[allow(missing_docs)]
    pub x: f32,
    #[allow(missing_docs)]
    pub y: f32,
    #[allow(missing_docs)]
    pub rad_x: f32,
    #[allow(missing_docs)]
    pub rad_y: f32,
    /// Arc start angle as a unit phase.
    pub start: f32,
    /// Arc stop angle as a unit phase.
    pub stop: f32,
    /// Rotation of the whole arc as a unit phase.
    pub rot_angle: f32,
}

/// A command to draw a single line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LineRecord {
    /// Draw level, 0-255.
    pub level: u32,
    /// Stroke thickness as a screen-fraction.
    pub thickness: f32,
    /// Hue as a unit phase.
    pub hue: f32,
    /// Saturation on [0, 1].
    pub sat: f32,
    /// HSV value, 0-255.
    pub val: u32,
    #[allow(missing_docs)]
    pub x: f32,
    #[allow(missing_docs)]
    pub y: f32,
    /// Line length as a screen-fraction.
    pub length: f32,
    /// Start of the drawn span as a unit phase of the full length.
    pub start: f32,
    /// End of the drawn span as a unit phase of the full length.
    pub stop: f32,
    /// Rotation about the line's position as a unit phase.
    pub rot_angle: f32,
}

const TAG_COLLECTION: u32 = 0;
const TAG_ARCS: u32 = 1;
const TAG_LINES: u32 = 2;

/// A recursively defined draw entity. The tree shape lets one frame carry an
/// ordered stack of layers, each contributing its own homogeneous record
/// list, without flattening away the layer boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawEntity {
    /// An ordered collection of entities, drawn first-to-last.
    Collection(Vec<DrawEntity>),
    /// Arc segments.
    Arcs(Vec<ArcRecord>),
    /// Lines.
    Lines(Vec<LineRecord>),
}
impl DrawEntity {
    /// An empty collection, the canonical "nothing to draw".
    pub fn empty() -> Self {
        Self::Collection(Vec::new())
    }

    /// Total record count across the whole tree.
    pub fn record_count(&self) -> usize {
        match self {
            Self::Collection(entities) => entities.iter().map(Self::record_count).sum(),
            Self::Arcs(arcs) => arcs.len(),
            Self::Lines(lines) => lines.len(),
        }
    }
}

impl Serialize for DrawEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut envelope = serializer.serialize_tuple(2)?;
        match self {
            Self::Collection(entities) => {
                envelope.serialize_element(&TAG_COLLECTION)?;
                envelope.serialize_element(&CollectionPayload(entities))?;
            }
            Self::Arcs(arcs) => {
                envelope.serialize_element(&TAG_ARCS)?;
                envelope.serialize_element(arcs)?;
            }
            Self::Lines(lines) => {
                envelope.serialize_element(&TAG_LINES)?;
                envelope.serialize_element(lines)?;
            }
        }
        envelope.end()
    }
}

/// Collection payloads carry an explicit count ahead of the entity list.
struct CollectionPayload<'a>(&'a [DrawEntity]);
impl<'a> Serialize for CollectionPayload<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut payload = serializer.serialize_tuple(2)?;
        payload.serialize_element(&(self.0.len() as u32))?;
        payload.serialize_element(self.0)?;
        payload.end()
    }
}

impl<'de> Deserialize<'de> for DrawEntity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvelopeVisitor;
        impl<'de> Visitor<'de> for EnvelopeVisitor {
            type Value = DrawEntity;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [type_tag, payload] draw entity envelope")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let tag: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let entity = match tag {
                    TAG_COLLECTION => {
                        let (count, entities): (u32, Vec<DrawEntity>) = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        if count as usize != entities.len() {
                            return Err(de::Error::custom(format!(
                                "collection count {} does not match {} entities",
                                count,
                                entities.len()
                            )));
                        }
                        DrawEntity::Collection(entities)
                    }
                    TAG_ARCS => DrawEntity::Arcs(
                        seq.next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?,
                    ),
                    TAG_LINES => DrawEntity::Lines(
                        seq.next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?,
                    ),
                    other => {
                        return Err(de::Error::custom(format!(
                            "unknown draw entity type tag {other}"
                        )))
                    }
                };
                Ok(entity)
            }
        }
        deserializer.deserialize_seq(EnvelopeVisitor)
    }
}

/// A complete single-frame snapshot for one video channel. This is the
/// top-level structure in every published message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Monotonic per channel; wraps without effect on receivers.
    pub frame_number: u32,
    /// Milliseconds since show start. Clients use deltas only.
    pub time: Timestamp,
    /// The frame's draw tree.
    pub root: DrawEntity,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(start: f32, stop: f32) -> ArcRecord {
        ArcRecord {
            level: 255,
            thickness: 0.25,
            hue: 0.0,
            sat: 0.0,
            val: 255,
            x: 0.0,
            y: 0.0,
            rad_x: 0.4375,
            rad_y: 0.4375,
            start,
            stop,
            rot_angle: 0.0,
        }
    }

    fn round_trip(snapshot: &Snapshot) -> Snapshot {
        let bytes = rmp_serde::to_vec(snapshot).unwrap();
        rmp_serde::from_slice(&bytes).unwrap()
    }

    #[test]
    fn empty_frame_round_trips() {
        let snapshot = Snapshot {
            frame_number: 0,
            time: Timestamp(0),
            root: DrawEntity::empty(),
        };
        assert_eq!(round_trip(&snapshot), snapshot);
    }

    #[test]
    fn full_tree_round_trips_exactly() {
        let snapshot = Snapshot {
            frame_number: 41,
            time: Timestamp(683),
            root: DrawEntity::Collection(vec![
                DrawEntity::Arcs(vec![arc(0.0, 0.083_333_336), arc(0.5, 0.583_333_3)]),
                DrawEntity::Lines(vec![LineRecord {
                    level: 128,
                    thickness: 0.01,
                    hue: 0.66,
                    sat: 1.0,
                    val: 255,
                    x: -0.25,
                    y: 0.25,
                    length: 0.5,
                    start: 0.0,
                    stop: 1.0,
                    rot_angle: 0.125,
                }]),
                DrawEntity::Collection(vec![DrawEntity::Arcs(vec![arc(0.25, 0.5)])]),
            ]),
        };
        let restored = round_trip(&snapshot);
        // PartialEq on the records is bit-equality on the floats, so this is
        // the exact round-trip property, not an approximate one.
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn collection_envelope_layout() {
        // [0, [count, [...]]] with an empty inner list.
        let bytes = rmp_serde::to_vec(&DrawEntity::empty()).unwrap();
        assert_eq!(bytes, vec![0x92, 0x00, 0x92, 0x00, 0x90]);
    }

    #[test]
    fn arcs_envelope_starts_with_tag_one() {
        let bytes = rmp_serde::to_vec(&DrawEntity::Arcs(vec![arc(0.0, 0.5)])).unwrap();
        // fixarray(2), tag 1, fixarray(1) of a 12-field record.
        assert_eq!(&bytes[..3], &[0x92, 0x01, 0x91]);
        assert_eq!(bytes[3], 0x9c);
    }

    #[test]
    fn mismatched_collection_count_is_rejected() {
        // Hand-build [0, [2, [ ]]]: declared count 2, zero entities.
        let bytes = vec![0x92, 0x00, 0x92, 0x02, 0x90];
        let result: Result<DrawEntity, _> = rmp_serde::from_slice(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn record_count_walks_the_tree() {
        let tree = DrawEntity::Collection(vec![
            DrawEntity::Arcs(vec![arc(0.0, 0.1), arc(0.1, 0.2)]),
            DrawEntity::Collection(vec![DrawEntity::Lines(vec![])]),
        ]);
        assert_eq!(tree.record_count(), 2);
    }
}
