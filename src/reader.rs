// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Capture-file reader
//
// Decodes a capture file frame by frame and emits the document shape the
// external replay tool consumes. Field names and the year-1 epoch offset in
// `seen.sec` are part of that tool's contract and must not drift.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{RecorderError, Result};
use crate::frame::{self, Packet};
use crate::message::OP_MSG;

/// Seconds between the Unix epoch and the replay tool's internal epoch
/// (January 1 of year 1, proleptic Gregorian).
pub const UNIX_TO_INTERNAL_SECS: i64 =
    (1969 * 365 + 1969 / 4 - 1969 / 100 + 1969 / 400) * 86400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawOpHeader {
    pub messagelength: i32,
    pub requestid: i32,
    pub responseto: i32,
    pub opcode: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawOp {
    pub header: RawOpHeader,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeenTime {
    pub sec: i64,
    /// The packet's order, reused as a disambiguator between same-second
    /// packets; not a true nanosecond value.
    pub nsec: i32,
}

/// One replayable operation, in the replay tool's document shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureDocument {
    pub rawop: RawOp,
    pub seen: SeenTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srcendpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destendpoint: Option<String>,
    pub order: i64,
    pub seenconnectionnum: i64,
    pub playedconnectionnum: i64,
    pub generation: i32,
    #[serde(rename = "opType", skip_serializing_if = "Option::is_none")]
    pub op_type: Option<String>,
}

/// Emitted once, ahead of the frames, when streaming to the replay tool.
#[derive(Debug, Clone, Serialize)]
pub struct Preamble {
    pub playbackfileversion: i32,
    pub driveropsfiltered: bool,
}

impl Default for Preamble {
    fn default() -> Preamble {
        Preamble {
            playbackfileversion: 1,
            driveropsfiltered: false,
        }
    }
}

/// Build the replay document for one decoded packet.
pub fn document_from_packet(packet: &Packet, with_op_type: bool) -> Result<CaptureDocument> {
    let header = packet.message.header();

    let (srcendpoint, destendpoint) = endpoints(packet, header.response_to);

    let op_type = if with_op_type {
        Some(if header.op_code == OP_MSG {
            packet.message.command_name()?
        } else {
            "legacy".to_string()
        })
    } else {
        None
    };

    Ok(CaptureDocument {
        rawop: RawOp {
            header: RawOpHeader {
                messagelength: header.message_length,
                requestid: header.request_id,
                responseto: header.response_to,
                opcode: header.op_code,
            },
            body: packet.message.bytes().to_vec(),
        },
        seen: SeenTime {
            sec: (packet.timestamp_ms / 1000) as i64 + UNIX_TO_INTERNAL_SECS,
            nsec: packet.order as i32,
        },
        srcendpoint,
        destendpoint,
        order: packet.order as i64,
        seenconnectionnum: packet.connection_id as i64,
        playedconnectionnum: 0,
        generation: 0,
        op_type,
    })
}

/// The port segments after the last `:` of each endpoint. A response flows
/// server-to-client, so `responseTo != 0` makes the local side the source.
/// When either endpoint lacks a `:`, both fields are omitted.
fn endpoints(packet: &Packet, response_to: i32) -> (Option<String>, Option<String>) {
    let local = packet.local.rfind(':').map(|at| packet.local[at + 1..].to_string());
    let remote = packet
        .remote
        .rfind(':')
        .map(|at| packet.remote[at + 1..].to_string());

    match (local, remote) {
        (Some(local), Some(remote)) => {
            if response_to != 0 {
                (Some(local), Some(remote))
            } else {
                (Some(remote), Some(local))
            }
        }
        _ => (None, None),
    }
}

/// Decode a whole capture file into replay documents, with `opType`.
pub fn read_capture_file(path: impl AsRef<Path>) -> Result<Vec<CaptureDocument>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);

    let mut documents = Vec::new();
    while let Some(packet) = frame::decode_from(&mut reader)? {
        documents.push(document_from_packet(&packet, true)?);
    }
    Ok(documents)
}

/// Stream a capture to the replay tool: the preamble document, then one
/// document per frame without `opType`, as JSON lines. Returns the frame
/// count.
pub fn stream_capture(input: &mut impl Read, output: &mut impl Write) -> Result<u64> {
    write_json_line(output, &Preamble::default())?;

    let mut frames = 0u64;
    while let Some(packet) = frame::decode_from(input)? {
        write_json_line(output, &document_from_packet(&packet, false)?)?;
        frames += 1;
    }
    Ok(frames)
}

fn write_json_line(output: &mut impl Write, document: &impl Serialize) -> Result<()> {
    serde_json::to_writer(&mut *output, document)
        .map_err(|err| RecorderError::Io(err.to_string()))?;
    output.write_all(b"\n")?;
    Ok(())
}
