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

// On-disk frame codec
//
// A capture file is a concatenation of frames, one per observed message, with
// no file header or footer. Every multi-byte integer is little-endian:
//
//   u32  total frame length, inclusive
//   u64  connection id
//   var  local endpoint, NUL-terminated UTF-8
//   var  remote endpoint, NUL-terminated UTF-8
//   u64  capture time, milliseconds since the Unix epoch
//   u64  order
//   var  raw message bytes (the message embeds its own length)
//
// A reader that trusts the length word can slice the whole frame without
// rescanning.

use std::io::{self, Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;

use crate::error::{RecorderError, Result};
use crate::message::{Message, MESSAGE_HEADER_BYTES};
use crate::queue::Cost;

/// Hard cap on a single frame. Exceeds the 48 MiB protocol maximum message
/// size while bounding single-frame memory use in the reader.
pub const MAX_FRAME_BYTES: usize = 1 << 26;

/// Length word, connection id, timestamp, order.
const FIXED_FIELD_BYTES: usize = 4 + 8 + 8 + 8;

/// Smallest structurally valid frame: fixed fields, two empty endpoints, and
/// a bare message header.
const MIN_FRAME_BYTES: usize = FIXED_FIELD_BYTES + 2 + MESSAGE_HEADER_BYTES;

/// The in-memory record handed from producer threads to the writer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub connection_id: u64,
    pub local: String,
    pub remote: String,
    pub timestamp_ms: u64,
    pub order: u64,
    pub message: Message,
}

impl Cost for Packet {
    fn cost(&self) -> usize {
        self.message.size()
    }
}

/// Encode the frame's metadata prefix with the length word filled in last.
/// The writer appends the message bytes itself; `header.len() +
/// packet.message.size()` is the full frame length.
pub fn encode_header(packet: &Packet) -> Result<Vec<u8>> {
    let mut buf =
        Vec::with_capacity(FIXED_FIELD_BYTES + packet.local.len() + packet.remote.len() + 2);
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&packet.connection_id.to_le_bytes());
    buf.extend_from_slice(packet.local.as_bytes());
    buf.push(0);
    buf.extend_from_slice(packet.remote.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&packet.timestamp_ms.to_le_bytes());
    buf.extend_from_slice(&packet.order.to_le_bytes());

    let total = buf.len() + packet.message.size();
    if total > MAX_FRAME_BYTES {
        return Err(RecorderError::OversizedFrame(total));
    }
    buf[0..4].copy_from_slice(&(total as u32).to_le_bytes());
    Ok(buf)
}

/// Encode one whole frame.
pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let mut frame = encode_header(packet)?;
    frame.extend_from_slice(packet.message.bytes());
    Ok(frame)
}

/// Decode the next frame from a stream. Returns `Ok(None)` on a clean end of
/// stream at a frame boundary; a stream that ends anywhere else is
/// `Truncated`.
pub fn decode_from(reader: &mut impl Read) -> Result<Option<Packet>> {
    let mut len_word = [0u8; 4];
    if !read_length_word(reader, &mut len_word)? {
        return Ok(None);
    }

    let len = u32::from_le_bytes(len_word) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(RecorderError::OversizedFrame(len));
    }
    if len < MIN_FRAME_BYTES {
        return Err(RecorderError::Truncated);
    }

    let mut frame = vec![0u8; len];
    frame[0..4].copy_from_slice(&len_word);
    reader.read_exact(&mut frame[4..]).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            RecorderError::Truncated
        } else {
            RecorderError::from(err)
        }
    })?;

    parse_frame(&frame).map(Some)
}

/// Read the 4-byte length word, distinguishing clean EOF (zero bytes at the
/// frame boundary) from a truncated word. Interrupted reads are retried.
fn read_length_word(reader: &mut impl Read, buf: &mut [u8; 4]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(RecorderError::Truncated),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}

fn parse_frame(frame: &[u8]) -> Result<Packet> {
    let mut cursor = Cursor::new(frame);
    cursor.set_position(4);

    let connection_id = read_u64(&mut cursor)?;
    let local = read_cstring(&mut cursor)?;
    let remote = read_cstring(&mut cursor)?;
    let timestamp_ms = read_u64(&mut cursor)?;
    let order = read_u64(&mut cursor)?;

    let message_start = cursor.position() as usize;
    if message_start + MESSAGE_HEADER_BYTES > frame.len() {
        return Err(RecorderError::Truncated);
    }
    let message = Message::from_bytes(Bytes::copy_from_slice(&frame[message_start..]))?;

    Ok(Packet {
        connection_id,
        local,
        remote,
        timestamp_ms,
        order,
        message,
    })
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| RecorderError::Truncated)
}

fn read_cstring(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let start = cursor.position() as usize;
    let buf = *cursor.get_ref();
    let terminator = buf[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or(RecorderError::Truncated)?;
    let value = std::str::from_utf8(&buf[start..start + terminator])
        .map_err(|_| RecorderError::Truncated)?
        .to_string();
    cursor.set_position((start + terminator + 1) as u64);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OP_MSG;

    fn sample_packet(order: u64, body: &[u8]) -> Packet {
        Packet {
            connection_id: 17,
            local: "127.0.0.1:27017".to_string(),
            remote: "10.1.2.3:50000".to_string(),
            timestamp_ms: 1_700_000_000_123,
            order,
            message: Message::new(5, 0, OP_MSG, body),
        }
    }

    #[test]
    fn round_trip() {
        let packet = sample_packet(1, b"hello");
        let encoded = encode(&packet).unwrap();
        assert_eq!(
            u32::from_le_bytes(encoded[0..4].try_into().unwrap()) as usize,
            encoded.len()
        );

        let decoded = decode_from(&mut &encoded[..]).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(decode_from(&mut &encoded[encoded.len()..]).unwrap().is_none());
    }

    #[test]
    fn round_trip_sequence() {
        let mut stream = Vec::new();
        for order in 1..=5u64 {
            stream.extend_from_slice(&encode(&sample_packet(order, b"abc")).unwrap());
        }

        let mut reader = &stream[..];
        let mut orders = Vec::new();
        while let Some(packet) = decode_from(&mut reader).unwrap() {
            orders.push(packet.order);
        }
        assert_eq!(orders, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn header_plus_message_matches_encode() {
        let packet = sample_packet(9, b"body bytes");
        let header = encode_header(&packet).unwrap();
        let mut assembled = header.clone();
        assembled.extend_from_slice(packet.message.bytes());
        assert_eq!(assembled, encode(&packet).unwrap());
    }

    #[test]
    fn oversized_message_rejected() {
        let packet = Packet {
            message: Message::new(1, 0, OP_MSG, &vec![0u8; MAX_FRAME_BYTES]),
            ..sample_packet(1, b"")
        };
        assert!(matches!(
            encode_header(&packet),
            Err(RecorderError::OversizedFrame(_))
        ));
    }

    #[test]
    fn oversized_length_word_rejected() {
        let mut stream = ((MAX_FRAME_BYTES + 1) as u32).to_le_bytes().to_vec();
        stream.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            decode_from(&mut &stream[..]),
            Err(RecorderError::OversizedFrame(_))
        ));
    }

    #[test]
    fn truncated_stream_detected() {
        let encoded = encode(&sample_packet(1, b"hello")).unwrap();

        // Mid-length-word.
        assert!(matches!(
            decode_from(&mut &encoded[..2]),
            Err(RecorderError::Truncated)
        ));

        // Mid-frame.
        assert!(matches!(
            decode_from(&mut &encoded[..encoded.len() - 3]),
            Err(RecorderError::Truncated)
        ));
    }

    #[test]
    fn undersized_length_word_rejected() {
        let stream = 8u32.to_le_bytes().to_vec();
        assert!(matches!(
            decode_from(&mut &stream[..]),
            Err(RecorderError::Truncated)
        ));
    }
}
