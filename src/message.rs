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

// Opaque wire-message carrier
//
// The capture pipeline treats messages as length-carrying byte blobs. The
// only structure it ever looks at is the 16-byte embedded header (length,
// request id, response-to, opcode, all little-endian i32) and, for the
// reader's opType field, the command name at the front of an OP_MSG body.

use bytes::Bytes;

use crate::error::{RecorderError, Result};

/// Size of the embedded wire header.
pub const MESSAGE_HEADER_BYTES: usize = 16;

/// Largest message the wire protocol permits.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 48 * 1024 * 1024;

/// Opcode of the modern command message format.
pub const OP_MSG: i32 = 2013;

/// The embedded header every wire message starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

/// A reference-counted wire message. Cloning bumps a refcount; the packet
/// holds ownership from enqueue until the writer has flushed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    data: Bytes,
}

impl Message {
    /// Assemble a message from header fields and a body. The embedded length
    /// is computed from the body.
    pub fn new(request_id: i32, response_to: i32, op_code: i32, body: &[u8]) -> Message {
        let len = (MESSAGE_HEADER_BYTES + body.len()) as i32;
        let mut data = Vec::with_capacity(MESSAGE_HEADER_BYTES + body.len());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&request_id.to_le_bytes());
        data.extend_from_slice(&response_to.to_le_bytes());
        data.extend_from_slice(&op_code.to_le_bytes());
        data.extend_from_slice(body);
        Message { data: data.into() }
    }

    /// Wrap raw bytes already carrying their header. The embedded length must
    /// agree with the buffer length.
    pub fn from_bytes(data: Bytes) -> Result<Message> {
        if data.len() < MESSAGE_HEADER_BYTES {
            return Err(RecorderError::MalformedMessage(format!(
                "{} bytes is too short for a wire header",
                data.len()
            )));
        }
        let message = Message { data };
        let embedded = message.header().message_length;
        if embedded as usize != message.data.len() {
            return Err(RecorderError::MalformedMessage(format!(
                "embedded length {} does not match buffer length {}",
                embedded,
                message.data.len()
            )));
        }
        Ok(message)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            message_length: read_i32(&self.data, 0),
            request_id: read_i32(&self.data, 4),
            response_to: read_i32(&self.data, 8),
            op_code: read_i32(&self.data, 12),
        }
    }

    /// Bytes after the embedded header.
    pub fn body(&self) -> &[u8] {
        &self.data[MESSAGE_HEADER_BYTES..]
    }

    /// Command name of an OP_MSG message: the first element name of the
    /// kind-0 body section document.
    ///
    /// Body layout: u32 flag bits, then a section kind byte, then for kind 0 a
    /// document (i32 length, elements of type byte + NUL-terminated name).
    pub fn command_name(&self) -> Result<String> {
        let body = self.body();
        if body.len() < 5 || body[4] != 0 {
            return Err(RecorderError::MalformedMessage(
                "no kind-0 body section".to_string(),
            ));
        }
        let doc = &body[5..];
        if doc.len() < 5 {
            return Err(RecorderError::MalformedMessage(
                "body section document too short".to_string(),
            ));
        }
        // Element type byte 0 is the end-of-document marker.
        if doc[4] == 0 {
            return Err(RecorderError::MalformedMessage(
                "empty command document".to_string(),
            ));
        }
        let name = &doc[5..];
        let end = name.iter().position(|&b| b == 0).ok_or_else(|| {
            RecorderError::MalformedMessage("unterminated element name".to_string())
        })?;
        String::from_utf8(name[..end].to_vec())
            .map_err(|_| RecorderError::MalformedMessage("non-UTF-8 element name".to_string()))
    }
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[at..at + 4]);
    i32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal kind-0 OP_MSG body carrying one command element.
    fn op_msg_body(command: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes()); // flag bits
        body.push(0); // section kind 0
        let doc_len = 4 + 1 + command.len() + 1 + 8 + 1;
        body.extend_from_slice(&(doc_len as i32).to_le_bytes());
        body.push(0x01); // double element
        body.extend_from_slice(command.as_bytes());
        body.push(0);
        body.extend_from_slice(&1f64.to_le_bytes());
        body.push(0); // end of document
        body
    }

    #[test]
    fn header_round_trip() {
        let message = Message::new(42, 7, OP_MSG, b"payload");
        let header = message.header();
        assert_eq!(header.message_length as usize, message.size());
        assert_eq!(header.request_id, 42);
        assert_eq!(header.response_to, 7);
        assert_eq!(header.op_code, OP_MSG);
        assert_eq!(message.body(), b"payload");
    }

    #[test]
    fn from_bytes_validates_length() {
        let message = Message::new(1, 0, OP_MSG, b"abc");
        let reparsed = Message::from_bytes(Bytes::copy_from_slice(message.bytes())).unwrap();
        assert_eq!(reparsed, message);

        let mut corrupt = message.bytes().to_vec();
        corrupt.truncate(corrupt.len() - 1);
        assert!(matches!(
            Message::from_bytes(Bytes::from(corrupt)),
            Err(RecorderError::MalformedMessage(_))
        ));

        assert!(matches!(
            Message::from_bytes(Bytes::from_static(b"tiny")),
            Err(RecorderError::MalformedMessage(_))
        ));
    }

    #[test]
    fn command_name_from_op_msg() {
        let message = Message::new(1, 0, OP_MSG, &op_msg_body("isMaster"));
        assert_eq!(message.command_name().unwrap(), "isMaster");
    }

    #[test]
    fn command_name_rejects_garbage() {
        let message = Message::new(1, 0, OP_MSG, b"xx");
        assert!(matches!(
            message.command_name(),
            Err(RecorderError::MalformedMessage(_))
        ));
    }
}
