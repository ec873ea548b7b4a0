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

// Error kinds for the capture subsystem

use thiserror::Error;

/// Errors surfaced by the recorder control path, latched by the data path,
/// or raised while decoding a capture file.
///
/// Control-path errors are returned to the caller of `start`/`stop`. Data-path
/// errors happen on the writer thread or inside `observe` and are latched into
/// the recording's terminal status, first writer wins; the next `stop` reports
/// them. `observe` itself never raises.
///
/// The enum is `Clone` so a latched status can be handed out on every
/// `shutdown` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("Traffic recording directory not set")]
    DirectoryNotSet,

    #[error("Traffic recording already active")]
    AlreadyActive,

    #[error("Traffic recording not active")]
    NotActive,

    #[error("{0}")]
    BadValue(String),

    #[error("could not open traffic recording file {path}: {message}")]
    FileOpen { path: String, message: String },

    #[error("{0}")]
    LogWriteFailed(String),

    #[error("queue would have blocked")]
    QueueWouldBlock,

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    OversizedFrame(usize),

    #[error("capture file ended in the middle of a frame")]
    Truncated,

    #[error("malformed wire message: {0}")]
    MalformedMessage(String),

    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
