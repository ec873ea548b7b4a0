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

// Control-surface types exchanged with the admin command dispatcher and the
// server-status poller.

use serde::{Deserialize, Serialize};

/// Options of the `startRecordingTraffic` admin command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecording {
    /// Bare filename inside the configured recording directory.
    pub filename: String,

    /// Ceiling on the capture file; crossing it terminates the recording.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Byte budget of the in-memory packet queue.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u64,
}

fn default_max_file_size() -> u64 {
    6 * 1024 * 1024 * 1024
}

fn default_buffer_size() -> u64 {
    128 * 1024 * 1024
}

/// The `trafficRecording` server-status section. Idle serializes as exactly
/// `{"running": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRecordingStatus {
    pub running: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffered_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
}

impl TrafficRecordingStatus {
    pub fn idle() -> TrafficRecordingStatus {
        TrafficRecordingStatus {
            running: false,
            recording_file: None,
            buffer_size: None,
            buffered_bytes: None,
            current_file_size: None,
            max_file_size: None,
        }
    }
}

/// What the session layer knows about one transport session: a stable
/// connection id and the two endpoints in `host:port` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u64,
    pub local: String,
    pub remote: String,
}
