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

// In-process wire-traffic capture subsystem
//
// Request-handling threads publish every observed wire message into a
// cost-bounded queue; a single writer thread drains it into a framed capture
// file. A matching reader turns capture files into the document stream the
// external replay tool consumes. Capture is best-effort by design: when the
// queue or the file-size budget is exhausted the recording is terminated, the
// serving path never waits.

pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod protocol;
pub mod queue;
pub mod reader;
pub mod recorder;
pub mod recording;

// Re-export main types
pub use config::{load_config, load_config_with_env, CaptureConfig};
pub use error::RecorderError;
pub use frame::Packet;
pub use message::{Message, MessageHeader, MAX_MESSAGE_SIZE_BYTES, OP_MSG};
pub use protocol::{SessionInfo, StartRecording, TrafficRecordingStatus};
pub use reader::{read_capture_file, stream_capture, CaptureDocument};
pub use recorder::TrafficRecorder;
pub use recording::Recording;
