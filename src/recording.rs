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

// One active capture: the packet queue, the writer thread that drains it to
// the output file, the byte counter, and the terminal status latch.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{RecorderError, Result};
use crate::frame::{self, Packet};
use crate::message::Message;
use crate::protocol::{SessionInfo, StartRecording, TrafficRecordingStatus};
use crate::queue::{CostQueue, TryPushError};

/// Cost budget of one writer batch.
const WRITE_BATCH_BYTES: usize = 1 << 24;

struct RecordingState {
    in_shutdown: bool,
    written: u64,
    status: Result<()>,
}

/// A single recording. Constructed by the facade's `start`, runs until the
/// queue drains after a close or until a data-path error latches, and is
/// never reused.
pub struct Recording {
    path: PathBuf,
    max_file_bytes: u64,
    queue: CostQueue<Packet>,
    order: AtomicU64,
    writer: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<RecordingState>,
}

impl Recording {
    /// Validate the filename against the (already normalized) recording
    /// directory and set up the queue. The writer thread starts in `run`.
    pub fn new(options: &StartRecording, directory: &str) -> Result<Recording> {
        let path = resolve_path(directory, &options.filename)?;
        Ok(Recording {
            path,
            max_file_bytes: options.max_file_size,
            queue: CostQueue::new(options.buffer_size as usize),
            order: AtomicU64::new(0),
            writer: Mutex::new(None),
            state: Mutex::new(RecordingState {
                in_shutdown: false,
                written: 0,
                status: Ok(()),
            }),
        })
    }

    /// Launch the writer thread. The output file is opened inside the thread;
    /// an open failure latches rather than failing `run`.
    pub fn run(self: Arc<Self>) -> Result<()> {
        let recording = Arc::clone(&self);
        let handle = thread::Builder::new()
            .name("traffic-recording-writer".to_string())
            .spawn(move || {
                if let Err(status) = recording.write_loop() {
                    warn!(error = %status, "traffic recording writer exiting on error");
                    recording.latch(status);
                }
            })
            .map_err(RecorderError::from)?;
        *self.writer.lock() = Some(handle);
        Ok(())
    }

    fn write_loop(&self) -> Result<()> {
        let file = File::create(&self.path).map_err(|err| RecorderError::FileOpen {
            path: self.path.display().to_string(),
            message: err.to_string(),
        })?;
        let mut out = BufWriter::new(file);
        let mut batch: Vec<Packet> = Vec::new();

        loop {
            batch.clear();
            if self.queue.pop_many_up_to(WRITE_BATCH_BYTES, &mut batch).is_err() {
                out.flush()
                    .map_err(|err| RecorderError::LogWriteFailed(err.to_string()))?;
                debug!("traffic recording queue drained");
                return Ok(());
            }

            for packet in &batch {
                let header = frame::encode_header(packet)?;
                let frame_len = (header.len() + packet.message.size()) as u64;

                // The cap is checked before the write that would cross it, so
                // the file never holds a partial frame past the limit.
                {
                    let mut state = self.state.lock();
                    state.written += frame_len;
                    if state.written >= self.max_file_bytes {
                        return Err(RecorderError::LogWriteFailed(
                            "hit maximum log size".to_string(),
                        ));
                    }
                }

                out.write_all(&header)
                    .map_err(|err| RecorderError::LogWriteFailed(err.to_string()))?;
                out.write_all(packet.message.bytes())
                    .map_err(|err| RecorderError::LogWriteFailed(err.to_string()))?;
            }
        }
    }

    /// Wrap session metadata and the message into a packet and offer it to
    /// the queue. A refused admission is fatal to the recording: the producer
    /// end is closed and `QueueWouldBlock` latched unless an earlier error
    /// already did.
    pub fn push_record(
        &self,
        session: &SessionInfo,
        now: SystemTime,
        order: u64,
        message: Message,
    ) -> bool {
        let packet = Packet {
            connection_id: session.id,
            local: session.local.clone(),
            remote: session.remote.clone(),
            timestamp_ms: millis_since_epoch(now),
            order,
            message,
        };

        match self.queue.try_push(packet) {
            Ok(()) => true,
            Err(TryPushError::Closed(_)) => false,
            Err(TryPushError::Full(_)) => {
                warn!("traffic recording queue overflowed, failing the recording");
                self.queue.close();
                self.latch(RecorderError::QueueWouldBlock);
                false
            }
        }
    }

    /// Close the producer end, join the writer, and report the latched
    /// status. Idempotent: repeat calls return the same status without
    /// touching the thread.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.in_shutdown {
                return state.status.clone();
            }
            state.in_shutdown = true;
        }

        self.queue.close();
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }

        self.state.lock().status.clone()
    }

    /// Consistent statistics snapshot, taken under the state lock.
    pub fn stats(&self) -> TrafficRecordingStatus {
        let state = self.state.lock();
        TrafficRecordingStatus {
            running: true,
            recording_file: Some(self.path.display().to_string()),
            buffer_size: Some(self.queue.max_cost() as u64),
            buffered_bytes: Some(self.queue.queue_depth() as u64),
            current_file_size: Some(state.written),
            max_file_size: Some(self.max_file_bytes),
        }
    }

    /// Next value of the recording-scoped monotonic sequence: 1, 2, ...
    pub fn next_order(&self) -> u64 {
        self.order.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn latch(&self, status: RecorderError) {
        let mut state = self.state.lock();
        if state.status.is_ok() {
            state.status = Err(status);
        }
    }
}

/// Join `directory / filename`, requiring the filename to be bare: the
/// resolved parent must equal the directory character for character.
fn resolve_path(directory: &str, filename: &str) -> Result<PathBuf> {
    if filename.is_empty() {
        return Err(RecorderError::BadValue(
            "Traffic recording filename must not be empty".to_string(),
        ));
    }

    let parent = Path::new(directory);
    let path = parent.join(filename);
    if path.parent() != Some(parent) {
        return Err(RecorderError::BadValue(
            "Traffic recording filename must be a simple filename".to_string(),
        ));
    }
    Ok(path)
}

fn millis_since_epoch(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
