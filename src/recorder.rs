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

// Process-wide recorder facade
//
// Lives on the server's service container for the process lifetime and owns
// at most one Recording at a time. The hot path is `observe`, called by the
// session layer on every inbound and outbound message: a single atomic load
// when capture is off, a short lock for a pointer copy when it is on.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{RecorderError, Result};
use crate::message::Message;
use crate::protocol::{SessionInfo, StartRecording, TrafficRecordingStatus};
use crate::recording::Recording;

struct RecorderInner {
    directory: String,
    recording: Option<Arc<Recording>>,
}

pub struct TrafficRecorder {
    /// Fast gate for `observe`. Set after a recording is published, cleared
    /// before one is removed, so a true flag with no recording is transient
    /// and `observe` still null-checks.
    should_record: AtomicBool,
    inner: Mutex<RecorderInner>,
}

impl TrafficRecorder {
    /// `recording_directory` comes from validated startup configuration and
    /// may be empty, in which case `start` refuses to run.
    pub fn new(recording_directory: impl Into<String>) -> TrafficRecorder {
        TrafficRecorder {
            should_record: AtomicBool::new(false),
            inner: Mutex::new(RecorderInner {
                directory: recording_directory.into(),
                recording: None,
            }),
        }
    }

    /// The `setParameter` surface: point the recorder at a different capture
    /// directory. The value must name an existing directory.
    pub fn set_directory(&self, directory: impl Into<String>) -> Result<()> {
        let directory = directory.into();
        if !Path::new(&directory).is_dir() {
            return Err(RecorderError::BadValue(format!(
                "traffic recording directory \"{directory}\" is not a directory"
            )));
        }
        self.inner.lock().directory = directory;
        Ok(())
    }

    /// Start a capture. The directory value is read and normalized under the
    /// recorder lock; the new recording is published before the fast gate is
    /// raised.
    pub fn start(&self, options: &StartRecording) -> Result<()> {
        {
            let mut inner = self.inner.lock();

            if inner.directory.is_empty() {
                return Err(RecorderError::DirectoryNotSet);
            }
            if inner.recording.is_some() {
                return Err(RecorderError::AlreadyActive);
            }

            let directory = inner.directory.trim_end_matches('/').to_string();
            let recording = Arc::new(Recording::new(options, &directory)?);
            Arc::clone(&recording).run()?;
            info!(path = %recording.path().display(), "traffic recording started");
            inner.recording = Some(recording);
        }

        self.should_record.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the capture and surface the writer's latched status.
    pub fn stop(&self) -> Result<()> {
        self.should_record.store(false, Ordering::Release);

        let recording = self
            .inner
            .lock()
            .recording
            .take()
            .ok_or(RecorderError::NotActive)?;

        info!(path = %recording.path().display(), "traffic recording stopping");
        recording.shutdown()
    }

    /// Record one observed message. Never raises: any failure terminates the
    /// capture, not the serving path.
    pub fn observe(&self, session: &SessionInfo, now: SystemTime, message: &Message) {
        if !self.should_record.load(Ordering::Acquire) {
            return;
        }

        let recording = { self.inner.lock().recording.clone() };
        let Some(recording) = recording else {
            return;
        };

        let order = recording.next_order();
        if recording.push_record(session, now, order, message.clone()) {
            return;
        }

        // The push failed. Lower the fast gate, but only if the recording we
        // pushed into is still the published one; a stale failure must not
        // suppress a freshly started capture.
        let inner = self.inner.lock();
        if let Some(current) = &inner.recording {
            if Arc::ptr_eq(current, &recording) {
                warn!("traffic recording push failed, disabling capture");
                self.should_record.store(false, Ordering::Release);
            }
        }
    }

    /// Snapshot for the `trafficRecording` server-status section.
    pub fn stats(&self) -> TrafficRecordingStatus {
        if !self.should_record.load(Ordering::Acquire) {
            return TrafficRecordingStatus::idle();
        }

        let recording = { self.inner.lock().recording.clone() };
        match recording {
            Some(recording) => recording.stats(),
            None => TrafficRecordingStatus::idle(),
        }
    }
}
