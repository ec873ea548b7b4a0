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

/// Recorder facade tests: start/stop lifecycle, observe gating, statistics
use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, Instant, SystemTime};

use tempfile::TempDir;
use traffic_recorder::error::RecorderError;
use traffic_recorder::frame;
use traffic_recorder::message::Message;
use traffic_recorder::protocol::{SessionInfo, StartRecording};
use traffic_recorder::recorder::TrafficRecorder;

const OP_QUERY: i32 = 2004;

fn session() -> SessionInfo {
    SessionInfo {
        id: 21,
        local: "[::1]:27017".to_string(),
        remote: "10.0.0.1:55555".to_string(),
    }
}

fn options(filename: &str) -> StartRecording {
    StartRecording {
        filename: filename.to_string(),
        max_file_size: 1 << 24,
        buffer_size: 1 << 24,
    }
}

#[test]
fn lifecycle_from_unset_directory_to_double_stop() {
    let recorder = TrafficRecorder::new("");

    let err = recorder.start(&options("cap1")).unwrap_err();
    assert_eq!(err.to_string(), "Traffic recording directory not set");

    let dir = TempDir::new().unwrap();
    recorder
        .set_directory(dir.path().to_string_lossy().to_string())
        .unwrap();

    recorder.start(&options("cap1")).unwrap();
    recorder.stop().unwrap();

    let err = recorder.stop().unwrap_err();
    assert_eq!(err.to_string(), "Traffic recording not active");
}

#[test]
fn set_directory_requires_an_existing_directory() {
    let recorder = TrafficRecorder::new("");
    let err = recorder
        .set_directory("/no/such/capture/directory")
        .unwrap_err();
    assert!(matches!(err, RecorderError::BadValue(_)));
    assert!(err.to_string().contains("is not a directory"));
}

#[test]
fn second_start_is_rejected_while_active() {
    let dir = TempDir::new().unwrap();
    let recorder = TrafficRecorder::new(dir.path().to_string_lossy().to_string());

    recorder.start(&options("cap1")).unwrap();
    let err = recorder.start(&options("cap2")).unwrap_err();
    assert_eq!(err.to_string(), "Traffic recording already active");

    recorder.stop().unwrap();
}

#[test]
fn escaping_filename_is_rejected_and_leaves_recorder_idle() {
    let dir = TempDir::new().unwrap();
    let recorder = TrafficRecorder::new(dir.path().to_string_lossy().to_string());

    let err = recorder.start(&options("../evil")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Traffic recording filename must be a simple filename"
    );

    let err = recorder.start(&options("")).unwrap_err();
    assert_eq!(err.to_string(), "Traffic recording filename must not be empty");

    // The failed starts published nothing; a clean start still works.
    recorder.start(&options("cap1")).unwrap();
    recorder.stop().unwrap();
}

#[test]
fn trailing_slash_on_the_directory_is_normalized() {
    let dir = TempDir::new().unwrap();
    let with_slash = format!("{}/", dir.path().to_string_lossy());
    let recorder = TrafficRecorder::new(with_slash);

    recorder.start(&options("cap1")).unwrap();
    recorder.stop().unwrap();
    assert!(dir.path().join("cap1").is_file());
}

#[test]
fn observed_messages_reach_the_file_in_order() {
    let dir = TempDir::new().unwrap();
    let recorder = TrafficRecorder::new(dir.path().to_string_lossy().to_string());

    recorder.start(&options("cap1")).unwrap();

    let message = Message::new(1, 0, OP_QUERY, &[0x5a; 512]);
    for _ in 0..100 {
        recorder.observe(&session(), SystemTime::now(), &message);
    }

    // The writer drains asynchronously; wait for the first bytes to land.
    let deadline = Instant::now() + Duration::from_secs(10);
    let first = loop {
        let stats = recorder.stats();
        let written = stats.current_file_size.unwrap_or(0);
        if written > 0 {
            break stats;
        }
        assert!(Instant::now() < deadline, "writer made no progress");
        std::thread::sleep(Duration::from_millis(10));
    };

    std::thread::sleep(Duration::from_millis(20));
    let second = recorder.stats();

    assert!(first.running && second.running);
    assert!(second.current_file_size >= first.current_file_size);
    assert_eq!(first.buffer_size, Some(1 << 24));
    assert_eq!(first.max_file_size, Some(1 << 24));

    recorder.stop().unwrap();

    let file = File::open(dir.path().join("cap1")).unwrap();
    let mut reader = BufReader::new(file);
    let mut orders = Vec::new();
    while let Some(packet) = frame::decode_from(&mut reader).unwrap() {
        assert_eq!(packet.connection_id, 21);
        assert_eq!(packet.local, "[::1]:27017");
        assert_eq!(packet.remote, "10.0.0.1:55555");
        assert_eq!(packet.message, message);
        orders.push(packet.order);
    }
    assert_eq!(orders, (1..=100).collect::<Vec<u64>>());
}

#[test]
fn queue_overflow_disables_capture_and_surfaces_on_stop() {
    let dir = TempDir::new().unwrap();
    let recorder = TrafficRecorder::new(dir.path().to_string_lossy().to_string());

    recorder.start(&StartRecording {
        filename: "cap1".to_string(),
        max_file_size: 1 << 24,
        buffer_size: 8192,
    }).unwrap();

    // A single message larger than the whole buffer can never be admitted.
    let oversized = Message::new(1, 0, OP_QUERY, &vec![0u8; 16_000]);
    recorder.observe(&session(), SystemTime::now(), &oversized);

    // The failure lowered the fast gate: capture reads as idle and further
    // observes are no-ops.
    assert!(!recorder.stats().running);
    recorder.observe(&session(), SystemTime::now(), &oversized);

    assert_eq!(recorder.stop(), Err(RecorderError::QueueWouldBlock));
}

#[test]
fn stats_are_idle_when_nothing_records() {
    let recorder = TrafficRecorder::new("");
    let stats = recorder.stats();
    assert!(!stats.running);
    assert_eq!(
        serde_json::to_string(&stats).unwrap(),
        r#"{"running":false}"#
    );
}

#[test]
fn observe_without_capture_is_a_no_op() {
    let recorder = TrafficRecorder::new("");
    let message = Message::new(1, 0, OP_QUERY, b"ignored");
    recorder.observe(&session(), SystemTime::now(), &message);
    assert!(!recorder.stats().running);
}
