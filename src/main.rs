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

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use traffic_recorder::reader;

/// Capture Reader - decode a traffic capture file into replay documents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file written by the traffic recorder
    input: PathBuf,

    /// Stream replay-tool JSON lines (preamble first, no opType) instead of
    /// printing the document list
    #[arg(long)]
    replay: bool,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.replay {
        let file = File::open(&args.input)
            .with_context(|| format!("Failed to open capture file {}", args.input.display()))?;
        let mut input = BufReader::new(file);

        let frames = reader::stream_capture(&mut input, &mut out)
            .with_context(|| format!("Failed to decode {}", args.input.display()))?;
        info!(frames, "capture streamed");
    } else {
        let documents = reader::read_capture_file(&args.input)
            .with_context(|| format!("Failed to decode {}", args.input.display()))?;
        info!(documents = documents.len(), "capture decoded");

        serde_json::to_writer_pretty(&mut out, &documents)?;
        out.write_all(b"\n")?;
    }

    Ok(())
}
