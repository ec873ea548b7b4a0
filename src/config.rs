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

// Startup configuration
//
// Loaded once at server bring-up from YAML with ${VAR} / ${VAR:-default}
// environment substitution. The only capture-specific knob is the recording
// directory; it defaults to empty, which disables `startRecordingTraffic`
// until an operator points it somewhere real.

use std::path::Path;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub recording_directory: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recording_directory: String::new(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CaptureConfig> {
    let content =
        std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

    let content = substitute_env_vars(&content);

    let config: CaptureConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    validate(&config)?;
    Ok(config)
}

/// Load configuration with environment variable overrides.
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<CaptureConfig> {
    let mut config = load_config(path)?;

    if let Ok(directory) = std::env::var("TRAFFIC_RECORDING_DIRECTORY") {
        config.recording_directory = directory;
        validate(&config)?;
    }

    Ok(config)
}

/// Substitute ${VAR} and ${VAR:-default} patterns with environment variables.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").unwrap();

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default_value = caps.get(2).map(|m| m.as_str());

        match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => match default_value {
                Some(default) => default.to_string(),
                None => format!("${{{}}}", var_name),
            },
        }
    })
    .to_string()
}

/// An empty recording directory is legal at startup (capture stays
/// unavailable); a non-empty one must name an existing directory.
fn validate(config: &CaptureConfig) -> Result<()> {
    if !config.recording_directory.is_empty()
        && !Path::new(&config.recording_directory).is_dir()
    {
        bail!(
            "traffic recording directory \"{}\" is not a directory",
            config.recording_directory
        );
    }
    Ok(())
}
