//! Configuration loading and validation.
//!
//! A run is configured by a single TOML file, read once at startup into an
//! immutable [`MonitorConfig`] that the rest of the process borrows.
//!
//! | Section      | Key         | Required | Default | Description                         |
//! |--------------|-------------|----------|---------|-------------------------------------|
//! | `[mqtt]`     | `host`      | yes      | --      | Broker hostname or IP               |
//! | `[mqtt]`     | `port`      | no       | `1883`  | Broker TCP port                     |
//! | `[mqtt]`     | `user`      | yes      | --      | Broker username                     |
//! | `[mqtt]`     | `pass`      | yes      | --      | Broker password                     |
//! | `[telegram]` | `bot_token` | yes      | --      | Bot token for the alert channel     |
//! | `[telegram]` | `chat_id`   | yes      | --      | Chat the alerts are delivered to    |
//! | `[devices]`  | `topics`    | yes      | --      | Comma-separated topics to watch     |

use std::path::Path;

use serde::Deserialize;

/// Standard MQTT port, used when `[mqtt] port` is absent.
const DEFAULT_MQTT_PORT: u16 = 1883;

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

/// Errors raised while loading the configuration file.
///
/// All of these are fatal at startup; nothing else runs without a valid
/// configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read at all.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or a required key is missing.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// `[devices] topics` was empty after trimming.
    #[error("[devices] topics must name at least one topic")]
    NoTopics,
}

/// `[mqtt]` section: where to find the broker and how to authenticate.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSection {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub user: String,
    pub pass: String,
}

/// `[telegram]` section: the outbound alert channel.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    pub bot_token: String,
    pub chat_id: String,
}

/// On-disk shape of the configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    mqtt: MqttSection,
    telegram: TelegramSection,
    devices: DevicesSection,
}

#[derive(Debug, Deserialize)]
struct DevicesSection {
    /// Comma-separated topic list, e.g. `"zigbee/router1, zigbee/router2"`.
    topics: String,
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub mqtt: MqttSection,
    pub telegram: TelegramSection,
    /// Topics to watch, in file order, whitespace-trimmed.
    pub topics: Vec<String>,
}

impl MonitorConfig {
    /// Read and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let topics = parse_topics(&raw.devices.topics);
        if topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }

        Ok(Self {
            mqtt: raw.mqtt,
            telegram: raw.telegram,
            topics,
        })
    }
}

/// Split the comma-separated topic list, trimming whitespace and dropping
/// empty entries.
fn parse_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}
