//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DocumentConfig {
    /// Body stream settings.
    pub body: BodyConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Body stream configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BodyConfig {
    /// Listener count per event kind above which a leak warning is logged.
    /// 0 disables the warning.
    pub max_listeners: usize,

    /// Bytes of undelivered body data above which producers wait and pipe
    /// destinations report full.
    pub high_water_mark: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            max_listeners: 10,
            high_water_mark: 16 * 1024,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"proxy_document=debug"`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human readable. For development.
    #[default]
    Pretty,
    /// Single-line, human readable.
    Compact,
    /// One JSON object per event. For production.
    Json,
}
