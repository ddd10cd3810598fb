//! Configuration loaded from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::session::{SessionConfig, DEFAULT_FREQUENCY};
use crate::worker::DEFAULT_QUEUE_CAPACITY;

/// How decoded frames are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One line of decoder text per frame
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Frequency used when `rx` is given no argument
    pub frequency: u32,

    /// Raw timing capture replayed as the radio input
    pub replay_path: Option<PathBuf>,

    /// Replay at recorded speed instead of as fast as possible
    pub replay_realtime: bool,

    /// Replay passes over the capture
    pub replay_repeat: u32,

    /// Edge queue capacity between radio and worker
    pub queue_capacity: usize,

    /// Cancellation polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Statistics logging interval in milliseconds
    pub stats_interval_ms: u64,

    pub output: OutputFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            frequency: std::env::var("SUBGHZ_FREQUENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FREQUENCY),

            replay_path: std::env::var("SUBGHZ_REPLAY_PATH").ok().map(PathBuf::from),

            replay_realtime: std::env::var("SUBGHZ_REPLAY_REALTIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),

            replay_repeat: std::env::var("SUBGHZ_REPLAY_REPEAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),

            queue_capacity: std::env::var("SUBGHZ_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),

            poll_interval_ms: std::env::var("SUBGHZ_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(250),

            stats_interval_ms: std::env::var("SUBGHZ_STATS_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),

            output: std::env::var("SUBGHZ_OUTPUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Session parameters for a capture at `frequency`
    pub fn session_config(&self, frequency: u32) -> SessionConfig {
        SessionConfig {
            frequency,
            queue_capacity: self.queue_capacity,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            stats_interval: Duration::from_millis(self.stats_interval_ms),
            ..SessionConfig::default()
        }
    }
}
