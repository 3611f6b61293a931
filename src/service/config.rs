use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceLock<BrokerConfig> = OnceLock::new();

/// Returns the process-wide configuration. Panics if called before `GLOBAL_CONFIG` is set,
/// which only the binary's startup path does.
pub fn global_config() -> &'static BrokerConfig {
    GLOBAL_CONFIG.get().expect("broker config is not initialized")
}

pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;
const ENV_PREFIX: &str = "WIREBROKER";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub max_connection: usize,
    /// upper bound for the declared length of a request frame
    pub max_frame_size: usize,
    pub conn_read_buffer_size: usize,
    /// per-read timeout once a frame has started arriving, 0 disables it
    pub read_timeout_ms: u64,
    /// close connections that send nothing for this long, 0 disables it
    pub idle_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 9092,
            max_connection: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            conn_read_buffer_size: 4 * 1024,
            read_timeout_ms: 30_000,
            idle_timeout_ms: 0,
        }
    }
}

impl NetworkConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// directory of the hourly rolling log file
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
            file_prefix: "wirebroker.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    pub network: NetworkConfig,
    pub log: LogConfig,
}

impl BrokerConfig {
    /// Loads the configuration from built-in defaults, the optional file at `path` and
    /// `WIREBROKER__SECTION__KEY` environment variables, in increasing precedence.
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<BrokerConfig> {
        let path_str = path.as_ref().to_str().ok_or(AppError::InvalidValue(format!(
            "config file path: {}",
            path.as_ref().to_string_lossy()
        )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let broker_config: BrokerConfig = config.try_deserialize()?;
        broker_config.validate()?;
        Ok(broker_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        let max_frame_size = self.network.max_frame_size;
        if max_frame_size == 0 || max_frame_size > i32::MAX as usize {
            return Err(AppError::InvalidValue(format!(
                "network.max_frame_size must be within 1..={}, got {}",
                i32::MAX,
                max_frame_size
            )));
        }
        if self.network.max_connection == 0 {
            return Err(AppError::InvalidValue(
                "network.max_connection must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
