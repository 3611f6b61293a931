pub use app_error::{AppError, AppResult};
pub use broker::Broker;
pub use config::{
    global_config, BrokerConfig, LogConfig, NetworkConfig, DEFAULT_MAX_FRAME_SIZE, GLOBAL_CONFIG,
};
pub use server::{ConnectionState, Server};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing, OtelGuard};

mod app_error;
mod broker;
mod config;
mod server;
mod shutdown;
mod tracing_config;
