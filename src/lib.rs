pub mod network;
pub mod protocol;
pub mod request;
pub mod service;

pub use network::{Connection, RequestFrame, ResponseFrame};
pub use request::{ApiRegistration, DispatchTable};
pub use service::GLOBAL_CONFIG;
pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, Broker, BrokerConfig,
    NetworkConfig, Server, Shutdown,
};
