use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, trace};

use crate::request::DispatchTable;
use crate::service::Server;
use crate::AppError::IllegalStateError;
use crate::{global_config, AppResult};

/// Runs the listener with the process-wide configuration until ctrl-c.
#[derive(Debug)]
pub struct Broker {
    dispatch_table: Arc<DispatchTable>,
}

impl Broker {
    pub fn new(dispatch_table: DispatchTable) -> Self {
        Broker {
            dispatch_table: Arc::new(dispatch_table),
        }
    }

    /// A table that only answers ApiVersions.
    pub fn default_dispatch_table() -> AppResult<DispatchTable> {
        DispatchTable::builder().with_api_versions().build()
    }

    /// Blocks on `rt` until the listener stops, then waits for every connection task
    /// to finish.
    pub fn start(&mut self, rt: &Runtime) -> AppResult<()> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

        rt.block_on(Self::run_tcp_server(
            Arc::clone(&self.dispatch_table),
            notify_shutdown.clone(),
            shutdown_complete_tx,
        ))?;

        // tcp server has been shutdown, send shutdown signal. an error only means no
        // connection is left to hear it
        if notify_shutdown.send(()).is_err() {
            trace!("no open connection to notify");
        }
        // wait for shutdown complete
        trace!("waiting for shutdown complete...");
        rt.block_on(shutdown_complete_rx.recv());
        info!("broker shutdown complete");
        Ok(())
    }

    async fn run_tcp_server(
        dispatch_table: Arc<DispatchTable>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> AppResult<()> {
        let network_conf = &global_config().network;
        let listen_address = network_conf.listen_address();

        let listener = match TcpListener::bind(&listen_address).await {
            Ok(listener) => listener,
            Err(err) => {
                let error_msg = format!(
                    "Failed to bind server to address: {} - Error: {}",
                    listen_address, err
                );
                error!("{}", error_msg);
                return Err(IllegalStateError(error_msg));
            }
        };
        info!("tcp server binding to {} for listening", &listen_address);

        let server = Server::new(
            listener,
            notify_shutdown,
            shutdown_complete_tx,
            dispatch_table,
            network_conf.clone(),
        );
        tokio::select! {
          res = server.run() => {
              if let Err(err) = res {
                  error!(cause = %err, "failed to accept");
              }
          }
          _ = signal::ctrl_c() => {
              info!("get shutdown signal");
          }
        }

        Ok(())
    }
}
