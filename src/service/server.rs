use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, trace};

use crate::network::Connection;
use crate::protocol::ApiKey;
use crate::request::{DispatchTable, ParsedRequest};
use crate::{AppError, AppResult};

use super::{NetworkConfig, Shutdown};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Where a connection loop is in its request/response cycle.
///
/// `AwaitingFrame -> ParsingHeader -> Dispatching -> Writing -> AwaitingFrame` repeats
/// until the loop ends in `Closed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingFrame,
    ParsingHeader,
    Dispatching,
    Writing,
    Closed,
    Failed,
}

// handler for each connection
pub(crate) struct ConnectionHandler<S = TcpStream> {
    connection_id: u64,
    peer: String,
    connection: Connection<S>,
    dispatch_table: Arc<DispatchTable>,
    state: ConnectionState,
    notify_shutdown: broadcast::Sender<()>,
    _shutdown_complete_tx: mpsc::Sender<()>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        connection: Connection<S>,
        peer: String,
        dispatch_table: Arc<DispatchTable>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        ConnectionHandler {
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            connection,
            dispatch_table,
            state: ConnectionState::AwaitingFrame,
            notify_shutdown,
            _shutdown_complete_tx: shutdown_complete_tx,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        trace!(
            "connection {} {:?} -> {:?}",
            self.connection_id,
            self.state,
            next
        );
        self.state = next;
    }

    /// Serves requests one at a time until the client leaves or something fails.
    ///
    /// The transport is closed exactly once on the way out, whichever state the loop
    /// ended in. Returns the terminal state.
    pub(crate) async fn run(mut self) -> ConnectionState {
        let final_state = match self.handle_connection().await {
            Ok(()) => {
                info!(
                    monotonic_counter.connections_closed = 1u64,
                    "connection {} from {} closed", self.connection_id, self.peer
                );
                ConnectionState::Closed
            }
            Err(e) if e.is_clean_close() => {
                info!(
                    monotonic_counter.connections_closed = 1u64,
                    "connection {} from {} closed: {}",
                    self.connection_id, self.peer, e
                );
                ConnectionState::Closed
            }
            Err(e) => {
                error!(
                    monotonic_counter.connections_failed = 1u64,
                    "connection {} from {} failed while {:?}: {}",
                    self.connection_id,
                    self.peer,
                    self.state,
                    e
                );
                ConnectionState::Failed
            }
        };
        self.transition(final_state);
        self.connection.close().await;
        final_state
    }

    async fn handle_connection(&mut self) -> AppResult<()> {
        let mut shutdown = Shutdown::listen(&self.notify_shutdown);
        let dispatch_table = Arc::clone(&self.dispatch_table);
        loop {
            self.transition(ConnectionState::AwaitingFrame);
            // read request from client, if client close the connection gracefully, return None,
            // if client close the connection unexpectedly, return Err
            let maybe_frame = tokio::select! {
                res = self.connection.read_frame() => res?,
                _ = shutdown.wait() => {
                    debug!("connection handler exit read loop after recv shutdown signal");
                    return Ok(());
                }
            };
            let Some(frame) = maybe_frame else {
                return Ok(());
            };

            self.transition(ConnectionState::ParsingHeader);
            let request = dispatch_table.parse(frame.payload)?;
            if let ParsedRequest::Routed { header, .. } = &request {
                debug!(
                    "connection {} request {}({}) v{} correlation id {} client {:?}",
                    self.connection_id,
                    ApiKey::name_of(header.api_key),
                    header.api_key,
                    header.api_version,
                    header.correlation_id,
                    header.client_id
                );
            }

            self.transition(ConnectionState::Dispatching);
            let response = dispatch_table.dispatch(request)?;

            self.transition(ConnectionState::Writing);
            self.connection.write_frame(&response).await?;
        }
    }
}

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    dispatch_table: Arc<DispatchTable>,
    network: NetworkConfig,
}

impl Server {
    pub fn new(
        listener: TcpListener,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        dispatch_table: Arc<DispatchTable>,
        network: NetworkConfig,
    ) -> Self {
        Server {
            listener,
            limit_connections: Arc::new(Semaphore::new(network.max_connection)),
            notify_shutdown,
            shutdown_complete_tx,
            dispatch_table,
            network,
        }
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections and spawns one task per connection.
    ///
    /// A permit is acquired for each connection to limit the number of concurrent
    /// connections; it is held until the connection task ends. The accept loop never
    /// performs connection I/O itself.
    ///
    /// # Returns
    /// Under normal operations, continuously accept new connections.
    /// Exit with an error if failing to accept new connections.
    #[tracing::instrument(skip(self), fields(addr = ?self.listener.local_addr().ok()))]
    pub async fn run(&self) -> AppResult<()> {
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::IllegalStateError(format!("connection limiter: {}", e)))?;

            let (socket, peer_addr) = self.accept().await?;
            info!(
                monotonic_counter.connections_accepted = 1u64,
                "accept new connection from {}", peer_addr
            );
            if let Err(e) = socket.set_nodelay(true) {
                debug!("set nodelay on {} failed: {}", peer_addr, e);
            }

            let handler = ConnectionHandler::new(
                Connection::new(socket, &self.network),
                peer_addr.to_string(),
                Arc::clone(&self.dispatch_table),
                self.notify_shutdown.clone(),
                self.shutdown_complete_tx.clone(),
            );

            tokio::spawn(async move {
                handler.run().await;
                // whether gracefully or unexpectedly closed, release connection
                drop(permit);
            });
        }
    }

    async fn accept(&self) -> AppResult<(TcpStream, SocketAddr)> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return Ok(accepted),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::Accept(format!(
                            "accept tcp server error: {}",
                            err
                        )));
                    }
                    error!("accept failed, retry in {}s: {}", backoff, err);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("tcp server dropped");
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes, BytesMut};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::request::{ApiRegistration, HeaderFormat, RequestHeader};

    fn echo(_header: &RequestHeader, body: Bytes) -> AppResult<BytesMut> {
        Ok(BytesMut::from(&body[..]))
    }

    fn failing(_header: &RequestHeader, _body: Bytes) -> AppResult<BytesMut> {
        Err(AppError::InvalidValue("no answer".to_string()))
    }

    fn handler(
        notify_shutdown: &broadcast::Sender<()>,
    ) -> (ConnectionHandler<DuplexStream>, DuplexStream, mpsc::Receiver<()>) {
        let table = DispatchTable::builder()
            .register(ApiRegistration::new(1000, 0, 0, echo))
            .register(ApiRegistration::new(1001, 0, 0, failing))
            .build()
            .unwrap();
        let (server, client) = duplex(64 * 1024);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);
        let handler = ConnectionHandler::new(
            Connection::new(server, &NetworkConfig::default()),
            "in-memory".to_string(),
            Arc::new(table),
            notify_shutdown.clone(),
            shutdown_complete_tx,
        );
        (handler, client, shutdown_complete_rx)
    }

    fn frame(api_key: i16, correlation_id: i32, body: &[u8]) -> Vec<u8> {
        let mut payload = BytesMut::new();
        RequestHeader::new(api_key, 0, correlation_id, None)
            .write_to(&mut payload, HeaderFormat::CLASSIC)
            .unwrap();
        payload.put_slice(body);
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    #[tokio::test]
    async fn test_loop_ends_closed_on_clean_disconnect() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (handler, mut client, _rx) = handler(&notify_shutdown);
        let task = tokio::spawn(handler.run());

        client.write_all(&frame(1000, 3, b"hi")).await.unwrap();
        let mut response = [0u8; 10];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response, [0, 0, 0, 6, 0, 0, 0, 3, b'h', b'i']);

        drop(client);
        assert_eq!(task.await.unwrap(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_loop_ends_failed_on_handler_error() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (handler, mut client, _rx) = handler(&notify_shutdown);
        let task = tokio::spawn(handler.run());

        client.write_all(&frame(1001, 3, &[])).await.unwrap();
        assert_eq!(task.await.unwrap(), ConnectionState::Failed);

        // no partial response was written before the close
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_loop_ends_failed_on_short_header() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (handler, mut client, _rx) = handler(&notify_shutdown);
        let task = tokio::spawn(handler.run());

        client.write_all(&[0, 0, 0, 3, 0, 1, 0]).await.unwrap();
        assert_eq!(task.await.unwrap(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_signal_closes_idle_connection() {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (handler, _client, mut shutdown_complete_rx) = handler(&notify_shutdown);
        let task = tokio::spawn(handler.run());

        // let the handler subscribe before signalling
        tokio::task::yield_now().await;
        while notify_shutdown.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        notify_shutdown.send(()).unwrap();
        assert_eq!(task.await.unwrap(), ConnectionState::Closed);
        // the handler dropped its completion sender
        assert!(shutdown_complete_rx.recv().await.is_none());
    }
}
