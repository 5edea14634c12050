//! TCP acceptor for file transfers.
//!
//! Binds the listening socket, accepts connections, and hands each one to
//! a transfer worker running in its own task. Nothing is shared between
//! workers apart from the optional connection-limit semaphore.

use crate::config::ServerConfig;
use crate::error::{ServerError, WorkerError};
use crate::transport::Session;
use crate::worker;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept. Errors like EMFILE repeat immediately
/// until a worker releases its descriptor.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Acceptor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    Listening,
    Accepting,
    ShuttingDown,
}

/// Server instance
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    connection_limit: Option<Arc<Semaphore>>,
    state: State,
}

impl Server {
    /// Bind the listening socket.
    ///
    /// The returned server is `Listening`; its address is fixed from here on.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        debug!(state = ?State::Initializing, address = %config.listen, "Binding");

        let listener = create_listener(config.listen, config.backlog).map_err(|source| {
            if source.kind() == io::ErrorKind::AddrInUse {
                ServerError::AddrInUse(config.listen)
            } else {
                ServerError::Bind {
                    addr: config.listen,
                    source,
                }
            }
        })?;
        let listener = TcpListener::from_std(listener)?;
        let local_addr = listener.local_addr()?;

        let connection_limit = config
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));

        info!(
            address = %local_addr,
            max_connections = ?config.max_connections,
            "Server listening"
        );

        Ok(Server {
            config,
            listener,
            local_addr,
            connection_limit,
            state: State::Listening,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Accept connections until `shutdown` turns true.
    ///
    /// Each accept wait is bounded by the poll interval so the shutdown flag
    /// is rechecked promptly. Workers already running are not waited for.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        self.state = State::Accepting;
        let poll = self.config.accept_poll_interval;
        debug!(state = ?self.state(), poll = ?poll, "Accept loop started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let permit = match self.acquire_permit().await {
                Some(Ok(permit)) => Some(permit),
                Some(Err(())) => continue,
                None => None,
            };

            match timeout(poll, self.listener.accept()).await {
                Err(_elapsed) => continue,
                Ok(Ok((stream, peer))) => {
                    debug!(peer = %peer, "New connection");
                    self.dispatch(Session::accepted(stream, peer), permit);
                }
                Ok(Err(e)) => accept_error_backoff(&e).await,
            }
        }

        self.state = State::ShuttingDown;
        info!(address = %self.local_addr, state = ?self.state(), "Server shutting down");
        Ok(())
    }

    /// Wait for a connection slot.
    ///
    /// `None` when concurrency is unbounded, `Some(Err)` when no slot freed
    /// up within one poll interval.
    async fn acquire_permit(&self) -> Option<Result<OwnedSemaphorePermit, ()>> {
        let limit = self.connection_limit.as_ref()?;
        match timeout(
            self.config.accept_poll_interval,
            Arc::clone(limit).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => Some(Ok(permit)),
            Ok(Err(_closed)) => Some(Err(())),
            Err(_elapsed) => {
                warn!("Connection limit reached");
                Some(Err(()))
            }
        }
    }

    fn dispatch(&self, session: Session, permit: Option<OwnedSemaphorePermit>) {
        let chunk_size = self.config.chunk_size;

        tokio::spawn(async move {
            let peer = session.peer();
            match worker::handle_connection(session, chunk_size).await {
                Ok(outcome) => info!(
                    peer = ?peer,
                    bytes = outcome.bytes_received,
                    letters = outcome.letter_count,
                    "Transfer complete"
                ),
                Err(e @ WorkerError::Decode { .. }) => {
                    warn!(peer = ?peer, error = %e, "Dropping connection without reply")
                }
                Err(e) => debug!(peer = ?peer, error = %e, "Connection error"),
            }
            drop(permit);
        });
    }
}

/// Log a failed accept and wait before the next attempt.
async fn accept_error_backoff(e: &io::Error) {
    error!(error = %e, backoff = ?ACCEPT_ERROR_BACKOFF, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Create a listening socket.
///
/// `SO_REUSEADDR` lets a restarted server rebind past TIME_WAIT, but a port
/// with a live listener still fails with `AddrInUse`.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
