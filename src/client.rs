//! Client side of a transfer: connect, stream a source, await the reply.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::{receive_reply, send_payload, OpenError, Session};
use crate::worker::parse_reply;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use tokio::io::AsyncRead;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::{debug, info};

/// Largest reply the client will read.
pub const MAX_REPLY_SIZE: usize = 4096;

/// Client progress through a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Sending,
    AwaitingReply,
    Done,
}

pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Send the file at `path` to `target` (`host:port`) and return the reply.
    ///
    /// The file is checked before any network I/O happens.
    pub async fn send_file(&self, target: &str, path: &Path) -> Result<String, ClientError> {
        self.check_file(path).await?;

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| file_access(path, e.to_string()))?;

        self.send_source(target, &mut file).await
    }

    /// Stream everything `source` yields to `target` and return the reply.
    pub async fn send_source<R>(&self, target: &str, source: &mut R) -> Result<String, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        debug!(phase = ?Phase::Connecting, server = %target, "Connecting");
        let mut session = self.within_connect_timeout(self.connect(target)).await?;
        if let Some(peer) = session.peer() {
            info!(peer = %peer, "Connected to server");
        }

        let result = self.exchange(&mut session, source).await;
        session.close();
        result
    }

    /// Resolve `target` and open a session to the first address.
    async fn connect(&self, target: &str) -> Result<Session, ClientError> {
        let addr = self.resolve(target).await?;
        Session::open(addr, self.config.connect_timeout)
            .await
            .map_err(|e| match e {
                OpenError::Connect(source) => ClientError::Connect {
                    target: target.to_string(),
                    source,
                },
                OpenError::Timeout => ClientError::Timeout(self.config.connect_timeout, "connecting"),
            })
    }

    /// Bound name resolution and the TCP handshake together.
    async fn within_connect_timeout<F, T>(&self, connect: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let limit = self.config.connect_timeout;
        timeout(limit, connect)
            .await
            .map_err(|_| ClientError::Timeout(limit, "connecting"))?
    }

    async fn exchange<R>(&self, session: &mut Session, source: &mut R) -> Result<String, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        debug!(phase = ?Phase::Sending, "Sending payload");
        let sent = send_payload(source, session, self.config.chunk_size).await?;
        info!(bytes = sent, "Finished sending file data");

        debug!(phase = ?Phase::AwaitingReply, "Waiting for reply");
        let reply = match self.config.reply_timeout {
            Some(limit) => timeout(limit, receive_reply(session, MAX_REPLY_SIZE))
                .await
                .map_err(|_| ClientError::Timeout(limit, "awaiting reply"))??,
            None => receive_reply(session, MAX_REPLY_SIZE).await?,
        };

        if reply.is_empty() {
            return Err(ClientError::NoResponse);
        }

        let reply = String::from_utf8(reply.to_vec())?;
        match parse_reply(&reply) {
            Some(letters) => debug!(phase = ?Phase::Done, letters, "Reply received"),
            None => debug!(phase = ?Phase::Done, "Reply received in unexpected format"),
        }
        Ok(reply)
    }

    /// Reject paths that are missing, not regular files, or have an
    /// extension outside the allowed list.
    pub async fn check_file(&self, path: &Path) -> Result<(), ClientError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                file_access(path, "file does not exist".to_string())
            } else {
                file_access(path, e.to_string())
            }
        })?;

        if !metadata.is_file() {
            return Err(file_access(path, "not a regular file".to_string()));
        }

        if !self.config.allowed_extensions.is_empty() {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            let allowed = self
                .config
                .allowed_extensions
                .iter()
                .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext));
            if !allowed {
                return Err(file_access(
                    path,
                    format!(
                        "extension must be one of: {}",
                        self.config.allowed_extensions.join(", ")
                    ),
                ));
            }
        }

        Ok(())
    }

    async fn resolve(&self, target: &str) -> Result<SocketAddr, ClientError> {
        let connect_error = |source| ClientError::Connect {
            target: target.to_string(),
            source,
        };

        let mut addrs = lookup_host(target).await.map_err(connect_error)?;

        addrs.next().ok_or_else(|| {
            connect_error(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses found",
            ))
        })
    }
}

fn file_access(path: &Path, reason: String) -> ClientError {
    ClientError::FileAccess {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::Server;
    use std::io::Write;
    use std::time::{Duration, Instant};
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    async fn start_server() -> (SocketAddr, watch::Sender<bool>) {
        let mut config = ServerConfig::with_listen("127.0.0.1:0".parse().unwrap());
        config.accept_poll_interval = Duration::from_millis(50);
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr();
        let (tx, rx) = watch::channel(false);
        tokio::spawn(server.run(rx));
        (addr, tx)
    }

    #[tokio::test]
    async fn test_send_file() {
        let (addr, _shutdown) = start_server().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World! 123").unwrap();

        let client = Client::new(ClientConfig::default());
        let reply = client
            .send_file(&addr.to_string(), file.path())
            .await
            .unwrap();
        assert_eq!(reply, "Alphabetic character count: 10");
    }

    #[tokio::test]
    async fn test_send_empty_file() {
        let (addr, _shutdown) = start_server().await;
        let file = tempfile::NamedTempFile::new().unwrap();

        let client = Client::new(ClientConfig::default());
        let reply = client
            .send_file(&addr.to_string(), file.path())
            .await
            .unwrap();
        assert_eq!(reply, "Alphabetic character count: 0");
    }

    #[tokio::test]
    async fn test_large_file() {
        let (addr, _shutdown) = start_server().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let line = "lorem ipsum dolor sit amet 0123456789\n";
        for _ in 0..10_000 {
            file.write_all(line.as_bytes()).unwrap();
        }

        let client = Client::new(ClientConfig::default());
        let reply = client
            .send_file(&addr.to_string(), file.path())
            .await
            .unwrap();
        assert_eq!(reply, "Alphabetic character count: 220000");
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        // Nothing listens here; a connect attempt would fail differently.
        let client = Client::new(ClientConfig::default());
        let err = client.send_file("127.0.0.1:1", &path).await.unwrap_err();
        assert!(matches!(err, ClientError::FileAccess { .. }));
    }

    #[tokio::test]
    async fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new(ClientConfig::default());
        let err = client.check_file(dir.path()).await.unwrap_err();
        assert!(matches!(err, ClientError::FileAccess { .. }));
    }

    #[tokio::test]
    async fn test_extension_policy() {
        let client = Client::new(ClientConfig {
            allowed_extensions: vec!["txt".to_string(), ".md".to_string()],
            ..ClientConfig::default()
        });

        let txt = tempfile::Builder::new().suffix(".TXT").tempfile().unwrap();
        let md = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        let bin = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();

        assert!(client.check_file(txt.path()).await.is_ok());
        assert!(client.check_file(md.path()).await.is_ok());
        assert!(matches!(
            client.check_file(bin.path()).await,
            Err(ClientError::FileAccess { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(ClientConfig::default());
        let start = Instant::now();
        let err = client
            .send_source(&addr.to_string(), &mut &b"data"[..])
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Connect { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let client = Client::new(ClientConfig {
            connect_timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        });
        let start = tokio::time::Instant::now();

        // A handshake that never completes.
        let err = client
            .within_connect_timeout(std::future::pending::<Result<(), ClientError>>())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout(_, "connecting")));
        assert_eq!(err.exit_code(), crate::error::EXIT_TIMEOUT);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_covers_resolve_and_open() {
        let limit = Duration::from_millis(200);
        let client = Client::new(ClientConfig {
            connect_timeout: limit,
            ..ClientConfig::default()
        });
        let start = tokio::time::Instant::now();

        // Each step alone fits inside the limit; together they do not.
        let slow_connect = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, ClientError>(())
        };
        let err = client
            .within_connect_timeout(slow_connect)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout(_, "connecting")));
        assert!(start.elapsed() >= limit);
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_bad_host() {
        let client = Client::new(ClientConfig::default());
        let err = client
            .send_source("not a host", &mut &b"data"[..])
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONNECT);
    }

    #[tokio::test]
    async fn test_reply_timeout() {
        // Accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let client = Client::new(ClientConfig {
            reply_timeout: Some(Duration::from_millis(100)),
            ..ClientConfig::default()
        });
        let err = client
            .send_source(&addr.to_string(), &mut &b"data"[..])
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout(_, "awaiting reply")));
        hold.abort();
    }
}
