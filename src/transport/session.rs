//! Transport session: one bidirectional byte stream.
//!
//! A `Session` owns its stream until `close` is called or the session is
//! dropped. After `close`, every operation fails with
//! `ErrorKind::NotConnected` and further `close` calls do nothing.

use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

/// Why `Session::open` failed.
#[derive(Debug)]
pub enum OpenError {
    /// Refused, unreachable, or any other connect failure.
    Connect(io::Error),
    /// The connect did not finish within the bound.
    Timeout,
}

/// A single connection carrying one payload and one reply.
#[derive(Debug)]
pub struct Session<S = TcpStream> {
    stream: Option<S>,
    peer: Option<SocketAddr>,
}

impl Session<TcpStream> {
    /// Connect to `addr`, giving up after `connect_timeout`.
    pub async fn open(addr: SocketAddr, connect_timeout: Duration) -> Result<Self, OpenError> {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                // Payload chunks are already sized; don't wait to coalesce.
                stream.set_nodelay(true).map_err(OpenError::Connect)?;
                trace!(peer = %addr, "Session opened");
                Ok(Self {
                    stream: Some(stream),
                    peer: Some(addr),
                })
            }
            Ok(Err(e)) => Err(OpenError::Connect(e)),
            Err(_) => Err(OpenError::Timeout),
        }
    }

    /// Wrap a stream produced by `accept`.
    pub fn accepted(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            peer: Some(peer),
            ..Self::from_stream(stream)
        }
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an arbitrary byte stream with no known peer address.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream: Some(stream),
            peer: None,
        }
    }

    /// Remote address, when the stream has one.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Write all of `data`, returning the number of bytes written.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream_mut()?.write_all(data).await?;
        Ok(data.len())
    }

    /// Read at most `max` bytes, appending them to `buf`.
    ///
    /// Returns 0 exactly when the peer will deliver nothing more.
    pub async fn receive_chunk(&mut self, buf: &mut BytesMut, max: usize) -> io::Result<usize> {
        let stream = self.stream_mut()?;
        buf.reserve(max);
        let n = (&mut *stream).take(max as u64).read_buf(buf).await?;
        Ok(n)
    }

    /// Signal that no more data will be sent. Receiving still works.
    pub async fn half_close(&mut self) -> io::Result<()> {
        self.stream_mut()?.shutdown().await
    }

    /// Release the stream. Safe to call more than once.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.stream = None;
        match self.peer {
            Some(peer) => trace!(peer = %peer, "Session closed"),
            None => trace!("Session closed"),
        }
    }

    fn stream_mut(&mut self) -> io::Result<&mut S> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "session is closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_half_close_keeps_receive_open() {
        let (local, remote) = tokio::io::duplex(64);
        let mut client = Session::from_stream(local);
        let mut server = Session::from_stream(remote);

        client.send(b"ping").await.unwrap();
        client.half_close().await.unwrap();

        let mut buf = BytesMut::new();
        assert_eq!(server.receive_chunk(&mut buf, 64).await.unwrap(), 4);
        assert_eq!(server.receive_chunk(&mut buf, 64).await.unwrap(), 0);
        assert_eq!(&buf[..], b"ping");

        server.send(b"pong").await.unwrap();
        let mut reply = BytesMut::new();
        assert_eq!(client.receive_chunk(&mut reply, 64).await.unwrap(), 4);
        assert_eq!(&reply[..], b"pong");
    }

    #[tokio::test]
    async fn test_receive_chunk_respects_max() {
        let (local, remote) = tokio::io::duplex(64);
        let mut client = Session::from_stream(local);
        let mut server = Session::from_stream(remote);

        client.send(b"abcdef").await.unwrap();

        let mut buf = BytesMut::new();
        assert_eq!(server.receive_chunk(&mut buf, 2).await.unwrap(), 2);
        assert_eq!(&buf[..], b"ab");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (local, _remote) = tokio::io::duplex(64);
        let mut session = Session::from_stream(local);

        session.close();
        session.close();
        assert!(session.is_closed());

        let err = session.send(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_close_delivers_eof_to_peer() {
        let (local, remote) = tokio::io::duplex(64);
        let mut client = Session::from_stream(local);
        let mut server = Session::from_stream(remote);

        client.close();

        let mut buf = BytesMut::new();
        assert_eq!(server.receive_chunk(&mut buf, 64).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        match Session::open(addr, Duration::from_secs(5)).await {
            Err(OpenError::Connect(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_records_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let session = Session::open(addr, Duration::from_secs(5)).await.unwrap();
        assert_eq!(session.peer(), Some(addr));
    }
}
