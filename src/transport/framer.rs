//! Stream framing for a single payload.
//!
//! The payload carries no length prefix. The sender writes chunks and then
//! half-closes; the receiver reads until a zero-length read. This only works
//! because a connection carries exactly one payload followed by exactly one
//! reply, so any extension to multiple payloads per connection needs a new
//! wire format.

use super::session::Session;
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::trace;

/// Default chunk size for both directions.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Send everything `source` yields, then half-close the session.
///
/// Returns the total number of payload bytes sent. An empty source sends
/// no chunks and half-closes immediately.
pub async fn send_payload<R, S>(
    source: &mut R,
    session: &mut Session<S>,
    chunk_size: usize,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; chunk_size];
    let mut total = 0u64;

    loop {
        let n = source.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        session.send(&chunk[..n]).await?;
        total += n as u64;
        trace!(bytes = n, total, "Sent chunk");
    }

    session.half_close().await?;
    trace!(total, "Payload sent, half-closed");
    Ok(total)
}

/// Accumulate chunks until the peer signals end-of-payload.
pub async fn receive_payload<S>(session: &mut Session<S>, chunk_size: usize) -> io::Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut payload = BytesMut::with_capacity(chunk_size);

    loop {
        let n = session.receive_chunk(&mut payload, chunk_size).await?;
        if n == 0 {
            break;
        }
        trace!(bytes = n, total = payload.len(), "Received chunk");
    }

    Ok(payload)
}

/// Read a reply of at most `max` bytes.
///
/// Stops at end-of-stream or once `max` bytes have arrived. An empty
/// result means the peer closed without replying.
pub async fn receive_reply<S>(session: &mut Session<S>, max: usize) -> io::Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reply = BytesMut::with_capacity(max);

    while reply.len() < max {
        let remaining = max - reply.len();
        let n = session.receive_chunk(&mut reply, remaining).await?;
        if n == 0 {
            break;
        }
    }

    Ok(reply)
}
