//! Transfer worker: handles one accepted connection from start to finish.
//!
//! The whole payload is buffered before decoding. A streaming decode would
//! have to carry split multi-byte sequences across chunk boundaries.

use crate::error::WorkerError;
use crate::transport::{receive_payload, Session};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// Prefix of every reply sent by the server.
pub const REPLY_PREFIX: &str = "Alphabetic character count: ";

/// What a completed transfer produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub bytes_received: usize,
    pub letter_count: usize,
}

/// Count characters with the Unicode `Alphabetic` property.
pub fn count_alphabetic(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphabetic()).count()
}

/// Format the reply for a letter count.
pub fn format_reply(letter_count: usize) -> String {
    format!("{REPLY_PREFIX}{letter_count}")
}

/// Extract the count from a reply string.
pub fn parse_reply(reply: &str) -> Option<usize> {
    reply.strip_prefix(REPLY_PREFIX)?.trim_end().parse().ok()
}

/// Drain the payload, reply with its letter count, and close.
///
/// The session is closed on every path. A payload that is not UTF-8 gets
/// no reply at all.
pub async fn handle_connection<S>(
    mut session: Session<S>,
    chunk_size: usize,
) -> Result<Outcome, WorkerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = transfer(&mut session, chunk_size).await;
    session.close();
    result
}

async fn transfer<S>(session: &mut Session<S>, chunk_size: usize) -> Result<Outcome, WorkerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = receive_payload(session, chunk_size).await?;
    debug!(bytes = payload.len(), "Payload received");

    let text = std::str::from_utf8(&payload).map_err(|e| WorkerError::Decode {
        valid_up_to: e.valid_up_to(),
        len: payload.len(),
    })?;

    let letter_count = count_alphabetic(text);
    trace!(letter_count, "Counted alphabetic characters");

    let reply = format_reply(letter_count);
    session.send(reply.as_bytes()).await?;

    Ok(Outcome {
        bytes_received: payload.len(),
        letter_count,
    })
}
