//! Transport layer shared by the client and the server.
//!
//! - `Session`: one TCP connection with send, receive, half-close and close
//! - `framer`: payload boundaries signalled by half-close, no length prefix

pub mod framer;
mod session;

pub use framer::{receive_payload, receive_reply, send_payload, DEFAULT_CHUNK_SIZE};
pub use session::{OpenError, Session};
