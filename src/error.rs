//! Error types for alpha-count.
//!
//! Per-connection failures (`WorkerError`) stay inside the worker task.
//! Client and server errors travel up to `main`, which is the only place
//! that turns an error into a process exit status.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit status for a successful run.
pub const EXIT_OK: u8 = 0;
/// Invalid configuration or arguments.
pub const EXIT_CONFIG: u8 = 1;
/// Could not connect to the server.
pub const EXIT_CONNECT: u8 = 2;
/// An operation exceeded its time bound.
pub const EXIT_TIMEOUT: u8 = 3;
/// The input file is missing, unreadable or rejected.
pub const EXIT_FILE_ACCESS: u8 = 4;
/// The reply could not be decoded, or the server sent none.
pub const EXIT_DECODE: u8 = 5;
/// The listening endpoint could not be bound.
pub const EXIT_BIND: u8 = 6;
/// A socket failed mid-transfer.
pub const EXIT_IO: u8 = 7;
/// Operator interrupt.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid port number: {0}. Port must be between 1024 and 65535")]
    InvalidPort(u16),

    #[error("Invalid address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    /// Bad arguments, or a `--help`/`--version` request.
    #[error(transparent)]
    Cli(#[from] clap::Error),
}

impl ConfigError {
    /// Process exit status for this error. Help and version output count
    /// as success.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConfigError::Cli(e)
                if matches!(
                    e.kind(),
                    clap::error::ErrorKind::DisplayHelp
                        | clap::error::ErrorKind::DisplayVersion
                ) =>
            {
                EXIT_OK
            }
            _ => EXIT_CONFIG,
        }
    }
}

/// Errors that end a single transfer on the server.
///
/// None of these reach the acceptor; the dispatcher logs and drops them.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Payload is not valid UTF-8. `valid_up_to` is the byte offset of
    /// the first invalid sequence.
    #[error("payload is not valid UTF-8 (valid up to byte {valid_up_to} of {len})")]
    Decode { valid_up_to: usize, len: usize },
}

/// Errors surfaced by the client run.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {0:?} while {1}")]
    Timeout(Duration, &'static str),

    #[error("Cannot use file '{}': {reason}", .path.display())]
    FileAccess { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Server closed the connection without a response")]
    NoResponse,

    #[error("Server response is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("Interrupted")]
    Interrupted,
}

impl ClientError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ClientError::Connect { .. } => EXIT_CONNECT,
            ClientError::Timeout(..) => EXIT_TIMEOUT,
            ClientError::FileAccess { .. } => EXIT_FILE_ACCESS,
            ClientError::Io(_) => EXIT_IO,
            ClientError::NoResponse | ClientError::Decode(_) => EXIT_DECODE,
            ClientError::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

/// Errors surfaced by the server run.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Port {} is already in use. Use a different port or stop the running server", .0.port())]
    AddrInUse(SocketAddr),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ServerError::AddrInUse(_) | ServerError::Bind { .. } => EXIT_BIND,
            ServerError::Io(_) => EXIT_IO,
        }
    }
}
