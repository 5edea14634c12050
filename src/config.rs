//! Configuration module for alpha-count.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::ConfigError;
use crate::transport::DEFAULT_CHUNK_SIZE;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Lowest port a server may listen on.
pub const MIN_SERVER_PORT: u16 = 1024;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "alpha-count")]
#[command(author = "alpha-count authors")]
#[command(version = "0.1.0")]
#[command(about = "Send a file over TCP and count its alphabetic characters", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept files and reply with their alphabetic character count
    Serve(ServeArgs),
    /// Send a file to a server and print its reply
    Send(SendArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port number to listen on (1024-65535)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Maximum concurrent connections (0 = unbounded)
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server IP address or hostname
    #[arg(long)]
    pub ip: String,

    /// Server port number
    #[arg(short, long)]
    pub port: u16,

    /// Path to the file to send
    #[arg(short, long)]
    pub file: PathBuf,

    /// Connect timeout in seconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub transfer: TransferSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Concurrent connection cap (0 = unbounded)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long a single accept wait may block before shutdown is rechecked
    #[serde(default = "default_accept_poll_interval_ms")]
    pub accept_poll_interval_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            max_connections: default_max_connections(),
            accept_poll_interval_ms: default_accept_poll_interval_ms(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 0 waits for the reply indefinitely
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
    /// Accepted file extensions; empty accepts any file
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            reply_timeout_secs: default_reply_timeout_secs(),
            allowed_extensions: Vec::new(),
        }
    }
}

/// Settings shared by both directions of a transfer
#[derive(Debug, Deserialize)]
pub struct TransferSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5050
}

fn default_backlog() -> i32 {
    128
}

fn default_max_connections() -> usize {
    512
}

fn default_accept_poll_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_reply_timeout_secs() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub backlog: i32,
    /// `None` leaves concurrency unbounded
    pub max_connections: Option<usize>,
    pub accept_poll_interval: Duration,
    pub chunk_size: usize,
}

#[cfg(test)]
impl ServerConfig {
    /// Settings for `listen` with every other value at its default.
    pub fn with_listen(listen: SocketAddr) -> Self {
        Self {
            listen,
            backlog: default_backlog(),
            max_connections: Some(default_max_connections()),
            accept_poll_interval: Duration::from_millis(default_accept_poll_interval_ms()),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Resolved client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// `None` waits indefinitely
    pub reply_timeout: Option<Duration>,
    pub allowed_extensions: Vec<String>,
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(default_connect_timeout_secs()),
            reply_timeout: Some(Duration::from_secs(default_reply_timeout_secs())),
            allowed_extensions: Vec::new(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// What the process was asked to do
#[derive(Debug, Clone)]
pub enum Mode {
    Serve(ServerConfig),
    Send {
        /// `host:port` of the server
        target: String,
        file: PathBuf,
        client: ClientConfig,
    },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::args_os())
    }

    /// Same as `load`, reading arguments from `args` instead of the process.
    ///
    /// Parse failures (and `--help`/`--version`) come back as
    /// `ConfigError::Cli` rather than exiting the process.
    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = CliArgs::try_parse_from(args)?;

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let chunk_size = toml_config.transfer.chunk_size;
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        let mode = match cli.command {
            Command::Serve(args) => {
                let server = toml_config.server;
                let port = args.port.unwrap_or(server.port);
                if port < MIN_SERVER_PORT {
                    return Err(ConfigError::InvalidPort(port));
                }

                let host = args.host.unwrap_or(server.host);
                let ip: IpAddr = host
                    .parse()
                    .map_err(|source| ConfigError::InvalidAddress { addr: host, source })?;
                let listen = SocketAddr::new(ip, port);

                let max_connections = args.max_connections.unwrap_or(server.max_connections);

                Mode::Serve(ServerConfig {
                    listen,
                    backlog: server.backlog,
                    max_connections: (max_connections > 0).then_some(max_connections),
                    accept_poll_interval: Duration::from_millis(server.accept_poll_interval_ms),
                    chunk_size,
                })
            }
            Command::Send(args) => {
                let client = toml_config.client;
                let connect_timeout = args.connect_timeout.unwrap_or(client.connect_timeout_secs);
                let target = if args.ip.contains(':') && !args.ip.starts_with('[') {
                    format!("[{}]:{}", args.ip, args.port)
                } else {
                    format!("{}:{}", args.ip, args.port)
                };

                Mode::Send {
                    target,
                    file: args.file,
                    client: ClientConfig {
                        connect_timeout: Duration::from_secs(connect_timeout),
                        reply_timeout: (client.reply_timeout_secs > 0)
                            .then(|| Duration::from_secs(client.reply_timeout_secs)),
                        allowed_extensions: client.allowed_extensions,
                        chunk_size,
                    },
                }
            }
        };

        Ok(Config {
            mode,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}
