use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command line and environment configuration of the server binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "inksync-server", about = "Realtime collaborative canvas server")]
pub struct Config {
    /// Address the HTTP and WebSocket listener binds to
    #[arg(long, env = "INKSYNC_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Directory holding one file per persisted session
    #[arg(long, env = "INKSYNC_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Delay between the last disconnect of a session and its deletion
    #[arg(long, env = "INKSYNC_GRACE_PERIOD_MS", default_value_t = 3000)]
    pub grace_period_ms: u64,

    /// Interval of the WebSocket liveness pings
    #[arg(
        long,
        env = "INKSYNC_HEARTBEAT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub heartbeat_secs: u64,

    #[arg(
        long,
        env = "INKSYNC_CANVAS_WIDTH",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub canvas_width: u16,

    #[arg(
        long,
        env = "INKSYNC_CANVAS_HEIGHT",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub canvas_height: u16,
}

impl Config {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            grace_period: Duration::from_millis(self.grace_period_ms),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
        }
    }

    pub fn canvas_config(&self) -> CanvasConfig {
        CanvasConfig {
            width: self.canvas_width as usize,
            height: self.canvas_height as usize,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub heartbeat_interval: Duration,
}

/// Size of the background created for new sessions.
#[derive(Debug, Clone, Copy)]
pub struct CanvasConfig {
    pub width: usize,
    pub height: usize,
}
