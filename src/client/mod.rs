//! External VPN client integration
//!
//! The wrapper never speaks a VPN protocol itself. Everything goes through the
//! vendor's command-line client:
//!
//! - `vpn status` reports the connection state as text
//! - `vpn disconnect` tears the tunnel down
//! - `vpn -s` reads a connect script from stdin
//!
//! [`VpnClient`] is the seam between the dispatcher and that binary, so the
//! dispatcher can be exercised without a real client installed.

pub mod anyconnect;
pub mod session;

pub use anyconnect::AnyConnect;
pub use session::{ConnectAnswers, SessionError, Step, connect_script, run_exchange};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to run VPN client {path}: {source}")]
    SpawnError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Connect session failed: {0}")]
    SessionError(#[from] SessionError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Whether the tunnel is up, as far as the client's status output says
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Anything other than `marker` appearing in the output counts as down
    pub fn from_status(output: &str, marker: &str) -> Self {
        if !marker.is_empty() && output.contains(marker) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Operations the dispatcher needs from the external client
#[allow(async_fn_in_trait)]
pub trait VpnClient {
    /// Raw `status` output
    async fn status(&self) -> Result<String, ClientError>;

    async fn disconnect(&self) -> Result<(), ClientError>;

    /// Start a scripted session and feed it `steps`
    async fn connect(&self, steps: &[Step]) -> Result<(), ClientError>;
}
