//! Dependency checks run before any external process is spawned

use crate::config::Config;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// One missing prerequisite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Client(PathBuf),
    TotpTool(String),
    SecretFile(PathBuf),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Client(path) => write!(f, "VPN client not found at {}", path.display()),
            Missing::TotpTool(tool) => write!(f, "TOTP tool '{}' not found", tool),
            Missing::SecretFile(path) => {
                write!(f, "secret file not found at {}", path.display())
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum DepsError {
    #[error("missing dependencies: {}", join(.0))]
    Missing(Vec<Missing>),
}

fn join(missing: &[Missing]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Verify client, TOTP tool and secret file all exist
///
/// Every missing item is reported, not just the first.
pub fn check(config: &Config) -> Result<(), DepsError> {
    let mut missing = Vec::new();

    if !config.client_path.is_file() {
        missing.push(Missing::Client(config.client_path.clone()));
    }

    let totp_tool = resolve_tool(&config.totp_tool);
    if totp_tool.is_none() {
        missing.push(Missing::TotpTool(config.totp_tool.clone()));
    }

    if !config.secret_file.is_file() {
        missing.push(Missing::SecretFile(config.secret_file.clone()));
    }

    if !missing.is_empty() {
        return Err(DepsError::Missing(missing));
    }

    if let Some(totp_tool) = totp_tool {
        debug!(
            "Dependencies ok: client={}, totp={}",
            config.client_path.display(),
            totp_tool.display()
        );
    }
    Ok(())
}

/// Paths are taken as-is, bare names go through PATH
fn resolve_tool(tool: &str) -> Option<PathBuf> {
    let path = Path::new(tool);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    which::which(tool).ok()
}
