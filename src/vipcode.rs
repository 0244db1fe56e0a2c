//! VIP code generation
//!
//! The shared secret lives in a small text file (the one `vipaccess
//! provision` writes):
//!
//! ```text
//! version 1
//! secret JBSWY3DPEHPK3PXP
//! id SYMC12345678
//! expiry 2027-01-01T00:00:00.000Z
//! ```
//!
//! The secret is pulled from a fixed line/field and handed to an external
//! TOTP tool, whose output is the code.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum VipCodeError {
    #[error("Failed to read secret file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Secret file has no field {field} on line {line}")]
    MissingField { line: usize, field: usize },
    #[error("Failed to run TOTP tool {tool}: {source}")]
    SpawnError {
        tool: PathBuf,
        source: std::io::Error,
    },
    #[error("TOTP tool exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },
    #[error("TOTP tool produced no output")]
    EmptyOutput,
}

/// Pull the 1-based `field` from the 1-based `line` of `content`
pub fn extract_secret(content: &str, line: usize, field: usize) -> Result<&str, VipCodeError> {
    line.checked_sub(1)
        .and_then(|l| content.lines().nth(l))
        .and_then(|text| field.checked_sub(1).and_then(|f| text.split_whitespace().nth(f)))
        .ok_or(VipCodeError::MissingField { line, field })
}

/// Read the secret out of the secret file
pub fn read_secret(path: &Path, line: usize, field: usize) -> Result<String, VipCodeError> {
    let content = std::fs::read_to_string(path).map_err(|source| VipCodeError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    extract_secret(&content, line, field).map(str::to_string)
}

/// Turns a shared secret into a one-time code
#[allow(async_fn_in_trait)]
pub trait TotpGenerator {
    async fn generate(&self, secret: &str) -> Result<String, VipCodeError>;
}

/// Shells out to `oathtool` (or anything with the same calling convention)
pub struct OathTool {
    tool: PathBuf,
    args: Vec<String>,
}

impl OathTool {
    pub fn new(tool: PathBuf, args: Vec<String>) -> Self {
        Self { tool, args }
    }
}

impl TotpGenerator for OathTool {
    async fn generate(&self, secret: &str) -> Result<String, VipCodeError> {
        debug!("Running {} {:?} <secret>", self.tool.display(), self.args);

        let output = Command::new(&self.tool)
            .args(&self.args)
            .arg(secret)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| VipCodeError::SpawnError {
                tool: self.tool.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VipCodeError::ToolFailed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let code = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if code.is_empty() {
            return Err(VipCodeError::EmptyOutput);
        }
        Ok(code)
    }
}
