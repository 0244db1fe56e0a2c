//! Cisco AnyConnect `vpn` command-line client

use super::session::{Step, run_exchange};
use super::{ClientError, VpnClient};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct AnyConnect {
    path: PathBuf,
    prompt_timeout: Duration,
}

impl AnyConnect {
    pub fn new(path: PathBuf, prompt_timeout: Duration) -> Self {
        Self {
            path,
            prompt_timeout,
        }
    }

    fn spawn_error(&self, source: std::io::Error) -> ClientError {
        ClientError::SpawnError {
            path: self.path.clone(),
            source,
        }
    }

    async fn run(&self, arg: &str) -> Result<String, ClientError> {
        let output = Command::new(&self.path)
            .arg(arg)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            debug!("{} {} exited with {}", self.path.display(), arg, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl VpnClient for AnyConnect {
    async fn status(&self) -> Result<String, ClientError> {
        self.run("status").await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let output = self.run("disconnect").await?;
        debug!("disconnect output: {}", output.trim());
        Ok(())
    }

    async fn connect(&self, steps: &[Step]) -> Result<(), ClientError> {
        let mut child = Command::new(&self.path)
            .arg("-s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take())
        else {
            return Err(ClientError::IoError(std::io::Error::other(
                "client stdio was not captured",
            )));
        };

        if let Err(e) = run_exchange(&mut stdout, &mut stdin, steps, self.prompt_timeout).await {
            warn!("Connect script aborted, stopping client");
            let _ = child.kill().await;
            return Err(e.into());
        }

        // Closing stdin lets the client finish the script and exit
        drop(stdin);
        tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await?;

        let status = child.wait().await?;
        debug!("{} -s exited with {}", self.path.display(), status);
        Ok(())
    }
}
