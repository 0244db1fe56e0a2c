//! Scripted prompt/response exchange with the VPN client
//!
//! The client's `-s` mode reads answers from stdin. Rather than dumping every
//! answer up front, each response is written only once the prompt it answers
//! has shown up on the client's stdout.

use crate::config::PromptConfig;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

const TAIL_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Timed out after {waited:?} waiting for prompt '{prompt}'")]
    Timeout { prompt: String, waited: Duration },
    #[error("Client closed its output before prompt '{prompt}' (last output: {tail:?})")]
    Eof { prompt: String, tail: String },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// One line of the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Text that must appear in the output before `send` is written.
    /// `None` sends immediately.
    pub expect: Option<String>,
    pub send: String,
    /// Keep `send` out of the logs
    pub secret: bool,
}

impl Step {
    pub fn immediate(send: impl Into<String>) -> Self {
        Self {
            expect: None,
            send: send.into(),
            secret: false,
        }
    }

    pub fn on(expect: impl Into<String>, send: impl Into<String>) -> Self {
        Self {
            expect: Some(expect.into()),
            send: send.into(),
            secret: false,
        }
    }

    pub fn on_secret(expect: impl Into<String>, send: impl Into<String>) -> Self {
        Self {
            secret: true,
            ..Self::on(expect, send)
        }
    }
}

/// Answers for a connect session
pub struct ConnectAnswers<'a> {
    pub host: &'a str,
    pub group: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub code: &'a str,
}

/// Build the connect script: host, group menu choice, credentials, VIP code,
/// then accept the banner
pub fn connect_script(answers: &ConnectAnswers<'_>, prompts: &PromptConfig) -> Vec<Step> {
    vec![
        Step::immediate(format!("connect {}", answers.host)),
        Step::on(&prompts.group, answers.group),
        Step::on(&prompts.username, answers.username),
        Step::on_secret(&prompts.password, answers.password),
        Step::on_secret(&prompts.second_password, answers.code),
        Step::on(&prompts.accept, "y"),
    ]
}

/// Drive `steps` against a reader/writer pair
///
/// Each prompt is searched for only in output that arrived after the previous
/// prompt matched, so output that already answered one step cannot answer a
/// later one. Each prompt gets `prompt_timeout` to show up. Returns everything
/// read.
pub async fn run_exchange<R, W>(
    reader: &mut R,
    writer: &mut W,
    steps: &[Step],
    prompt_timeout: Duration,
) -> Result<String, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut transcript = String::new();
    let mut search_from = 0;
    let mut chunk = [0u8; 1024];

    for step in steps {
        if let Some(prompt) = &step.expect {
            let deadline = Instant::now() + prompt_timeout;
            loop {
                if let Some(pos) = transcript[search_from..].find(prompt.as_str()) {
                    search_from += pos + prompt.len();
                    break;
                }

                let read = tokio::time::timeout_at(deadline, reader.read(&mut chunk))
                    .await
                    .map_err(|_| SessionError::Timeout {
                        prompt: prompt.clone(),
                        waited: prompt_timeout,
                    })??;

                if read == 0 {
                    return Err(SessionError::Eof {
                        prompt: prompt.clone(),
                        tail: tail(&transcript),
                    });
                }
                transcript.push_str(&String::from_utf8_lossy(&chunk[..read]));
            }
        }

        if step.secret {
            debug!("Answering {:?} with <hidden>", step.expect);
        } else {
            debug!("Answering {:?} with {:?}", step.expect, step.send);
        }
        writer.write_all(step.send.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(transcript)
}

fn tail(transcript: &str) -> String {
    let count = transcript.chars().count();
    transcript
        .chars()
        .skip(count.saturating_sub(TAIL_CHARS))
        .collect()
}
