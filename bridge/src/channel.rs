//! Message channel — owns the analysis-engine subprocess and its streams.
//!
//! Outgoing frames are newline-terminated JSON written to the child's
//! stdin; incoming frames are decoded line by line from its stdout and
//! surfaced as an infinite, non-restartable stream. A malformed line is
//! fatal for that line only; a broken pipe is logged and absorbed.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::BridgeError;
use crate::protocol::Request;

const WRITER_CHANNEL_CAPACITY: usize = 64;

const INCOMING_CHANNEL_CAPACITY: usize = 256;

pub(crate) enum WriterCommand {
    Send(Request),
    Shutdown,
}

#[derive(Debug)]
pub(crate) struct MessageChannel {
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    incoming_rx: Option<mpsc::Receiver<serde_json::Value>>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl MessageChannel {
    /// Spawn the engine subprocess once. Failing to locate the executable
    /// is a configuration error and fails construction; no retry.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let resolved = which::which(command).map_err(|source| BridgeError::EngineNotFound {
            command: command.to_string(),
            source,
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        // Own process group: the engine survives transient parent hiccups.
        // Shutdown kills it explicitly instead.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", resolved.display()))?;

        let stdout = child.stdout.take().context("no stdout from engine")?;
        let mut stdin = child.stdin.take().context("no stdin from engine")?;

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(request) => {
                        let mut line = match serde_json::to_string(&request) {
                            Ok(line) => line,
                            Err(e) => {
                                tracing::warn!("dropping unencodable request: {e}");
                                continue;
                            }
                        };
                        line.push('\n');
                        if let Err(e) = stdin.write_all(line.as_bytes()).await {
                            tracing::warn!("engine stdin write failed: {e}");
                            break;
                        }
                        if let Err(e) = stdin.flush().await {
                            tracing::warn!("engine stdin flush failed: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<serde_json::Value>(trimmed) {
                            Ok(value) => {
                                if incoming_tx.send(value).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("discarding undecodable engine line: {e}");
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!("analysis engine closed its output stream");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("engine read error: {e}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            writer_tx,
            incoming_rx: Some(incoming_rx),
            reader_handle,
            writer_handle,
        })
    }

    /// Sender half of the outgoing stream.
    pub fn writer(&self) -> mpsc::Sender<WriterCommand> {
        self.writer_tx.clone()
    }

    /// The incoming message stream. Single consumer; a second call yields
    /// `None`.
    pub fn take_incoming(&mut self) -> Option<mpsc::Receiver<serde_json::Value>> {
        self.incoming_rx.take()
    }

    /// Stop the writer and kill the subprocess.
    pub async fn shutdown(mut self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
        if let Err(e) = self.child.kill().await {
            tracing::debug!("engine already exited: {e}");
        }
    }
}
