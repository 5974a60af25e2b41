//! Correlation engine — sequence assignment, pending continuations, and
//! the dispatch loop that resolves them.
//!
//! Sequence numbers are assigned at the moment of send, and the assignment
//! plus the write enqueue happen under one lock: no two requests can
//! interleave that step. Each pending continuation resolves exactly once —
//! a matching response and a matching `requestCompleted` event race, the
//! first wins and the loser is dropped without error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use treels_types::DiagnosticKind;

use crate::channel::WriterCommand;
use crate::error::BridgeError;
use crate::protocol::{
    self, Arguments, Command, CompletionEntry, CompletionInfoBody, CompletionsArgs, FileArgs,
    FileLocationArgs, FileSpan, GeterrArgs, Incoming, OpenArgs, ReloadArgs, RenameBody, Request,
};

const PUSH_CHANNEL_CAPACITY: usize = 256;

/// How a pending request resolves: an optional response body, or a typed
/// failure.
type Reply = Result<Option<serde_json::Value>, BridgeError>;

type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Reply>>>>;

/// Diagnostics pushed by the engine, routed to the aggregator.
#[derive(Debug)]
pub(crate) struct DiagnosticsPush {
    pub kind: DiagnosticKind,
    pub file: PathBuf,
    pub diagnostics: Vec<protocol::EngineDiagnostic>,
}

/// Which symbol-location request to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocationKind {
    Definition,
    Implementation,
}

impl LocationKind {
    const fn command(self) -> Command {
        match self {
            Self::Definition => Command::Definition,
            Self::Implementation => Command::Implementation,
        }
    }
}

struct EngineShared {
    /// Next sequence number; the lock also covers the write enqueue.
    send: Mutex<u32>,
    pending: PendingMap,
    writer_tx: mpsc::Sender<WriterCommand>,
}

/// Handle to the correlation engine. Cheap to clone; all state lives in the
/// shared core, owned by this handle — nothing ambient.
#[derive(Clone)]
pub(crate) struct EngineHandle {
    shared: Arc<EngineShared>,
}

impl EngineHandle {
    /// Wire a handle to a channel's streams. Returns the handle, the stream
    /// of pushed diagnostics, and the dispatch task driving resolution.
    pub fn start(
        writer_tx: mpsc::Sender<WriterCommand>,
        mut incoming: mpsc::Receiver<serde_json::Value>,
    ) -> (Self, mpsc::Receiver<DiagnosticsPush>, JoinHandle<()>) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (push_tx, push_rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);

        let dispatch_pending = pending.clone();
        let dispatch_handle = tokio::spawn(async move {
            while let Some(value) = incoming.recv().await {
                if let Err(e) = Self::dispatch(&value, &dispatch_pending, &push_tx).await {
                    tracing::error!("fatal protocol violation: {e}");
                    break;
                }
            }
            // The conversation is over (engine EOF or protocol violation):
            // fail the waiters instead of leaving them pending forever.
            let mut pending = dispatch_pending.lock().await;
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(BridgeError::ConnectionClosed));
            }
        });

        let handle = Self {
            shared: Arc::new(EngineShared {
                send: Mutex::new(1),
                pending,
                writer_tx,
            }),
        };
        (handle, push_rx, dispatch_handle)
    }

    /// Route one inbound frame. `Err` is a protocol violation and stops the
    /// dispatch loop.
    async fn dispatch(
        value: &serde_json::Value,
        pending: &Mutex<HashMap<u32, oneshot::Sender<Reply>>>,
        push_tx: &mpsc::Sender<DiagnosticsPush>,
    ) -> Result<(), BridgeError> {
        match protocol::classify(value)? {
            Incoming::Response(response) => {
                let sender = pending.lock().await.remove(&response.request_seq);
                let Some(tx) = sender else {
                    // Already resolved by a completion event, or unsolicited.
                    tracing::trace!(seq = response.request_seq, "dropping uncorrelated response");
                    return Ok(());
                };
                let reply = if response.success {
                    Ok(response.body)
                } else if response.is_no_content() {
                    Ok(None)
                } else {
                    Err(BridgeError::RequestFailed {
                        command: response.command.as_str().to_string(),
                        message: response
                            .message
                            .unwrap_or_else(|| "unspecified failure".to_string()),
                    })
                };
                let _ = tx.send(reply);
                Ok(())
            }
            Incoming::RequestCompleted(body) => {
                let sender = pending.lock().await.remove(&body.request_seq);
                if let Some(tx) = sender {
                    let _ = tx.send(Ok(None));
                }
                Ok(())
            }
            Incoming::Diagnostics(kind, body) => {
                let push = DiagnosticsPush {
                    kind,
                    file: PathBuf::from(body.file),
                    diagnostics: body.diagnostics,
                };
                if push_tx.send(push).await.is_err() {
                    tracing::trace!("diagnostics consumer gone; dropping push event");
                }
                Ok(())
            }
            Incoming::OtherEvent(name) => {
                tracing::trace!(event = %name, "ignoring engine event");
                Ok(())
            }
        }
    }

    /// Assign the next sequence and enqueue the frame. One step under the
    /// send lock, so sequences are unique and strictly increasing.
    async fn send_request(
        &self,
        command: Command,
        arguments: Arguments,
        reply: Option<oneshot::Sender<Reply>>,
    ) -> Result<u32, BridgeError> {
        let mut next_seq = self.shared.send.lock().await;
        let seq = *next_seq;
        *next_seq += 1;
        if let Some(tx) = reply {
            self.shared.pending.lock().await.insert(seq, tx);
        }
        let request = Request::new(seq, command, arguments);
        if self
            .shared
            .writer_tx
            .send(WriterCommand::Send(request))
            .await
            .is_err()
        {
            // Don't leak the pending entry when the enqueue fails.
            self.shared.pending.lock().await.remove(&seq);
            return Err(BridgeError::ConnectionClosed);
        }
        Ok(seq)
    }

    async fn await_reply(&self, rx: oneshot::Receiver<Reply>) -> Reply {
        match rx.await {
            Ok(reply) => reply,
            // Dispatch task gone before resolving us.
            Err(_) => Err(BridgeError::ConnectionClosed),
        }
    }

    /// Fire-and-forget: no response expected, the caller never blocks.
    pub async fn open(&self, path: &Path, content: String, project_root: Option<&Path>) {
        let args = Arguments::Open(OpenArgs {
            file: path.display().to_string(),
            file_content: content,
            project_root_path: project_root.map(|p| p.display().to_string()),
        });
        if let Err(e) = self.send_request(Command::Open, args, None).await {
            tracing::warn!("open request dropped: {e}");
        }
    }

    /// Fire-and-forget.
    pub async fn close(&self, path: &Path) {
        let args = Arguments::File(FileArgs {
            file: path.display().to_string(),
        });
        if let Err(e) = self.send_request(Command::Close, args, None).await {
            tracing::warn!("close request dropped: {e}");
        }
    }

    /// Force-refresh the engine's view of a file; awaits the engine's reply.
    pub async fn reload(&self, path: &Path) -> Result<(), BridgeError> {
        let file = path.display().to_string();
        let args = Arguments::Reload(ReloadArgs {
            file: file.clone(),
            tmpfile: file,
        });
        let (tx, rx) = oneshot::channel();
        self.send_request(Command::Reload, args, Some(tx)).await?;
        self.await_reply(rx).await.map(|_| ())
    }

    /// Reload, then fire an error-check. The diagnostics themselves arrive
    /// later as push events, never as this call's result.
    pub async fn run_diagnostics(&self, path: &Path) -> Result<(), BridgeError> {
        self.reload(path).await?;
        let args = Arguments::Geterr(GeterrArgs {
            files: vec![path.display().to_string()],
            delay: 0,
        });
        self.send_request(Command::Geterr, args, None).await?;
        Ok(())
    }

    pub async fn completions(
        &self,
        args: CompletionsArgs,
    ) -> Result<Vec<CompletionEntry>, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send_request(Command::CompletionInfo, Arguments::Completions(args), Some(tx))
            .await?;
        match self.await_reply(rx).await? {
            Some(body) => {
                let body: CompletionInfoBody =
                    serde_json::from_value(body).map_err(|source| BridgeError::MalformedBody {
                        command: Command::CompletionInfo.as_str(),
                        source,
                    })?;
                Ok(body.entries)
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn definition_or_implementation(
        &self,
        kind: LocationKind,
        args: FileLocationArgs,
    ) -> Result<Vec<FileSpan>, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send_request(kind.command(), Arguments::Location(args), Some(tx))
            .await?;
        match self.await_reply(rx).await? {
            Some(body) => {
                serde_json::from_value(body).map_err(|source| BridgeError::MalformedBody {
                    command: kind.command().as_str(),
                    source,
                })
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn rename(
        &self,
        path: &Path,
        line: u32,
        offset: u32,
    ) -> Result<Option<RenameBody>, BridgeError> {
        let args = Arguments::Location(FileLocationArgs {
            file: path.display().to_string(),
            line,
            offset,
        });
        let (tx, rx) = oneshot::channel();
        self.send_request(Command::Rename, args, Some(tx)).await?;
        match self.await_reply(rx).await? {
            Some(body) => serde_json::from_value(body).map(Some).map_err(|source| {
                BridgeError::MalformedBody {
                    command: Command::Rename.as_str(),
                    source,
                }
            }),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.shared.pending.lock().await.len()
    }
}
