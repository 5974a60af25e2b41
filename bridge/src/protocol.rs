//! Wire types for the analysis engine's line-oriented protocol.
//!
//! Requests are `{type:"request", seq, command, arguments}` objects; the
//! engine answers with `{type:"response", request_seq, success, command,
//! body?, message?}` and pushes `{type:"event", event, body}` messages.
//! Payloads are closed unions discriminated by the `command`/`event` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use treels_types::{DiagnosticKind, GeneratedPosition};

use crate::error::BridgeError;

/// The marker a successful-but-empty engine reply carries.
pub(crate) const NO_CONTENT: &str = "No content available.";

/// Every request kind the bridge sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    Open,
    Close,
    Reload,
    CompletionInfo,
    Definition,
    Implementation,
    Rename,
    Geterr,
}

impl Command {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Reload => "reload",
            Self::CompletionInfo => "completionInfo",
            Self::Definition => "definition",
            Self::Implementation => "implementation",
            Self::Rename => "rename",
            Self::Geterr => "geterr",
        }
    }
}

/// A request frame. `seq` is assigned by the correlation engine at send
/// time; the `type` tag is always `"request"`.
#[derive(Debug, Serialize)]
pub struct Request {
    pub seq: u32,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub command: Command,
    pub arguments: Arguments,
}

impl Request {
    pub(crate) fn new(seq: u32, command: Command, arguments: Arguments) -> Self {
        Self {
            seq,
            msg_type: "request",
            command,
            arguments,
        }
    }
}

/// Command-specific request payloads.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Arguments {
    Open(OpenArgs),
    File(FileArgs),
    Reload(ReloadArgs),
    Completions(CompletionsArgs),
    Location(FileLocationArgs),
    Geterr(GeterrArgs),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenArgs {
    pub file: String,
    pub file_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileArgs {
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct ReloadArgs {
    pub file: String,
    pub tmpfile: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionsArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileLocationArgs {
    pub file: String,
    pub line: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct GeterrArgs {
    pub files: Vec<String>,
    pub delay: u32,
}

/// A response frame, correlated by `request_seq`.
#[derive(Debug, Deserialize)]
pub struct Response {
    pub request_seq: u32,
    pub success: bool,
    pub command: Command,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Response {
    /// A failed response the engine uses to say "nothing here".
    #[must_use]
    pub fn is_no_content(&self) -> bool {
        !self.success && self.message.as_deref() == Some(NO_CONTENT)
    }
}

/// An event frame; `event` names the stream.
#[derive(Debug, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RequestCompletedBody {
    pub request_seq: u32,
}

/// Body of the three diagnostic push events.
#[derive(Debug, Deserialize)]
pub struct DiagnosticEventBody {
    pub file: String,
    pub diagnostics: Vec<EngineDiagnostic>,
}

/// A diagnostic as the engine reports it: generated-space, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineDiagnostic {
    pub start: EnginePosition,
    pub end: EnginePosition,
    pub text: String,
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
}

impl EngineDiagnostic {
    /// Only `error`-category diagnostics are surfaced.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.category.as_deref() == Some("error")
    }
}

/// An engine-protocol position: 1-based line, 1-based offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePosition {
    pub line: u32,
    pub offset: u32,
}

impl EnginePosition {
    #[must_use]
    pub const fn new(line: u32, offset: u32) -> Self {
        Self { line, offset }
    }

    /// Engine boundary conversion into the internal 0-based convention.
    #[must_use]
    pub const fn to_generated(self) -> GeneratedPosition {
        GeneratedPosition::new(self.line.saturating_sub(1), self.offset.saturating_sub(1))
    }

    /// An internal 0-based position in engine coordinates.
    #[must_use]
    pub const fn from_generated(pos: GeneratedPosition) -> Self {
        Self {
            line: pos.line() + 1,
            offset: pos.column() + 1,
        }
    }
}

/// Body of a `completionInfo` response.
#[derive(Debug, Deserialize)]
pub struct CompletionInfoBody {
    #[serde(default)]
    pub entries: Vec<CompletionEntry>,
}

/// One completion entry; `kind` is an open set of engine strings.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionEntry {
    pub name: String,
    pub kind: String,
}

/// One span inside a file, as `definition`/`implementation` bodies carry.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSpan {
    pub file: String,
    pub start: EnginePosition,
    pub end: EnginePosition,
}

/// Body of a `rename` response.
#[derive(Debug, Deserialize)]
pub struct RenameBody {
    #[serde(default)]
    pub locs: Vec<SpanGroup>,
}

#[derive(Debug, Deserialize)]
pub struct SpanGroup {
    pub file: String,
    pub locs: Vec<RenameSpan>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSpan {
    pub start: EnginePosition,
    pub end: EnginePosition,
    #[serde(default)]
    pub prefix_text: Option<String>,
    #[serde(default)]
    pub suffix_text: Option<String>,
}

/// Classification of one inbound frame.
#[derive(Debug)]
pub(crate) enum Incoming {
    Response(Response),
    RequestCompleted(RequestCompletedBody),
    Diagnostics(DiagnosticKind, DiagnosticEventBody),
    /// An event stream the bridge does not consume.
    OtherEvent(String),
}

/// Classify one decoded frame.
///
/// `Err` means the frame cannot be trusted — an unknown top-level `type`,
/// or a recognized type whose required shape is broken. Either way the
/// conversation is corrupt and the dispatch loop must stop.
pub(crate) fn classify(value: &Value) -> Result<Incoming, BridgeError> {
    match value.get("type").and_then(Value::as_str) {
        Some("response") => serde_json::from_value(value.clone())
            .map(Incoming::Response)
            .map_err(|source| BridgeError::MalformedFrame {
                frame: "response",
                source,
            }),
        Some("event") => {
            let event: Event = serde_json::from_value(value.clone()).map_err(|source| {
                BridgeError::MalformedFrame {
                    frame: "event",
                    source,
                }
            })?;
            classify_event(event)
        }
        other => Err(BridgeError::UnknownMessageType {
            found: other.unwrap_or("<missing>").to_string(),
        }),
    }
}

fn classify_event(event: Event) -> Result<Incoming, BridgeError> {
    let parse_body = |body: Option<Value>| body.unwrap_or(Value::Null);

    if event.event == "requestCompleted" {
        return serde_json::from_value(parse_body(event.body))
            .map(Incoming::RequestCompleted)
            .map_err(|source| BridgeError::MalformedFrame {
                frame: "requestCompleted",
                source,
            });
    }

    if let Some(kind) = DiagnosticKind::from_event_name(&event.event) {
        return serde_json::from_value(parse_body(event.body))
            .map(|body| Incoming::Diagnostics(kind, body))
            .map_err(|source| BridgeError::MalformedFrame {
                frame: "diagnostics",
                source,
            });
    }

    Ok(Incoming::OtherEvent(event.event))
}
