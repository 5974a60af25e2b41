//! Typed error taxonomy for the bridge.
//!
//! Transport-level problems (broken pipe, malformed line) are absorbed and
//! logged at the channel; translation misses are `None` results. Everything
//! that actually reaches a caller is one of these.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The analysis engine executable could not be located. Raised at
    /// construction, no retry — a configuration error, not a transient one.
    #[error("analysis engine `{command}` not found")]
    EngineNotFound {
        command: String,
        #[source]
        source: which::Error,
    },

    /// The engine conversation is gone: the subprocess exited, its output
    /// stream closed, or the connection was abandoned after a protocol
    /// violation.
    #[error("analysis engine connection closed")]
    ConnectionClosed,

    /// The engine answered `success:false` with something other than the
    /// recognized "no content" marker.
    #[error("engine request `{command}` failed: {message}")]
    RequestFailed { command: String, message: String },

    /// An inbound message carried an unknown top-level `type`. The
    /// conversation state can no longer be trusted.
    #[error("unknown message type `{found}` from the analysis engine")]
    UnknownMessageType { found: String },

    /// A frame of a recognized type did not match its required shape.
    #[error("malformed {frame} frame from the analysis engine")]
    MalformedFrame {
        frame: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A response body did not match the shape its command promises.
    #[error("malformed `{command}` response body")]
    MalformedBody {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
