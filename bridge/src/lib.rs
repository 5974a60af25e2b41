//! Protocol bridge between view-tree documents and the TypeScript analysis
//! engine.
//!
//! The editor integration constructs a [`BridgeSession`] and feeds it
//! document lifecycle events and feature requests; subprocess lifecycle,
//! sequence correlation, coordinate translation, and diagnostics
//! aggregation all happen behind it.

pub mod protocol;
pub mod sourcemap;

pub(crate) mod channel;
pub(crate) mod diagnostics;
pub(crate) mod server;
pub(crate) mod sync;

mod error;
mod paths;
mod session;

pub use error::BridgeError;
pub use paths::{generated_path, is_tree_document, mapping_path, workspace_root_for};
pub use session::{BridgeEvent, BridgeSession};
