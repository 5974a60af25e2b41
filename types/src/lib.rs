//! Core domain types for treels.
//!
//! This crate contains pure domain types with no IO and no async. The bridge
//! crate builds on these; the editor integration consumes them. Positions
//! carry their coordinate space in the type ([`OriginalPosition`] vs
//! [`GeneratedPosition`]) and only cross spaces through the bridge's
//! translator; the space-erased [`Position`]/[`Range`] pair appears only in
//! collaborator-facing results.

mod words;
pub use words::{word_len_at, word_span};

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Positions & Ranges
// ============================================================================

/// An editor-facing position: 0-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// An editor-facing range, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A position in the user-authored view-tree document (0-based line/column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginalPosition {
    line: u32,
    column: u32,
}

impl OriginalPosition {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    #[must_use]
    pub const fn line(self) -> u32 {
        self.line
    }

    #[must_use]
    pub const fn column(self) -> u32 {
        self.column
    }

    /// Same line, column shifted right by `delta`.
    #[must_use]
    pub const fn offset_columns(self, delta: u32) -> Self {
        Self {
            line: self.line,
            column: self.column + delta,
        }
    }

    #[must_use]
    pub const fn to_position(self) -> Position {
        Position::new(self.line, self.column)
    }
}

impl From<Position> for OriginalPosition {
    fn from(pos: Position) -> Self {
        Self::new(pos.line, pos.column)
    }
}

/// A position in the derived TypeScript artifact (0-based line/column).
///
/// Produced only by the translator or by converting engine coordinates;
/// there is deliberately no conversion from an editor [`Position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeneratedPosition {
    line: u32,
    column: u32,
}

impl GeneratedPosition {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    #[must_use]
    pub const fn line(self) -> u32 {
        self.line
    }

    #[must_use]
    pub const fn column(self) -> u32 {
        self.column
    }

    #[must_use]
    pub const fn offset_columns(self, delta: u32) -> Self {
        Self {
            line: self.line,
            column: self.column + delta,
        }
    }

    #[must_use]
    pub const fn to_position(self) -> Position {
        Position::new(self.line, self.column)
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// The three diagnostic streams the analysis engine pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Syntax,
    Semantic,
    Suggestion,
}

impl DiagnosticKind {
    /// Map an engine event name to its kind.
    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "syntaxDiag" => Some(Self::Syntax),
            "semanticDiag" => Some(Self::Semantic),
            "suggestionDiag" => Some(Self::Suggestion),
            _ => None,
        }
    }

    /// Suggestion diagnostics are tracked but never surfaced.
    #[must_use]
    pub const fn surfaced(self) -> bool {
        !matches!(self, Self::Suggestion)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Semantic => "semantic",
            Self::Suggestion => "suggestion",
        }
    }
}

/// A diagnostic translated into original-space coordinates, ready for the
/// editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDiagnostic {
    code: Option<u32>,
    message: String,
    range: Range,
}

impl PublishedDiagnostic {
    #[must_use]
    pub fn new(code: Option<u32>, message: String, range: Range) -> Self {
        Self {
            code,
            message,
            range,
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<u32> {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }
}

// ============================================================================
// Feature results
// ============================================================================

/// The completion kinds surfaced to the editor. The engine reports an open
/// set of kind strings; everything outside these two is filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionItemKind {
    Class,
    Method,
}

impl CompletionItemKind {
    #[must_use]
    pub fn from_engine_kind(kind: &str) -> Option<Self> {
        match kind {
            "class" => Some(Self::Class),
            "method" => Some(Self::Method),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub name: String,
    pub kind: CompletionItemKind,
}

/// A navigation target, pointing into the generated artifact or any other
/// engine-visible file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationLink {
    pub target_path: PathBuf,
    pub target_range: Range,
    pub origin_selection_range: Option<Range>,
}

/// A single text replacement inside one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReplacement {
    pub range: Range,
    pub new_text: String,
}

/// Rename result: replacements grouped per file path.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceEdits {
    edits: HashMap<PathBuf, Vec<TextReplacement>>,
}

impl WorkspaceEdits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: impl Into<PathBuf>, replacement: TextReplacement) {
        self.edits.entry(file.into()).or_default().push(replacement);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Number of files touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    #[must_use]
    pub fn get(&self, file: &Path) -> Option<&[TextReplacement]> {
        self.edits.get(file).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Vec<TextReplacement>)> {
        self.edits.iter()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the bridge subsystem.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Analysis engine executable, resolved against PATH at startup.
    #[serde(default = "default_command")]
    pub command: String,
    /// Extra arguments passed to the engine.
    #[serde(default)]
    pub args: Vec<String>,
    /// Diagnostics polling cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_command() -> String {
    "tsserver".to_string()
}

const fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
