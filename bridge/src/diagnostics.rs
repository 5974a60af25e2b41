//! Diagnostics aggregation — the cache of pushed engine diagnostics and
//! the translation pass that turns them into editor-ready sets.
//!
//! The periodic tick driving publication lives in the session; this module
//! is the pure part: cache bookkeeping and the recompute algorithm.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use treels_types::{DiagnosticKind, GeneratedPosition, PublishedDiagnostic, Range, word_len_at};

use crate::protocol::EngineDiagnostic;
use crate::sourcemap::MappingTable;

/// Latest diagnostics per (kind, generated file). Entries overwrite on each
/// push and are never proactively expired — reconciliation happens at
/// publish time, when stale files simply stop being looked up.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticsCache {
    entries: HashMap<PathBuf, HashMap<DiagnosticKind, Vec<EngineDiagnostic>>>,
}

impl DiagnosticsCache {
    pub fn update(
        &mut self,
        kind: DiagnosticKind,
        file: PathBuf,
        diagnostics: Vec<EngineDiagnostic>,
    ) {
        self.entries.entry(file).or_default().insert(kind, diagnostics);
    }

    /// Surfaced entries for one generated file: Semantic first, then
    /// Syntax. Suggestion entries are tracked but never returned.
    fn surfaced_for(&self, file: &Path) -> impl Iterator<Item = &EngineDiagnostic> {
        self.entries
            .get(file)
            .into_iter()
            .flat_map(|kinds| {
                [DiagnosticKind::Semantic, DiagnosticKind::Syntax]
                    .into_iter()
                    .filter_map(|kind| kinds.get(&kind))
            })
            .flatten()
    }
}

/// Translate one engine diagnostic into original space.
///
/// A start with no covering mapping drops the diagnostic — it cannot be
/// attributed to any location in the original document. The end is
/// translated at its last covered character and published as the exclusive
/// end; when that fails too, the end is synthesized from the word token at
/// the start.
fn translate(
    diag: &EngineDiagnostic,
    table: &MappingTable,
    document_text: &str,
) -> Option<PublishedDiagnostic> {
    let start = table.to_original(diag.start.to_generated())?;

    let end_gen = diag.end.to_generated();
    let end = end_gen
        .column()
        .checked_sub(1)
        .and_then(|col| table.to_original(GeneratedPosition::new(end_gen.line(), col)))
        .unwrap_or_else(|| {
            let line = document_text
                .lines()
                .nth(start.line() as usize)
                .unwrap_or("");
            let len = word_len_at(line, start.column() as usize);
            start.offset_columns(len as u32)
        });

    Some(PublishedDiagnostic::new(
        diag.code,
        diag.text.clone(),
        Range::new(start.to_position(), end.to_position()),
    ))
}

/// The editor-ready set for one document: surfaced kinds only, errors only,
/// translated. The result replaces any previously published set wholesale.
pub(crate) fn published_set(
    cache: &DiagnosticsCache,
    generated: &Path,
    table: &MappingTable,
    document_text: &str,
) -> Vec<PublishedDiagnostic> {
    cache
        .surfaced_for(generated)
        .filter(|diag| diag.is_error())
        .filter_map(|diag| translate(diag, table, document_text))
        .collect()
}
