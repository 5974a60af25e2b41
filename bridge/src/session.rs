//! Bridge session — the collaborator-facing facade.
//!
//! Construction is initialization: `start` spawns the engine subprocess,
//! the dispatch loop, the push/watch pumps, and the periodic diagnostics
//! tick. The editor integration then feeds document lifecycle events and
//! feature requests through this one type and reads plain data back.
//! Feature operations degrade to "no result" rather than errors — a
//! partially unavailable engine must not break the editing experience.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use treels_types::{
    BridgeConfig, CompletionItem, CompletionItemKind, LocationLink, Position, PublishedDiagnostic,
    Range, TextReplacement, WorkspaceEdits, word_span,
};

use crate::channel::MessageChannel;
use crate::diagnostics::{DiagnosticsCache, published_set};
use crate::paths;
use crate::protocol::{CompletionsArgs, EnginePosition, FileLocationArgs};
use crate::server::{DiagnosticsPush, EngineHandle, LocationKind};
use crate::sourcemap::MappingTable;
use crate::sync::FileTracker;

const EVENT_CHANNEL_CAPACITY: usize = 256;

const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Events the session publishes to its host.
#[derive(Debug)]
pub enum BridgeEvent {
    /// A fresh diagnostics set for a document; replaces the previous one.
    Diagnostics {
        document: PathBuf,
        items: Vec<PublishedDiagnostic>,
    },
    /// No view-tree document is active; published diagnostics clear.
    DiagnosticsCleared,
}

/// Shared mutable state read by the tick and the pump tasks.
#[derive(Default)]
struct SessionState {
    cache: DiagnosticsCache,
    /// Text of open view-tree documents, keyed by document path.
    documents: HashMap<PathBuf, String>,
    /// Mapping tables keyed by document path; invalidated when the
    /// generated artifact changes on disk.
    mappings: HashMap<PathBuf, Arc<MappingTable>>,
    /// The document currently visible in the editor.
    active: Option<PathBuf>,
    /// Last published set per document, for pull access.
    published: HashMap<PathBuf, Vec<PublishedDiagnostic>>,
}

pub struct BridgeSession {
    engine: EngineHandle,
    channel: Option<MessageChannel>,
    tracker: FileTracker,
    state: Arc<Mutex<SessionState>>,
    events_rx: Option<mpsc::Receiver<BridgeEvent>>,
    tick_handle: JoinHandle<()>,
    push_handle: JoinHandle<()>,
    watch_handle: JoinHandle<()>,
    dispatch_handle: JoinHandle<()>,
}

impl BridgeSession {
    /// Spawn the engine and start the session. Must be called within a
    /// Tokio runtime. Fails fatally when the engine executable cannot be
    /// located.
    pub fn start(config: &BridgeConfig, workspace_roots: Vec<PathBuf>) -> Result<Self> {
        let mut channel = MessageChannel::spawn(&config.command, &config.args)?;
        let incoming = channel
            .take_incoming()
            .context("channel incoming stream already taken")?;
        let (engine, push_rx, dispatch_handle) = EngineHandle::start(channel.writer(), incoming);
        Ok(Self::assemble(
            engine,
            Some(channel),
            push_rx,
            dispatch_handle,
            workspace_roots,
            config.poll_interval(),
        ))
    }

    fn assemble(
        engine: EngineHandle,
        channel: Option<MessageChannel>,
        push_rx: mpsc::Receiver<DiagnosticsPush>,
        dispatch_handle: JoinHandle<()>,
        workspace_roots: Vec<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        let state = Arc::new(Mutex::new(SessionState::default()));
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (watch_tx, watch_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        let tracker = FileTracker::new(engine.clone(), workspace_roots, watch_tx);

        let push_handle = tokio::spawn(pump_push_events(push_rx, state.clone()));
        let watch_handle = tokio::spawn(pump_watch_events(watch_rx, engine.clone(), state.clone()));
        let tick_handle = tokio::spawn(diagnostics_tick(poll_interval, state.clone(), events_tx));

        Self {
            engine,
            channel,
            tracker,
            state,
            events_rx: Some(events_rx),
            tick_handle,
            push_handle,
            watch_handle,
            dispatch_handle,
        }
    }

    /// Mirror an editor open of a view-tree document.
    pub async fn open(&mut self, document: &Path, text: String) {
        if !paths::is_tree_document(document) {
            return;
        }
        self.state
            .lock()
            .await
            .documents
            .insert(document.to_path_buf(), text);
        self.load_mapping(document).await;
        self.tracker.open(document).await;
    }

    /// Mirror an editor close.
    pub async fn close(&mut self, document: &Path) {
        if !paths::is_tree_document(document) {
            return;
        }
        {
            let mut state = self.state.lock().await;
            state.documents.remove(document);
            state.mappings.remove(document);
            state.published.remove(document);
        }
        self.tracker.close(document).await;
    }

    /// The editor buffer changed: remember the text and refresh diagnostics
    /// for the generated artifact.
    pub async fn document_changed(&mut self, document: &Path, text: String) {
        if !paths::is_tree_document(document) {
            return;
        }
        self.state
            .lock()
            .await
            .documents
            .insert(document.to_path_buf(), text);
        let Some(generated) = paths::generated_path(document) else {
            return;
        };
        if self.tracker.is_tracked(&generated) {
            if let Err(e) = self.engine.run_diagnostics(&generated).await {
                tracing::warn!("diagnostics refresh failed: {e}");
            }
        }
    }

    /// Tell the diagnostics tick which document is visible.
    pub async fn set_active_document(&mut self, document: Option<PathBuf>) {
        self.state.lock().await.active = document;
    }

    /// Completion entries at a position, filtered to the kinds the editor
    /// surfaces. An untranslatable position or a "no content" reply yields
    /// an empty list.
    pub async fn completions(&mut self, document: &Path, position: Position) -> Vec<CompletionItem> {
        let Some(generated) = paths::generated_path(document) else {
            return Vec::new();
        };
        let Some(table) = self.mapping_for(document).await else {
            return Vec::new();
        };
        let Some(gen_pos) = table.to_generated(position.into()) else {
            // No counterpart in the generated space: decline.
            return Vec::new();
        };

        let prefix = self.word_prefix(document, position).await;
        let engine_pos = EnginePosition::from_generated(gen_pos);
        let args = CompletionsArgs {
            file: generated.display().to_string(),
            line: engine_pos.line,
            offset: engine_pos.offset,
            prefix,
        };
        match self.engine.completions(args).await {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|entry| {
                    CompletionItemKind::from_engine_kind(&entry.kind).map(|kind| CompletionItem {
                        name: entry.name,
                        kind,
                    })
                })
                .collect(),
            Err(e) => {
                tracing::debug!("completions degraded to empty: {e}");
                Vec::new()
            }
        }
    }

    /// Definition targets for the symbol at a position.
    pub async fn definition(&mut self, document: &Path, position: Position) -> Vec<LocationLink> {
        self.symbol_locations(LocationKind::Definition, document, position)
            .await
    }

    /// Implementation targets for the symbol at a position.
    pub async fn implementation(
        &mut self,
        document: &Path,
        position: Position,
    ) -> Vec<LocationLink> {
        self.symbol_locations(LocationKind::Implementation, document, position)
            .await
    }

    async fn symbol_locations(
        &mut self,
        kind: LocationKind,
        document: &Path,
        position: Position,
    ) -> Vec<LocationLink> {
        let Some(generated) = paths::generated_path(document) else {
            return Vec::new();
        };
        let Some(table) = self.mapping_for(document).await else {
            return Vec::new();
        };
        let Some(gen_pos) = table.to_generated(position.into()) else {
            return Vec::new();
        };

        let origin = self.word_range(document, position).await;
        let engine_pos = EnginePosition::from_generated(gen_pos);
        let args = FileLocationArgs {
            file: generated.display().to_string(),
            line: engine_pos.line,
            offset: engine_pos.offset,
        };
        match self.engine.definition_or_implementation(kind, args).await {
            Ok(spans) => spans
                .into_iter()
                .map(|span| LocationLink {
                    target_path: PathBuf::from(span.file),
                    target_range: Range::new(
                        span.start.to_generated().to_position(),
                        span.end.to_generated().to_position(),
                    ),
                    origin_selection_range: origin,
                })
                .collect(),
            Err(e) => {
                tracing::debug!("symbol locations degraded to empty: {e}");
                Vec::new()
            }
        }
    }

    /// Rename the symbol at a position. Any failure degrades to an empty
    /// edit set — the editor simply has nothing to apply.
    pub async fn rename(
        &mut self,
        document: &Path,
        position: Position,
        new_name: &str,
    ) -> WorkspaceEdits {
        let mut edits = WorkspaceEdits::new();
        let Some(generated) = paths::generated_path(document) else {
            return edits;
        };
        let Some(table) = self.mapping_for(document).await else {
            return edits;
        };
        let Some(gen_pos) = table.to_generated(position.into()) else {
            return edits;
        };

        let engine_pos = EnginePosition::from_generated(gen_pos);
        let body = match self
            .engine
            .rename(&generated, engine_pos.line, engine_pos.offset)
            .await
        {
            Ok(Some(body)) => body,
            Ok(None) => return edits,
            Err(e) => {
                tracing::debug!("rename degraded to empty: {e}");
                return edits;
            }
        };

        for group in body.locs {
            for span in group.locs {
                let range = Range::new(
                    span.start.to_generated().to_position(),
                    span.end.to_generated().to_position(),
                );
                let mut new_text = String::new();
                if let Some(prefix) = &span.prefix_text {
                    new_text.push_str(prefix);
                }
                new_text.push_str(new_name);
                if let Some(suffix) = &span.suffix_text {
                    new_text.push_str(suffix);
                }
                edits.push(group.file.clone(), TextReplacement { range, new_text });
            }
        }

        // The engine only sees the generated files; the word in the
        // view-tree document itself renames too.
        if let Some(range) = self.word_range(document, position).await {
            edits.push(
                document.to_path_buf(),
                TextReplacement {
                    range,
                    new_text: new_name.to_string(),
                },
            );
        }

        edits
    }

    /// Last published diagnostics set for a document.
    pub async fn diagnostics(&self, document: &Path) -> Vec<PublishedDiagnostic> {
        self.state
            .lock()
            .await
            .published
            .get(document)
            .cloned()
            .unwrap_or_default()
    }

    /// Stream of session events. Single consumer; a second call yields
    /// `None`.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<BridgeEvent>> {
        self.events_rx.take()
    }

    /// Cancel the periodic work and kill the engine.
    pub async fn shutdown(self) {
        self.tick_handle.abort();
        self.push_handle.abort();
        self.watch_handle.abort();
        self.dispatch_handle.abort();
        if let Some(channel) = self.channel {
            channel.shutdown().await;
        }
    }

    async fn mapping_for(&self, document: &Path) -> Option<Arc<MappingTable>> {
        {
            let state = self.state.lock().await;
            if let Some(table) = state.mappings.get(document) {
                return Some(table.clone());
            }
        }
        self.load_mapping(document).await
    }

    async fn load_mapping(&self, document: &Path) -> Option<Arc<MappingTable>> {
        let path = paths::mapping_path(document)?;
        match MappingTable::from_file(&path) {
            Ok(table) => {
                let table = Arc::new(table);
                self.state
                    .lock()
                    .await
                    .mappings
                    .insert(document.to_path_buf(), table.clone());
                Some(table)
            }
            Err(e) => {
                tracing::debug!(
                    "mapping artifact unavailable for {}: {e:#}",
                    document.display()
                );
                None
            }
        }
    }

    /// Text from the word start up to the cursor, used as completion prefix.
    async fn word_prefix(&self, document: &Path, position: Position) -> Option<String> {
        let state = self.state.lock().await;
        let text = state.documents.get(document)?;
        let line = text.lines().nth(position.line as usize)?;
        let (start, _) = word_span(line, position.column as usize)?;
        let prefix: String = line
            .chars()
            .skip(start)
            .take(position.column as usize - start)
            .collect();
        (!prefix.is_empty()).then_some(prefix)
    }

    /// The word range covering a position in the original document.
    async fn word_range(&self, document: &Path, position: Position) -> Option<Range> {
        let state = self.state.lock().await;
        let text = state.documents.get(document)?;
        let line = text.lines().nth(position.line as usize)?;
        let (start, end) = word_span(line, position.column as usize)?;
        Some(Range::new(
            Position::new(position.line, start as u32),
            Position::new(position.line, end as u32),
        ))
    }

    #[cfg(test)]
    pub(crate) fn start_for_tests(
        writer_tx: mpsc::Sender<crate::channel::WriterCommand>,
        incoming_rx: mpsc::Receiver<serde_json::Value>,
        workspace_roots: Vec<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        let (engine, push_rx, dispatch_handle) = EngineHandle::start(writer_tx, incoming_rx);
        Self::assemble(
            engine,
            None,
            push_rx,
            dispatch_handle,
            workspace_roots,
            poll_interval,
        )
    }
}

/// Accumulate pushed diagnostics into the cache; updates are atomic per
/// key, so the tick always reads a consistent snapshot.
async fn pump_push_events(
    mut push_rx: mpsc::Receiver<DiagnosticsPush>,
    state: Arc<Mutex<SessionState>>,
) {
    while let Some(push) = push_rx.recv().await {
        tracing::debug!(
            kind = push.kind.label(),
            file = %push.file.display(),
            count = push.diagnostics.len(),
            "diagnostics push"
        );
        state
            .lock()
            .await
            .cache
            .update(push.kind, push.file, push.diagnostics);
    }
}

/// React to generated-artifact changes: drop the stale mapping table and
/// ask the engine for a fresh error pass. Duplicate refreshes are safe;
/// fresher pushes overwrite.
async fn pump_watch_events(
    mut watch_rx: mpsc::Receiver<PathBuf>,
    engine: EngineHandle,
    state: Arc<Mutex<SessionState>>,
) {
    while let Some(generated) = watch_rx.recv().await {
        state
            .lock()
            .await
            .mappings
            .retain(|document, _| paths::generated_path(document).as_deref() != Some(&generated));
        if let Err(e) = engine.run_diagnostics(&generated).await {
            tracing::warn!(
                "diagnostics refresh for {} failed: {e}",
                generated.display()
            );
        }
    }
}

/// The periodic publication loop. Each tick recomputes the active
/// document's translated diagnostics and replaces the published set
/// wholesale; with no active view-tree document everything clears.
async fn diagnostics_tick(
    interval: Duration,
    state: Arc<Mutex<SessionState>>,
    events_tx: mpsc::Sender<BridgeEvent>,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        timer.tick().await;
        let mut state = state.lock().await;

        let active = state.active.clone();
        let document = match active {
            Some(document) if paths::is_tree_document(&document) => document,
            _ => {
                if !state.published.is_empty() {
                    state.published.clear();
                    let _ = events_tx.try_send(BridgeEvent::DiagnosticsCleared);
                }
                continue;
            }
        };
        let Some(generated) = paths::generated_path(&document) else {
            continue;
        };

        let table = match state.mappings.get(&document) {
            Some(table) => table.clone(),
            // Invalidated by a watch event (or never loaded): re-read now.
            None => {
                let Some(path) = paths::mapping_path(&document) else {
                    continue;
                };
                match MappingTable::from_file(&path) {
                    Ok(table) => {
                        let table = Arc::new(table);
                        state.mappings.insert(document.clone(), table.clone());
                        table
                    }
                    Err(e) => {
                        tracing::trace!(
                            "skipping diagnostics for {}: {e:#}",
                            document.display()
                        );
                        continue;
                    }
                }
            }
        };

        let text = state.documents.get(&document).cloned().unwrap_or_default();
        let items = published_set(&state.cache, &generated, &table, &text);
        state.published.insert(document.clone(), items.clone());
        let _ = events_tx.try_send(BridgeEvent::Diagnostics { document, items });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::WriterCommand;
    use std::fs;

    struct Fixture {
        session: BridgeSession,
        writer_rx: mpsc::Receiver<WriterCommand>,
        incoming_tx: mpsc::Sender<serde_json::Value>,
        _dir: tempfile::TempDir,
        document: PathBuf,
        generated: PathBuf,
    }

    /// A session wired to a fake engine, with a real artifact pair on disk.
    /// The mapping covers generated line 0 col 0 → original line 0 col 0.
    fn fixture() -> Fixture {
        let (writer_tx, writer_rx) = mpsc::channel(32);
        let (incoming_tx, incoming_rx) = mpsc::channel(32);
        let session = BridgeSession::start_for_tests(
            writer_tx,
            incoming_rx,
            Vec::new(),
            Duration::from_millis(10),
        );

        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("button.view.tree");
        fs::write(&document, "$my_button $mol_view\n\tsub /\n").unwrap();
        let gen_dir = dir.path().join("-view.tree");
        fs::create_dir(&gen_dir).unwrap();
        let generated = gen_dir.join("button.view.tree.ts");
        fs::write(&generated, "class $my_button {}\n").unwrap();
        fs::write(
            gen_dir.join("button.view.tree.map"),
            r#"{ "version": 3, "sources": ["button.view.tree"], "mappings": "AAAA" }"#,
        )
        .unwrap();

        Fixture {
            session,
            writer_rx,
            incoming_tx,
            _dir: dir,
            document,
            generated,
        }
    }

    fn sent(cmd: WriterCommand) -> serde_json::Value {
        match cmd {
            WriterCommand::Send(request) => serde_json::to_value(&request).unwrap(),
            WriterCommand::Shutdown => panic!("expected Send, got Shutdown"),
        }
    }

    #[tokio::test]
    async fn rename_failure_yields_empty_edits_not_an_error() {
        let mut fx = fixture();
        let document = fx.document.clone();
        fx.session
            .open(&document, fs::read_to_string(&document).unwrap())
            .await;
        let open = sent(fx.writer_rx.recv().await.unwrap());
        assert_eq!(open["command"], "open");

        let mut session = fx.session;
        let task = tokio::spawn(async move {
            let edits = session
                .rename(&document, Position::new(0, 1), "$your_button")
                .await;
            (session, edits)
        });

        let rename = sent(fx.writer_rx.recv().await.unwrap());
        assert_eq!(rename["command"], "rename");
        let seq = rename["seq"].as_u64().unwrap();
        fx.incoming_tx
            .send(serde_json::json!({
                "type": "response",
                "request_seq": seq,
                "success": false,
                "command": "rename",
                "message": "Error processing request."
            }))
            .await
            .unwrap();

        let (_session, edits) = task.await.unwrap();
        assert!(edits.is_empty());
    }

    #[tokio::test]
    async fn rename_success_builds_edits_including_the_original_document() {
        let mut fx = fixture();
        let document = fx.document.clone();
        fx.session
            .open(&document, fs::read_to_string(&document).unwrap())
            .await;
        let _ = fx.writer_rx.recv().await;

        let mut session = fx.session;
        let doc = document.clone();
        let task = tokio::spawn(async move {
            let edits = session.rename(&doc, Position::new(0, 1), "$your_button").await;
            (session, edits)
        });

        let rename = sent(fx.writer_rx.recv().await.unwrap());
        let seq = rename["seq"].as_u64().unwrap();
        assert_eq!(rename["arguments"]["line"], 1);
        assert_eq!(rename["arguments"]["offset"], 2);
        fx.incoming_tx
            .send(serde_json::json!({
                "type": "response",
                "request_seq": seq,
                "success": true,
                "command": "rename",
                "body": {
                    "info": { "canRename": true },
                    "locs": [{
                        "file": "gen/button.view.tree.ts",
                        "locs": [
                            { "start": { "line": 1, "offset": 7 }, "end": { "line": 1, "offset": 17 } },
                            { "start": { "line": 4, "offset": 3 }, "end": { "line": 4, "offset": 13 }, "prefixText": "this." }
                        ]
                    }]
                }
            }))
            .await
            .unwrap();

        let (_session, edits) = task.await.unwrap();
        assert_eq!(edits.len(), 2);

        let generated_edits = edits.get(Path::new("gen/button.view.tree.ts")).unwrap();
        assert_eq!(generated_edits.len(), 2);
        assert_eq!(
            generated_edits[0].range,
            Range::new(Position::new(0, 6), Position::new(0, 16))
        );
        assert_eq!(generated_edits[0].new_text, "$your_button");
        assert_eq!(generated_edits[1].new_text, "this.$your_button");

        // The view-tree document's own word is replaced as well.
        let local_edits = edits.get(&document).unwrap();
        assert_eq!(local_edits.len(), 1);
        assert_eq!(
            local_edits[0].range,
            Range::new(Position::new(0, 0), Position::new(0, 10))
        );
        assert_eq!(local_edits[0].new_text, "$your_button");
    }

    #[tokio::test]
    async fn untranslatable_position_declines_without_contacting_the_engine() {
        let mut fx = fixture();
        let document = fx.document.clone();
        fx.session
            .open(&document, fs::read_to_string(&document).unwrap())
            .await;
        let _ = fx.writer_rx.recv().await;

        // Line 5 has no mapping segment at all.
        let items = fx
            .session
            .completions(&document, Position::new(5, 0))
            .await;
        assert!(items.is_empty());
        assert!(fx.writer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn completions_filter_to_classes_and_methods() {
        let mut fx = fixture();
        let document = fx.document.clone();
        fx.session
            .open(&document, fs::read_to_string(&document).unwrap())
            .await;
        let _ = fx.writer_rx.recv().await;

        let mut session = fx.session;
        let doc = document.clone();
        let task = tokio::spawn(async move {
            let items = session.completions(&doc, Position::new(0, 1)).await;
            (session, items)
        });

        let completion = sent(fx.writer_rx.recv().await.unwrap());
        assert_eq!(completion["command"], "completionInfo");
        // Prefix is the word text up to the cursor.
        assert_eq!(completion["arguments"]["prefix"], "$");
        let seq = completion["seq"].as_u64().unwrap();
        fx.incoming_tx
            .send(serde_json::json!({
                "type": "response",
                "request_seq": seq,
                "success": true,
                "command": "completionInfo",
                "body": { "entries": [
                    { "name": "$mol_view", "kind": "class" },
                    { "name": "title", "kind": "method" },
                    { "name": "window", "kind": "var" }
                ]}
            }))
            .await
            .unwrap();

        let (_session, items) = task.await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "$mol_view");
        assert_eq!(items[0].kind, CompletionItemKind::Class);
        assert_eq!(items[1].name, "title");
        assert_eq!(items[1].kind, CompletionItemKind::Method);
    }

    #[tokio::test]
    async fn definition_maps_engine_spans_to_location_links() {
        let mut fx = fixture();
        let document = fx.document.clone();
        fx.session
            .open(&document, fs::read_to_string(&document).unwrap())
            .await;
        let _ = fx.writer_rx.recv().await;

        let mut session = fx.session;
        let doc = document.clone();
        let task = tokio::spawn(async move {
            let links = session.definition(&doc, Position::new(0, 1)).await;
            (session, links)
        });

        let definition = sent(fx.writer_rx.recv().await.unwrap());
        assert_eq!(definition["command"], "definition");
        let seq = definition["seq"].as_u64().unwrap();
        fx.incoming_tx
            .send(serde_json::json!({
                "type": "response",
                "request_seq": seq,
                "success": true,
                "command": "definition",
                "body": [{
                    "file": "lib/mol_view.ts",
                    "start": { "line": 12, "offset": 14 },
                    "end": { "line": 12, "offset": 23 }
                }]
            }))
            .await
            .unwrap();

        let (_session, links) = task.await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_path, PathBuf::from("lib/mol_view.ts"));
        assert_eq!(
            links[0].target_range,
            Range::new(Position::new(11, 13), Position::new(11, 22))
        );
        assert_eq!(
            links[0].origin_selection_range,
            Some(Range::new(Position::new(0, 0), Position::new(0, 10)))
        );
    }

    #[tokio::test]
    async fn tick_publishes_translated_diagnostics_for_the_active_document() {
        let mut fx = fixture();
        let document = fx.document.clone();
        let mut events = fx.session.take_events().unwrap();
        fx.session
            .open(&document, fs::read_to_string(&document).unwrap())
            .await;
        let _ = fx.writer_rx.recv().await;
        fx.session
            .set_active_document(Some(document.clone()))
            .await;

        // Engine pushes a semantic error for the generated artifact.
        fx.incoming_tx
            .send(serde_json::json!({
                "type": "event",
                "event": "semanticDiag",
                "body": {
                    "file": fx.generated.display().to_string(),
                    "diagnostics": [{
                        "start": { "line": 1, "offset": 1 },
                        "end": { "line": 1, "offset": 11 },
                        "text": "Cannot find name",
                        "code": 2304,
                        "category": "error"
                    }]
                }
            }))
            .await
            .unwrap();

        // Wait for a tick that carries the diagnostic.
        let items = loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("no tick event within 5s")
                .expect("event channel closed");
            if let BridgeEvent::Diagnostics { items, .. } = event {
                if !items.is_empty() {
                    break items;
                }
            }
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].code(), Some(2304));
        assert_eq!(
            items[0].range(),
            Range::new(Position::new(0, 0), Position::new(0, 9))
        );

        // Pull access agrees with the pushed event.
        let pulled = fx.session.diagnostics(&document).await;
        assert_eq!(pulled, items);
    }

    #[tokio::test]
    async fn tick_clears_when_no_tree_document_is_active() {
        let mut fx = fixture();
        let document = fx.document.clone();
        let mut events = fx.session.take_events().unwrap();
        fx.session
            .open(&document, fs::read_to_string(&document).unwrap())
            .await;
        let _ = fx.writer_rx.recv().await;
        fx.session
            .set_active_document(Some(document.clone()))
            .await;

        // Let at least one publication happen, then switch away.
        let _ = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no tick event within 5s");
        fx.session.set_active_document(None).await;

        let cleared = loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("no clear event within 5s")
                .expect("event channel closed");
            if matches!(event, BridgeEvent::DiagnosticsCleared) {
                break true;
            }
        };
        assert!(cleared);
        assert!(fx.session.diagnostics(&document).await.is_empty());
    }

    #[tokio::test]
    async fn non_tree_documents_are_ignored_by_the_session() {
        let mut fx = fixture();
        fx.session
            .open(Path::new("/ws/main.ts"), "let a = 1".to_string())
            .await;
        assert!(fx.writer_rx.try_recv().is_err());
    }
}
