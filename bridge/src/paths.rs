//! Path scheme tying a view-tree document to its generated artifacts.
//!
//! `dir/Name.view.tree` compiles into a `-view.tree` sibling directory:
//! the TypeScript artifact is `dir/-view.tree/Name.view.tree.ts` and the
//! mapping artifact `dir/-view.tree/Name.view.tree.map` sits next to it.

use std::path::{Path, PathBuf};

const TREE_SUFFIX: &str = ".view.tree";

const GENERATED_DIR: &str = "-view.tree";

/// Whether this is a view-tree document the bridge cares about.
#[must_use]
pub fn is_tree_document(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TREE_SUFFIX))
}

fn artifact_base(document: &Path) -> Option<PathBuf> {
    if !is_tree_document(document) {
        return None;
    }
    let file_name = document.file_name()?;
    let dir = document.parent()?;
    Some(dir.join(GENERATED_DIR).join(file_name))
}

/// Generated TypeScript artifact for a view-tree document.
#[must_use]
pub fn generated_path(document: &Path) -> Option<PathBuf> {
    artifact_base(document).map(|base| append_extension(&base, "ts"))
}

/// Mapping artifact sitting next to the generated file.
#[must_use]
pub fn mapping_path(document: &Path) -> Option<PathBuf> {
    artifact_base(document).map(|base| append_extension(&base, "map"))
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// The workspace root owning a document: the configured root whose path is
/// the longest proper prefix of the document's path. No match falls back to
/// the first configured root; no roots configured means no root at all.
#[must_use]
pub fn workspace_root_for<'a>(roots: &'a [PathBuf], document: &Path) -> Option<&'a Path> {
    roots
        .iter()
        .filter(|root| document.starts_with(root) && document != root.as_path())
        .max_by_key(|root| root.as_os_str().len())
        .or_else(|| roots.first())
        .map(PathBuf::as_path)
}
