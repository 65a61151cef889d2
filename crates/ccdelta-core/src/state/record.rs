use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One resolved include relationship, re-checkable without a macro
/// environment: the stored path text is always the expanded form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeEdge {
    /// Delimited include target, e.g. `"util.h"` or `<vector>`
    pub include_path: String,

    /// Content hash of the including file when resolution depended on its
    /// directory; `None` for plain search-path resolution
    pub included_from: Option<String>,

    /// Content hash of the header the directive resolved to
    pub resolved_hash: String,
}

/// Last-known-good analysis of one translation unit. For a persisted root
/// source the edge list is the flattened transitive edge set of the whole
/// include graph, so the subtree can be re-checked from this record alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileRecord {
    /// Blake3 hash of the file's bytes at analysis time
    pub content_hash: String,

    /// True when any include could not be fully resolved; such a source is
    /// recompiled on every build until the condition clears
    pub has_unresolved_includes: bool,

    /// Ordered, deduplicated transitive include edges
    pub include_edges: Vec<IncludeEdge>,
}

/// Per-job mapping from source file to its most recent successful analysis.
/// Reflects the last analysis used to drive a recompilation decision,
/// independent of whether the compiler invocation itself succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationState {
    pub per_source: FxHashMap<PathBuf, SourceFileRecord>,
}

impl CompilationState {
    pub fn is_empty(&self) -> bool {
        self.per_source.is_empty()
    }

    pub fn get(&self, source: &Path) -> Option<&SourceFileRecord> {
        self.per_source.get(source)
    }

    pub fn insert(&mut self, source: PathBuf, record: SourceFileRecord) {
        self.per_source.insert(source, record);
    }

    pub fn source_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.per_source.keys()
    }
}
