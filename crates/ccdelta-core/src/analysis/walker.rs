use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

use crate::hash::{hash_bytes, hash_file};
use crate::state::{IncludeEdge, SourceFileRecord};

use super::directives::{parse_directives, Directive, Include, MacroDef};
use super::macros::MacroEnvironment;
use super::resolver::{IncludeResolver, ResolveOutcome};

/// How a file's include graph resolved, from best to worst. Merging results
/// from multiple includes of the same file takes the ordinal maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IncludeOutcome {
    /// No macro-valued includes anywhere in the subtree; the result is
    /// independent of the caller's macro environment
    NoMacroIncludes,
    /// Macro-valued includes were present but all of them resolved
    HasMacroIncludes,
    /// At least one include could not be resolved
    UnresolvedMacroIncludes,
}

/// Outcome of analyzing one translation unit
#[derive(Debug)]
pub enum Analysis {
    /// Content and include graph are unchanged; the previous record is
    /// reused verbatim. `force_recompile` is set when the record is known
    /// unreliable (unresolved includes) and the source must compile anyway.
    Reused {
        record: SourceFileRecord,
        force_recompile: bool,
    },
    /// The file is new or its graph changed; a fresh record was built
    Rebuilt { record: SourceFileRecord },
    /// Not a regular file; excluded from the build without error
    Skipped,
    /// Reading the file failed; the caller degrades this to a forced
    /// recompilation, never a build failure
    Failed { error: std::io::Error },
}

#[derive(Debug, Clone)]
enum MacroEvent {
    Define(MacroDef),
    Undef(String),
}

/// Result of visiting one file's include subtree. `edges` and `headers`
/// are transitive; `macros` is the ordered list of definition events the
/// subtree contributes to callers that include it.
#[derive(Debug)]
struct FileVisitResult {
    content_hash: String,
    edges: IndexSet<IncludeEdge>,
    headers: IndexSet<PathBuf>,
    macros: Vec<MacroEvent>,
    outcome: IncludeOutcome,
}

enum Visit {
    Done(Rc<FileVisitResult>),
    /// The target is already on the DFS path; treated as fully resolved to
    /// break the cycle
    Cycle { content_hash: String },
    /// The target vanished between resolution and reading
    Missing,
}

/// Depth-first, cycle-safe walker over a translation unit's include graph.
///
/// One walker instance serves a whole compile job: visit results for files
/// whose subtree contains no macro-valued includes are memoized and shared
/// across translation units, since those results cannot depend on
/// caller-supplied macro state.
pub struct DependencyGraphWalker {
    resolver: IncludeResolver,
    seed: MacroEnvironment,
    cache: FxHashMap<PathBuf, Rc<FileVisitResult>>,
    hashes: FxHashMap<PathBuf, String>,
    existing_headers: IndexSet<PathBuf>,
    has_unresolved_headers: bool,
    ignore_unresolved: bool,
}

impl DependencyGraphWalker {
    pub fn new(
        search_paths: Vec<PathBuf>,
        job_macros: &IndexMap<String, Option<String>>,
    ) -> Self {
        Self {
            resolver: IncludeResolver::new(search_paths),
            seed: MacroEnvironment::from_job_macros(job_macros),
            cache: FxHashMap::default(),
            hashes: FxHashMap::default(),
            existing_headers: IndexSet::new(),
            has_unresolved_headers: false,
            ignore_unresolved: super::ignore_unresolved_headers(),
        }
    }

    #[cfg(test)]
    fn with_ignore_unresolved(mut self, enabled: bool) -> Self {
        self.ignore_unresolved = enabled;
        self
    }

    /// Header files confirmed to be build inputs so far
    pub fn existing_headers(&self) -> &IndexSet<PathBuf> {
        &self.existing_headers
    }

    pub fn has_unresolved_headers(&self) -> bool {
        self.has_unresolved_headers
    }

    /// Consume the walker, yielding the aggregated header set and the
    /// unresolved flag
    pub fn finish(self) -> (IndexSet<PathBuf>, bool) {
        (self.existing_headers, self.has_unresolved_headers)
    }

    /// Analyze one translation unit against its previous record
    pub fn analyze(&mut self, source: &Path, previous: Option<&SourceFileRecord>) -> Analysis {
        if !source.is_file() {
            return Analysis::Skipped;
        }
        let bytes = match std::fs::read(source) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Analysis::Skipped,
            Err(error) => return Analysis::Failed { error },
        };
        let content_hash = hash_bytes(&bytes);
        self.hashes.insert(source.to_path_buf(), content_hash.clone());

        if let Some(previous) = previous {
            if previous.content_hash == content_hash {
                if let Some(confirmed) = self.graph_unchanged(source, previous) {
                    self.existing_headers.extend(confirmed);
                    let force_recompile = previous.has_unresolved_includes;
                    if force_recompile {
                        self.has_unresolved_headers = true;
                    }
                    return Analysis::Reused {
                        record: previous.clone(),
                        force_recompile,
                    };
                }
            }
        }

        let result = match self.cache.get(source).cloned() {
            Some(cached) => cached,
            None => {
                let mut env = self.seed.clone();
                let mut stack = Vec::new();
                self.visit_parsed(source, content_hash, &bytes, &mut env, &mut stack)
            }
        };

        self.existing_headers.extend(result.headers.iter().cloned());
        let has_unresolved_includes = result.outcome == IncludeOutcome::UnresolvedMacroIncludes;
        if has_unresolved_includes {
            self.has_unresolved_headers = true;
        }
        Analysis::Rebuilt {
            record: SourceFileRecord {
                content_hash: result.content_hash.clone(),
                has_unresolved_includes,
                include_edges: result.edges.iter().cloned().collect(),
            },
        }
    }

    /// Replay a previous record's edges against the current file system.
    /// Returns the confirmed header files when the whole graph still
    /// resolves to the same content, `None` as soon as anything differs.
    /// Headers are only committed by the caller once the entire graph is
    /// confirmed; a later edge may still invalidate the record.
    fn graph_unchanged(
        &mut self,
        source: &Path,
        previous: &SourceFileRecord,
    ) -> Option<Vec<PathBuf>> {
        let mut files_by_hash: FxHashMap<String, PathBuf> = FxHashMap::default();
        files_by_hash.insert(previous.content_hash.clone(), source.to_path_buf());
        let mut confirmed = Vec::with_capacity(previous.include_edges.len());

        for edge in &previous.include_edges {
            let including_dir = match &edge.included_from {
                Some(hash) => {
                    let including = files_by_hash.get(hash)?;
                    Some(including.parent()?.to_path_buf())
                }
                None => None,
            };
            let include = Include::from_delimited(&edge.include_path)?;
            let resolved = self
                .resolver
                .resolve_concrete(including_dir.as_deref(), &include)?;
            let hash = self.cached_hash(&resolved.file)?;
            if hash != edge.resolved_hash {
                return None;
            }
            files_by_hash.insert(hash, resolved.file.clone());
            confirmed.push(resolved.file);
        }
        Some(confirmed)
    }

    fn cached_hash(&mut self, file: &Path) -> Option<String> {
        if let Some(hash) = self.hashes.get(file) {
            return Some(hash.clone());
        }
        let hash = hash_file(file).ok()?;
        self.hashes.insert(file.to_path_buf(), hash.clone());
        Some(hash)
    }

    /// Visit an included file: serve from the memo cache, detect cycles,
    /// or read and recurse. On return the environment reflects every macro
    /// definition the subtree contributes, cached or not.
    fn visit_file(
        &mut self,
        file: &Path,
        env: &mut MacroEnvironment,
        stack: &mut Vec<String>,
    ) -> Visit {
        if let Some(cached) = self.cache.get(file).cloned() {
            for event in &cached.macros {
                apply_macro_event(env, event);
            }
            return Visit::Done(cached);
        }
        let bytes = match std::fs::read(file) {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!("Cannot read {}: {error}", file.display());
                return Visit::Missing;
            }
        };
        let content_hash = hash_bytes(&bytes);
        self.hashes.insert(file.to_path_buf(), content_hash.clone());
        if stack.contains(&content_hash) {
            return Visit::Cycle { content_hash };
        }
        Visit::Done(self.visit_parsed(file, content_hash, &bytes, env, stack))
    }

    fn visit_parsed(
        &mut self,
        file: &Path,
        content_hash: String,
        bytes: &[u8],
        env: &mut MacroEnvironment,
        stack: &mut Vec<String>,
    ) -> Rc<FileVisitResult> {
        let directives = parse_directives(&String::from_utf8_lossy(bytes));
        stack.push(content_hash.clone());

        let mut edges: IndexSet<IncludeEdge> = IndexSet::new();
        let mut headers: IndexSet<PathBuf> = IndexSet::new();
        let mut macros: Vec<MacroEvent> = Vec::new();
        let mut outcome = IncludeOutcome::NoMacroIncludes;

        for directive in &directives {
            match directive {
                Directive::Define(def) => {
                    env.define(def);
                    macros.push(MacroEvent::Define(def.clone()));
                }
                Directive::Undef(name) => {
                    env.undefine(name);
                    macros.push(MacroEvent::Undef(name.clone()));
                }
                Directive::Include(include) => {
                    if matches!(include, Include::Macro(_)) {
                        outcome = outcome.max(IncludeOutcome::HasMacroIncludes);
                    }
                    match self.resolver.resolve(file.parent(), include, env) {
                        ResolveOutcome::Resolved(resolved) => {
                            match self.visit_file(&resolved.file, env, stack) {
                                Visit::Done(child) => {
                                    edges.insert(IncludeEdge {
                                        include_path: resolved.path_text,
                                        included_from: resolved
                                            .from_including_dir
                                            .then(|| content_hash.clone()),
                                        resolved_hash: child.content_hash.clone(),
                                    });
                                    headers.insert(resolved.file);
                                    edges.extend(child.edges.iter().cloned());
                                    headers.extend(child.headers.iter().cloned());
                                    macros.extend(child.macros.iter().cloned());
                                    outcome = outcome.max(child.outcome);
                                }
                                Visit::Cycle {
                                    content_hash: target_hash,
                                } => {
                                    edges.insert(IncludeEdge {
                                        include_path: resolved.path_text,
                                        included_from: resolved
                                            .from_including_dir
                                            .then(|| content_hash.clone()),
                                        resolved_hash: target_hash,
                                    });
                                    headers.insert(resolved.file);
                                }
                                Visit::Missing => {
                                    self.mark_unresolved(&include.delimited_text(), &mut outcome);
                                }
                            }
                        }
                        ResolveOutcome::NotFound { path_text } => {
                            self.mark_unresolved(&path_text, &mut outcome);
                        }
                        ResolveOutcome::UnresolvedMacro => {
                            outcome = IncludeOutcome::UnresolvedMacroIncludes;
                        }
                    }
                }
            }
        }

        stack.pop();
        let result = Rc::new(FileVisitResult {
            content_hash,
            edges,
            headers,
            macros,
            outcome,
        });
        if result.outcome == IncludeOutcome::NoMacroIncludes {
            self.cache.insert(file.to_path_buf(), Rc::clone(&result));
        }
        result
    }

    fn mark_unresolved(&self, path_text: &str, outcome: &mut IncludeOutcome) {
        if self.ignore_unresolved {
            debug!("Ignoring unresolved include {path_text}");
        } else {
            debug!("Cannot resolve include {path_text}");
            *outcome = IncludeOutcome::UnresolvedMacroIncludes;
        }
    }
}

fn apply_macro_event(env: &mut MacroEnvironment, event: &MacroEvent) {
    match event {
        MacroEvent::Define(def) => env.define(def),
        MacroEvent::Undef(name) => env.undefine(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn walker(search_paths: Vec<PathBuf>) -> DependencyGraphWalker {
        DependencyGraphWalker::new(search_paths, &IndexMap::new())
    }

    fn expect_rebuilt(analysis: Analysis) -> SourceFileRecord {
        match analysis {
            Analysis::Rebuilt { record } => record,
            other => panic!("expected rebuilt record, got {other:?}"),
        }
    }

    #[test]
    fn test_analyze_simple_translation_unit() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "util.h", "int util();\n");
        let main = write(temp.path(), "main.cpp", "#include \"util.h\"\n");

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert_eq!(record.include_edges.len(), 1);
        assert_eq!(record.include_edges[0].include_path, "\"util.h\"");
        assert!(!record.has_unresolved_includes);
        assert_eq!(walker.existing_headers().len(), 1);
        assert!(!walker.has_unresolved_headers());
    }

    #[test]
    fn test_analyze_reuses_unchanged_record() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "util.h", "int util();\n");
        let main = write(temp.path(), "main.cpp", "#include \"util.h\"\n");

        let mut first = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(first.analyze(&main, None));

        let mut second = walker(vec![temp.path().to_path_buf()]);
        match second.analyze(&main, Some(&record)) {
            Analysis::Reused {
                record: reused,
                force_recompile,
            } => {
                assert_eq!(reused, record);
                assert!(!force_recompile);
            }
            other => panic!("expected reuse, got {other:?}"),
        }
        // Confirmed headers are still reported as build inputs
        assert_eq!(second.existing_headers().len(), 1);
    }

    #[test]
    fn test_header_change_forces_rewalk() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "util.h", "int util();\n");
        let main = write(temp.path(), "main.cpp", "#include \"util.h\"\n");

        let mut first = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(first.analyze(&main, None));

        write(temp.path(), "util.h", "int util();\nint more();\n");

        let mut second = walker(vec![temp.path().to_path_buf()]);
        let rebuilt = expect_rebuilt(second.analyze(&main, Some(&record)));
        assert_ne!(
            rebuilt.include_edges[0].resolved_hash,
            record.include_edges[0].resolved_hash
        );
    }

    #[test]
    fn test_removed_header_forces_rewalk() {
        let temp = TempDir::new().unwrap();
        let util = write(temp.path(), "util.h", "int util();\n");
        let main = write(temp.path(), "main.cpp", "#include \"util.h\"\n");

        let mut first = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(first.analyze(&main, None));

        fs::remove_file(util).unwrap();

        let mut second = walker(vec![temp.path().to_path_buf()]);
        let rebuilt = expect_rebuilt(second.analyze(&main, Some(&record)));
        assert!(rebuilt.has_unresolved_includes);
        assert!(second.has_unresolved_headers());
    }

    #[test]
    fn test_include_cycle_terminates() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.h", "#include \"b.h\"\nint a();\n");
        write(temp.path(), "b.h", "#include \"a.h\"\nint b();\n");
        let main = write(temp.path(), "main.cpp", "#include \"a.h\"\n");

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert_eq!(record.include_edges.len(), 3);
        assert_eq!(walker.existing_headers().len(), 2);
        assert!(!record.has_unresolved_includes);

        // Deterministic: a second walk over the same tree yields the same record
        let mut again = DependencyGraphWalker::new(
            vec![temp.path().to_path_buf()],
            &IndexMap::new(),
        );
        assert_eq!(expect_rebuilt(again.analyze(&main, None)), record);
    }

    #[test]
    fn test_macro_defined_above_include_is_visible() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "impl.h", "int impl();\n");
        let main = write(
            temp.path(),
            "main.cpp",
            indoc! {r#"
                #define HEADER "impl.h"
                #include HEADER
            "#},
        );

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert!(!record.has_unresolved_includes);
        assert_eq!(record.include_edges.len(), 1);
        // The stored edge carries the expanded target
        assert_eq!(record.include_edges[0].include_path, "\"impl.h\"");
    }

    #[test]
    fn test_macro_defined_below_include_is_not_visible() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "impl.h", "int impl();\n");
        let main = write(
            temp.path(),
            "main.cpp",
            indoc! {r#"
                #include HEADER
                #define HEADER "impl.h"
            "#},
        );

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert!(record.has_unresolved_includes);
        assert!(walker.has_unresolved_headers());
    }

    #[test]
    fn test_macro_from_included_file_visible_to_later_include() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "config.h", "#define IMPL_HEADER \"impl.h\"\n");
        write(temp.path(), "impl.h", "int impl();\n");
        let main = write(
            temp.path(),
            "main.cpp",
            indoc! {r#"
                #include "config.h"
                #include IMPL_HEADER
            "#},
        );

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert!(!record.has_unresolved_includes);
        assert_eq!(record.include_edges.len(), 2);
    }

    #[test]
    fn test_macro_free_subtree_is_memoized_across_units() {
        let temp = TempDir::new().unwrap();
        let shared = write(temp.path(), "shared.h", "int shared();\n");
        let first = write(temp.path(), "first.cpp", "#include \"shared.h\"\n");
        let second = write(
            temp.path(),
            "second.cpp",
            indoc! {r#"
                #define M 1
                #include "shared.h"
            "#},
        );

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        expect_rebuilt(walker.analyze(&first, None));

        let canonical = shared.canonicalize().unwrap();
        assert!(walker.cache.contains_key(&canonical));
        let cached = Rc::clone(&walker.cache[&canonical]);

        // The second unit defines an unrelated macro; the cached no-macro
        // result is reused, not re-resolved
        let record = expect_rebuilt(walker.analyze(&second, None));
        assert!(Rc::ptr_eq(&cached, &walker.cache[&canonical]));
        assert_eq!(record.include_edges.len(), 1);
    }

    #[test]
    fn test_macro_dependent_subtree_is_not_memoized() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "impl.h", "int impl();\n");
        let chooser = write(temp.path(), "chooser.h", "#include CHOICE\n");
        let main = write(
            temp.path(),
            "main.cpp",
            indoc! {r#"
                #define CHOICE "impl.h"
                #include "chooser.h"
            "#},
        );

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert!(!record.has_unresolved_includes);
        assert!(!walker.cache.contains_key(&chooser.canonicalize().unwrap()));
    }

    #[test]
    fn test_unresolved_include_marks_record() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.cpp", "#include \"missing.h\"\n");

        let mut walker = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert!(record.has_unresolved_includes);
        assert!(record.include_edges.is_empty());
        assert!(walker.has_unresolved_headers());
    }

    #[test]
    fn test_ignore_unresolved_headers_escape_hatch() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.cpp", "#include \"missing.h\"\n");

        let mut walker =
            walker(vec![temp.path().to_path_buf()]).with_ignore_unresolved(true);
        let record = expect_rebuilt(walker.analyze(&main, None));

        assert!(!record.has_unresolved_includes);
        assert!(!walker.has_unresolved_headers());
    }

    #[test]
    fn test_reuse_of_unresolved_record_forces_recompile() {
        let temp = TempDir::new().unwrap();
        let main = write(temp.path(), "main.cpp", "#include \"missing.h\"\n");

        let mut first = walker(vec![temp.path().to_path_buf()]);
        let record = expect_rebuilt(first.analyze(&main, None));

        let mut second = walker(vec![temp.path().to_path_buf()]);
        match second.analyze(&main, Some(&record)) {
            Analysis::Reused {
                force_recompile, ..
            } => assert!(force_recompile),
            other => panic!("expected reuse, got {other:?}"),
        }
        assert!(second.has_unresolved_headers());
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let temp = TempDir::new().unwrap();
        let mut walker = walker(vec![]);

        assert!(matches!(
            walker.analyze(&temp.path().join("gone.cpp"), None),
            Analysis::Skipped
        ));
    }
}
