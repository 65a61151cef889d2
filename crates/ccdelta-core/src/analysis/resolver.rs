use std::path::{Path, PathBuf};
use tracing::debug;

use super::directives::Include;
use super::macros::MacroEnvironment;

/// A successfully located header file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonicalized location of the header on disk
    pub file: PathBuf,
    /// True when resolution used the including file's directory, making the
    /// result dependent on where the include was written
    pub from_including_dir: bool,
    /// The expanded include target with delimiters, re-resolvable without a
    /// macro environment (e.g. `"util.h"` or `<vector>`)
    pub path_text: String,
}

/// Outcome of resolving one include directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(ResolvedPath),
    /// The target is concrete but no search path contains it
    NotFound { path_text: String },
    /// The target is macro-valued and the environment cannot expand it
    UnresolvedMacro,
}

/// Resolves include directives against an ordered list of search
/// directories. Quoted includes try the including file's directory first,
/// matching the preprocessor's lookup order.
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    search_paths: Vec<PathBuf>,
}

impl IncludeResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Resolve an include as written, expanding macro-valued targets with
    /// the caller's environment
    pub fn resolve(
        &self,
        including_dir: Option<&Path>,
        include: &Include,
        env: &MacroEnvironment,
    ) -> ResolveOutcome {
        let concrete = match include {
            Include::Macro(expr) => match env.expand_include(expr) {
                Some(expanded) => expanded,
                None => {
                    debug!("Cannot expand macro include {expr}");
                    return ResolveOutcome::UnresolvedMacro;
                }
            },
            other => other.clone(),
        };

        match self.resolve_concrete(including_dir, &concrete) {
            Some(resolved) => ResolveOutcome::Resolved(resolved),
            None => ResolveOutcome::NotFound {
                path_text: concrete.delimited_text(),
            },
        }
    }

    /// Resolve an already-expanded (quoted or system) include target. Used
    /// by the graph-unchanged re-check, which replays stored edge text and
    /// has no macro environment. Macro targets never reach this point.
    pub fn resolve_concrete(
        &self,
        including_dir: Option<&Path>,
        include: &Include,
    ) -> Option<ResolvedPath> {
        let (path, try_including_dir) = match include {
            Include::Quoted(path) => (path, true),
            Include::System(path) => (path, false),
            Include::Macro(_) => return None,
        };

        if try_including_dir {
            if let Some(dir) = including_dir {
                if let Some(file) = existing_file(&dir.join(path)) {
                    return Some(ResolvedPath {
                        file,
                        from_including_dir: true,
                        path_text: include.delimited_text(),
                    });
                }
            }
        }

        for search_path in &self.search_paths {
            if let Some(file) = existing_file(&search_path.join(path)) {
                return Some(ResolvedPath {
                    file,
                    from_including_dir: false,
                    path_text: include.delimited_text(),
                });
            }
        }
        None
    }
}

fn existing_file(candidate: &Path) -> Option<PathBuf> {
    candidate
        .is_file()
        .then(|| candidate.canonicalize().unwrap_or_else(|_| candidate.to_path_buf()))
}
