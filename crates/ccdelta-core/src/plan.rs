use indexmap::{IndexMap, IndexSet};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::analysis::{Analysis, DependencyGraphWalker};
use crate::state::CompilationState;

/// The recompilation decision for one job invocation. Ephemeral; produced
/// once per `compile` call and handed to the orchestration layer alongside
/// the result.
#[derive(Debug, Default)]
pub struct CompilePlan {
    /// Sources that must be recompiled, in job order
    pub files_to_recompile: IndexSet<PathBuf>,

    /// Sources present in the previous state but absent from this job;
    /// their stale object files are deleted as part of the same operation
    pub removed_sources: IndexSet<PathBuf>,

    /// Header files that are current build inputs, for the orchestration
    /// layer's own up-to-date checking
    pub existing_headers: IndexSet<PathBuf>,

    /// When true the orchestration layer must treat this job as not
    /// cacheable and rerun it even without further changes
    pub has_unresolved_headers: bool,
}

/// Compares each translation unit's current include graph against the
/// previous state and produces the minimal recompilation set together with
/// the state to persist for the next build.
pub struct IncrementalPlanner {
    walker: DependencyGraphWalker,
}

impl IncrementalPlanner {
    pub fn new(
        search_paths: Vec<PathBuf>,
        job_macros: &IndexMap<String, Option<String>>,
    ) -> Self {
        Self {
            walker: DependencyGraphWalker::new(search_paths, job_macros),
        }
    }

    pub fn plan(
        mut self,
        sources: &[PathBuf],
        removed_hint: &[PathBuf],
        previous: &CompilationState,
    ) -> (CompilePlan, CompilationState) {
        let mut files_to_recompile = IndexSet::new();
        let mut new_state = CompilationState::default();

        for source in sources {
            match self.walker.analyze(source, previous.get(source)) {
                Analysis::Reused {
                    record,
                    force_recompile,
                } => {
                    if force_recompile {
                        debug!(
                            "Recompiling {} (unresolved includes)",
                            source.display()
                        );
                        files_to_recompile.insert(source.clone());
                    }
                    new_state.insert(source.clone(), record);
                }
                Analysis::Rebuilt { record } => {
                    files_to_recompile.insert(source.clone());
                    new_state.insert(source.clone(), record);
                }
                Analysis::Skipped => {
                    debug!("Skipping {} (not a regular file)", source.display());
                }
                Analysis::Failed { error } => {
                    // Analysis failures degrade to a forced recompilation;
                    // only the compiler step may fail the build.
                    warn!(
                        "Cannot analyze {}, recompiling it: {error}",
                        source.display()
                    );
                    files_to_recompile.insert(source.clone());
                }
            }
        }

        let mut removed_sources: IndexSet<PathBuf> = previous
            .source_files()
            .filter(|&previous_source| !sources.contains(previous_source))
            .cloned()
            .collect();
        removed_sources.extend(
            removed_hint
                .iter()
                .filter(|&hinted| !sources.contains(hinted))
                .cloned(),
        );

        let (existing_headers, has_unresolved_headers) = self.walker.finish();
        let plan = CompilePlan {
            files_to_recompile,
            removed_sources,
            existing_headers,
            has_unresolved_headers,
        };
        (plan, new_state)
    }
}
