use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::compile::{
    BucketingCompiler, BuildSpec, Compiler, PlatformCompiler, SourceLanguage, SourceOptionsRule,
    ToolchainSpec, TransactionalCompiler,
};
use crate::errors::CompileError;
use crate::hash::hash_config;
use crate::plan::{CompilePlan, IncrementalPlanner};
use crate::state::StateStore;

/// One compilation request, constructed by the orchestration layer
pub struct CompileJob {
    /// Stable logical name, used for logging and diagnostics
    pub name: String,
    pub language: SourceLanguage,
    pub toolchain: ToolchainSpec,
    /// Translation units to compile; order is preserved for deterministic
    /// logging but carries no semantics
    pub source_files: Vec<PathBuf>,
    /// Sources known by the caller to have been removed since the last
    /// invocation; unioned with what the previous state implies
    pub removed_sources_hint: Vec<PathBuf>,
    pub include_search_paths: Vec<PathBuf>,
    /// Ordered macro definitions; `None` means defined without a value
    pub defined_macros: IndexMap<String, Option<String>>,
    pub object_file_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Location of the persisted state blob, owned by the orchestration
    /// layer and opaque to it
    pub state_file: PathBuf,
    pub source_option_rules: Vec<SourceOptionsRule>,
    /// Enables the stash/backup/rollback wrapper so a failed build keeps
    /// the next one incremental
    pub incremental_after_failure: bool,
    pub optimized: bool,
    pub debuggable: bool,
    pub position_independent: bool,
    pub extra_args: Vec<String>,
}

/// Resolution-relevant configuration; a change here invalidates the
/// persisted state, since stored edges cannot observe it
#[derive(Serialize)]
struct JobFingerprint<'a> {
    language: SourceLanguage,
    toolchain: &'a ToolchainSpec,
    include_search_paths: &'a [PathBuf],
    defined_macros: &'a IndexMap<String, Option<String>>,
    optimized: bool,
    debuggable: bool,
    position_independent: bool,
    extra_args: &'a [String],
}

impl CompileJob {
    fn config_hash(&self) -> String {
        hash_config(&JobFingerprint {
            language: self.language,
            toolchain: &self.toolchain,
            include_search_paths: &self.include_search_paths,
            defined_macros: &self.defined_macros,
            optimized: self.optimized,
            debuggable: self.debuggable,
            position_independent: self.position_independent,
            extra_args: &self.extra_args,
        })
    }

    fn default_spec(&self, plan: &CompilePlan) -> BuildSpec {
        BuildSpec {
            name: self.name.clone(),
            language: self.language,
            toolchain: self.toolchain.clone(),
            source_files: plan.files_to_recompile.iter().cloned().collect(),
            removed_sources: plan.removed_sources.iter().cloned().collect(),
            include_roots: self.include_search_paths.clone(),
            macros: self.defined_macros.clone(),
            object_dir: self.object_file_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            optimized: self.optimized,
            debuggable: self.debuggable,
            position_independent: self.position_independent,
            extra_args: self.extra_args.clone(),
        }
    }
}

/// A failed compiler invocation, attributed to a source file when the
/// toolchain made that possible. The diagnostic is the toolchain's output,
/// never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub source_file: Option<PathBuf>,
    pub diagnostic: String,
}

impl From<CompileError> for CompileFailure {
    fn from(error: CompileError) -> Self {
        match error {
            CompileError::ToolchainFailed {
                source_file,
                diagnostic,
            } => CompileFailure {
                source_file,
                diagnostic,
            },
            CompileError::Io(error) => CompileFailure {
                source_file: None,
                diagnostic: error.to_string(),
            },
        }
    }
}

/// Outcome of one `compile` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    pub did_work: bool,
    /// The sources this invocation set out to recompile
    pub recompiled_files: Vec<PathBuf>,
    pub failure: Option<CompileFailure>,
}

impl CompileResult {
    fn nothing_to_do() -> Self {
        CompileResult {
            did_work: false,
            recompiled_files: vec![],
            failure: None,
        }
    }
}

/// Composes analysis, state persistence and the compiler chain into the
/// single operation the orchestration layer calls.
pub struct CompileEngine<C = PlatformCompiler> {
    underlying: C,
}

impl CompileEngine<PlatformCompiler> {
    pub fn new() -> Self {
        Self {
            underlying: PlatformCompiler::new(),
        }
    }
}

impl Default for CompileEngine<PlatformCompiler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Compiler> CompileEngine<C> {
    /// Swap the platform compiler for another implementation; wrappers are
    /// still applied on top
    pub fn with_compiler(underlying: C) -> Self {
        Self { underlying }
    }

    /// Decide the recompilation set, execute the compiler chain, and commit
    /// the new analysis state.
    ///
    /// The state commit is unconditional: a compiler failure does not
    /// invalidate the analysis that was used to drive it. The plan is
    /// returned alongside the result so the orchestration layer can
    /// register `existing_headers` as build inputs and honor
    /// `has_unresolved_headers`.
    pub fn compile(&mut self, job: &CompileJob) -> (CompileResult, CompilePlan) {
        if job.source_files.is_empty() {
            debug!("{}: no source files, nothing to do", job.name);
            return (CompileResult::nothing_to_do(), CompilePlan::default());
        }

        let store = StateStore::new(job.state_file.clone(), job.config_hash());
        let previous = store.load();

        let planner =
            IncrementalPlanner::new(job.include_search_paths.clone(), &job.defined_macros);
        let (plan, new_state) =
            planner.plan(&job.source_files, &job.removed_sources_hint, &previous);
        debug!(
            "{}: recompiling {} of {} source file(s), {} removed",
            job.name,
            plan.files_to_recompile.len(),
            job.source_files.len(),
            plan.removed_sources.len()
        );

        let spec = job.default_spec(&plan);
        let executed = {
            let bucketing =
                BucketingCompiler::new(&mut self.underlying, &job.source_option_rules);
            if job.incremental_after_failure {
                TransactionalCompiler::new(bucketing).execute(&spec)
            } else {
                let mut bucketing = bucketing;
                bucketing.execute(&spec)
            }
        };

        // The analysis is valid regardless of how the compiler fared
        if let Err(error) = store.save(&new_state) {
            warn!("{}: cannot persist compilation state: {error}", job.name);
        }

        let result = match executed {
            Ok(work) => CompileResult {
                did_work: work.did_work,
                recompiled_files: plan.files_to_recompile.iter().cloned().collect(),
                failure: None,
            },
            Err(error) => CompileResult {
                did_work: true,
                recompiled_files: plan.files_to_recompile.iter().cloned().collect(),
                failure: Some(error.into()),
            },
        };
        (result, plan)
    }
}
