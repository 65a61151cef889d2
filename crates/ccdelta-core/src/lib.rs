//! ccdelta - incremental native compilation for C and C++
//!
//! Given a set of translation units, include search paths and preprocessor
//! macros, this engine decides which sources must be recompiled (by content
//! hash over the header-inclusion graph, never by timestamp), executes the
//! toolchain with transactional safety over the object directory, and
//! persists the analysis state that makes the next decision cheap.
//!
//! The engine is a library: scheduling, up-to-date checking and
//! configuration loading belong to the calling build orchestration layer.

pub mod analysis;
pub mod compile;
pub mod engine;
pub mod errors;
pub mod hash;
pub mod plan;
pub mod state;

pub use analysis::set_ignore_unresolved_headers;
pub use compile::{
    BucketingCompiler, BuildSpec, Compiler, ObjectFileNaming, PlatformCompiler, SourceLanguage,
    SourceOptionsRule, ToolchainSpec, TransactionalCompiler, WorkResult,
};
pub use engine::{CompileEngine, CompileFailure, CompileJob, CompileResult};
pub use errors::{CompileError, StateError};
pub use plan::CompilePlan;
pub use state::{CompilationState, IncludeEdge, SourceFileRecord};
