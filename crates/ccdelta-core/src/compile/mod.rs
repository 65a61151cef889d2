//! Compiler execution chain
//!
//! The facade wires three layers, selected at job-construction time:
//! the transactional wrapper (stash/backup/rollback over the object
//! directory), the per-source bucketing wrapper (one underlying invocation
//! per distinct extra-argument set), and the platform compiler that runs
//! the actual toolchain. Every layer implements the same `Compiler`
//! capability, so wrappers compose as plain values.

mod bucket;
mod output;
mod platform;
mod spec;
mod transaction;

pub use bucket::{BucketingCompiler, SourceOptionsRule};
pub use output::ObjectFileNaming;
pub use platform::PlatformCompiler;
pub use spec::{BuildSpec, SourceLanguage, ToolchainSpec};
pub use transaction::TransactionalCompiler;

use crate::errors::CompileError;

/// Result of one compiler execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkResult {
    /// True when any output was produced or deleted
    pub did_work: bool,
}

impl WorkResult {
    pub fn did_work(did_work: bool) -> Self {
        Self { did_work }
    }
}

/// A compiler execution step. Wrappers hold their delegate by value and
/// implement the same trait.
pub trait Compiler {
    fn execute(&mut self, spec: &BuildSpec) -> Result<WorkResult, CompileError>;
}

impl<C: Compiler + ?Sized> Compiler for &mut C {
    fn execute(&mut self, spec: &BuildSpec) -> Result<WorkResult, CompileError> {
        (**self).execute(spec)
    }
}
