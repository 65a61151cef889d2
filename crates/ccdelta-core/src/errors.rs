use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the persisted compilation state store
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Job configuration changed (state invalidated)")]
    ConfigMismatch,
}

/// Errors raised while executing the compiler chain
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}", format_toolchain_failure(.source_file.as_deref(), .diagnostic))]
    ToolchainFailed {
        /// Source file the failure is attributable to, when known
        source_file: Option<PathBuf>,
        /// The toolchain's own output, propagated verbatim
        diagnostic: String,
    },
}

fn format_toolchain_failure(source_file: Option<&std::path::Path>, diagnostic: &str) -> String {
    match source_file {
        Some(file) => format!("Failed to compile {}: {}", file.display(), diagnostic),
        None => format!("Compiler invocation failed: {diagnostic}"),
    }
}
