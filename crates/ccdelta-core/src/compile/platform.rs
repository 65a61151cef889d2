use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::errors::CompileError;

use super::{BuildSpec, Compiler, ObjectFileNaming, WorkResult};

/// Drives a gcc/clang-compatible toolchain, one process per source file.
///
/// Object files of removed sources are deleted first (the default bucket is
/// the only spec that carries removals, so deletion happens exactly once
/// per job). Compilation stops at the first failing source; the toolchain's
/// diagnostic is propagated verbatim.
#[derive(Debug, Default)]
pub struct PlatformCompiler;

impl PlatformCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for PlatformCompiler {
    fn execute(&mut self, spec: &BuildSpec) -> Result<WorkResult, CompileError> {
        let naming = ObjectFileNaming::new(spec.object_dir.clone());
        let mut did_work = false;

        for removed in &spec.removed_sources {
            let object = naming.object_file_for(removed);
            if object.exists() {
                debug!("Deleting stale object {}", object.display());
                std::fs::remove_file(&object)?;
                if let Some(parent) = object.parent() {
                    // Drop the per-source directory when it emptied out
                    let _ = std::fs::remove_dir(parent);
                }
                did_work = true;
            }
        }

        for source in &spec.source_files {
            let object = naming.object_file_for(source);
            if let Some(parent) = object.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let args = build_args(spec, source, &object);
            debug!(
                "{} {}",
                spec.toolchain.executable.display(),
                args.iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            );

            let output = Command::new(&spec.toolchain.executable)
                .args(&args)
                .output()
                .map_err(|error| CompileError::ToolchainFailed {
                    source_file: Some(source.clone()),
                    diagnostic: format!(
                        "cannot launch {}: {error}",
                        spec.toolchain.executable.display()
                    ),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let diagnostic = if stderr.trim().is_empty() {
                    String::from_utf8_lossy(&output.stdout).into_owned()
                } else {
                    stderr.into_owned()
                };
                return Err(CompileError::ToolchainFailed {
                    source_file: Some(source.clone()),
                    diagnostic,
                });
            }
            did_work = true;
        }

        Ok(WorkResult::did_work(did_work))
    }
}

/// Argument list for one source file, in toolchain-conventional order
fn build_args(spec: &BuildSpec, source: &Path, object: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = spec
        .toolchain
        .base_args
        .iter()
        .map(OsString::from)
        .collect();
    args.push("-x".into());
    args.push(spec.language.flag().into());
    args.push("-c".into());
    args.push(source.into());
    args.push("-o".into());
    args.push(object.into());
    for root in &spec.include_roots {
        let mut flag = OsString::from("-I");
        flag.push(root);
        args.push(flag);
    }
    for (name, value) in &spec.macros {
        let mut flag = OsString::from("-D");
        flag.push(name);
        if let Some(value) = value {
            flag.push("=");
            flag.push(value);
        }
        args.push(flag);
    }
    if spec.debuggable {
        args.push("-g".into());
    }
    args.push(if spec.optimized { "-O2" } else { "-O0" }.into());
    if spec.position_independent {
        args.push("-fPIC".into());
    }
    args.extend(spec.extra_args.iter().map(OsString::from));
    args
}
