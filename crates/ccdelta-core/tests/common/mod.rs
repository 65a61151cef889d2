#![allow(dead_code)]

use ccdelta_core::{
    BuildSpec, CompileError, CompileJob, Compiler, ObjectFileNaming, SourceLanguage,
    ToolchainSpec, WorkResult,
};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Sources containing this marker make the fake toolchain fail, the way a
/// real compiler rejects a syntax error
pub const FAILURE_MARKER: &str = "COMPILE_ERROR";

/// Shared record of every spec the fake toolchain executed
#[derive(Clone, Default)]
pub struct SpecLog(Rc<RefCell<Vec<BuildSpec>>>);

impl SpecLog {
    pub fn specs(&self) -> Vec<BuildSpec> {
        self.0.borrow().clone()
    }

    pub fn invocations(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Stands in for the platform compiler: deletes objects of removed
/// sources, writes one object per source (its content derived from the
/// source bytes, so a recompilation is observable), and fails on the first
/// source containing [`FAILURE_MARKER`].
pub struct FakeToolchain {
    log: SpecLog,
}

impl FakeToolchain {
    pub fn new() -> (Self, SpecLog) {
        let log = SpecLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl Compiler for FakeToolchain {
    fn execute(&mut self, spec: &BuildSpec) -> Result<WorkResult, CompileError> {
        self.log.0.borrow_mut().push(spec.clone());

        let naming = ObjectFileNaming::new(spec.object_dir.clone());
        let mut did_work = false;
        for removed in &spec.removed_sources {
            let object = naming.object_file_for(removed);
            if object.exists() {
                fs::remove_file(&object)?;
                did_work = true;
            }
        }
        for source in &spec.source_files {
            let content = fs::read_to_string(source)?;
            if content.contains(FAILURE_MARKER) {
                return Err(CompileError::ToolchainFailed {
                    source_file: Some(source.clone()),
                    diagnostic: format!("error: invalid token in {}", source.display()),
                });
            }
            let object = naming.object_file_for(source);
            fs::create_dir_all(object.parent().unwrap())?;
            fs::write(&object, format!("obj:{content}"))?;
            did_work = true;
        }
        Ok(WorkResult::did_work(did_work))
    }
}

/// A job over `workspace` with sensible defaults: the workspace itself is
/// the only search path, and state/objects/temp all live under it
pub fn job(workspace: &Path, sources: &[PathBuf]) -> CompileJob {
    CompileJob {
        name: "compileCpp".to_string(),
        language: SourceLanguage::Cpp,
        toolchain: ToolchainSpec::new("c++"),
        source_files: sources.to_vec(),
        removed_sources_hint: vec![],
        include_search_paths: vec![workspace.to_path_buf()],
        defined_macros: IndexMap::new(),
        object_file_dir: workspace.join("obj"),
        temp_dir: workspace.join("tmp"),
        state_file: workspace.join("state.bin"),
        source_option_rules: vec![],
        incremental_after_failure: false,
        optimized: false,
        debuggable: false,
        position_independent: false,
        extra_args: vec![],
    }
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub fn object_for(workspace: &Path, source: &Path) -> PathBuf {
    ObjectFileNaming::new(workspace.join("obj")).object_file_for(source)
}
