use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::CompileError;

use super::{BuildSpec, Compiler, ObjectFileNaming, WorkResult};

const CLEANUP_ATTEMPTS: u32 = 3;
const CLEANUP_BACKOFF: Duration = Duration::from_millis(10);

/// Wraps a compiler with stash/backup/rollback semantics over the object
/// directory.
///
/// Before delegating, object files of removed sources move into a stash
/// directory and existing object files of sources about to recompile move
/// into a backup directory, both preserving their relative structure. A
/// failed delegate restores every moved file, so the object directory is
/// byte-for-byte what it was before the attempt and the next build can
/// still compile incrementally. A successful delegate deletes both
/// directories, which is also what finally removes stale objects of
/// removed sources.
pub struct TransactionalCompiler<C> {
    underlying: C,
}

impl<C: Compiler> TransactionalCompiler<C> {
    pub fn new(underlying: C) -> Self {
        Self { underlying }
    }
}

impl<C: Compiler> Compiler for TransactionalCompiler<C> {
    fn execute(&mut self, spec: &BuildSpec) -> Result<WorkResult, CompileError> {
        let naming = ObjectFileNaming::new(spec.object_dir.clone());
        let stash_dir = spec.temp_dir.join("stash");
        let backup_dir = spec.temp_dir.join("backup");

        let stashed_removed = match prepare(spec, &naming, &stash_dir, &backup_dir) {
            Ok(stashed) => stashed,
            Err(error) => {
                // A half-finished preparation is rolled back the same way a
                // failed delegate is
                restore_tree(&stash_dir, &spec.object_dir);
                restore_tree(&backup_dir, &spec.object_dir);
                return Err(error.into());
            }
        };

        match self.underlying.execute(spec) {
            Ok(mut result) => {
                result.did_work |= stashed_removed;
                cleanup_temp_dir(&stash_dir);
                cleanup_temp_dir(&backup_dir);
                Ok(result)
            }
            Err(error) => {
                debug!("{}: restoring object files after failure", spec.name);
                restore_tree(&stash_dir, &spec.object_dir);
                restore_tree(&backup_dir, &spec.object_dir);
                Err(error)
            }
        }
    }
}

/// Move existing object files out of the way; returns whether any removed
/// source had an object file to stash (that stash becomes a deletion on
/// success, which counts as work)
fn prepare(
    spec: &BuildSpec,
    naming: &ObjectFileNaming,
    stash_dir: &Path,
    backup_dir: &Path,
) -> std::io::Result<bool> {
    let mut stashed_removed = false;
    for removed in &spec.removed_sources {
        stashed_removed |= move_if_exists(
            &naming.object_file_for(removed),
            &stash_dir.join(ObjectFileNaming::relative_object_path(removed)),
        )?;
    }
    for source in &spec.source_files {
        move_if_exists(
            &naming.object_file_for(source),
            &backup_dir.join(ObjectFileNaming::relative_object_path(source)),
        )?;
    }
    Ok(stashed_removed)
}

/// Atomic rename, not a copy; a file with no prior object output simply has
/// nothing to move
fn move_if_exists(from: &Path, to: &Path) -> std::io::Result<bool> {
    if !from.exists() {
        return Ok(false);
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(from, to)?;
    Ok(true)
}

/// Move every file under `from` back into `into`, preserving relative
/// paths. Restoration is best-effort; a file that cannot move back is
/// logged and left in the temp tree for inspection.
fn restore_tree(from: &Path, into: &Path) {
    if !from.exists() {
        return;
    }
    for entry in WalkDir::new(from).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let destination = into.join(relative);
        if let Some(parent) = destination.parent() {
            if let Err(error) = std::fs::create_dir_all(parent) {
                warn!("Cannot recreate {}: {error}", parent.display());
                continue;
            }
        }
        // A partial output may occupy the slot; the pre-attempt file wins
        if destination.exists() {
            let _ = std::fs::remove_file(&destination);
        }
        if let Err(error) = std::fs::rename(entry.path(), &destination) {
            warn!(
                "Cannot restore {} to {}: {error}",
                entry.path().display(),
                destination.display()
            );
        }
    }
}

/// Recursive deletion with brief backoff to ride out transient file locks;
/// a final failure is logged and ignored, stale temp files are harmless
fn cleanup_temp_dir(dir: &Path) {
    if !dir.exists() {
        return;
    }
    for attempt in 1..=CLEANUP_ATTEMPTS {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => return,
            Err(error) if attempt == CLEANUP_ATTEMPTS => {
                warn!("Cannot delete {}: {error}", dir.display());
            }
            Err(_) => std::thread::sleep(CLEANUP_BACKOFF * attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{SourceLanguage, ToolchainSpec};
    use indexmap::IndexMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Writes one object file per source; fails the whole invocation when
    /// any source name contains "broken"
    struct FakeCompiler;

    impl Compiler for FakeCompiler {
        fn execute(&mut self, spec: &BuildSpec) -> Result<WorkResult, CompileError> {
            let naming = ObjectFileNaming::new(spec.object_dir.clone());
            for source in &spec.source_files {
                if source.to_string_lossy().contains("broken") {
                    return Err(CompileError::ToolchainFailed {
                        source_file: Some(source.clone()),
                        diagnostic: "synthetic failure".to_string(),
                    });
                }
                let object = naming.object_file_for(source);
                fs::create_dir_all(object.parent().unwrap()).unwrap();
                fs::write(object, b"fresh object").unwrap();
            }
            Ok(WorkResult::did_work(!spec.source_files.is_empty()))
        }
    }

    fn spec_in(temp: &TempDir, sources: &[&str], removed: &[&str]) -> BuildSpec {
        BuildSpec {
            name: "compileCpp".to_string(),
            language: SourceLanguage::Cpp,
            toolchain: ToolchainSpec::new("c++"),
            source_files: sources.iter().map(PathBuf::from).collect(),
            removed_sources: removed.iter().map(PathBuf::from).collect(),
            include_roots: vec![],
            macros: IndexMap::new(),
            object_dir: temp.path().join("obj"),
            temp_dir: temp.path().join("tmp"),
            optimized: false,
            debuggable: false,
            position_independent: false,
            extra_args: vec![],
        }
    }

    fn seed_object(spec: &BuildSpec, source: &str, content: &[u8]) -> PathBuf {
        let naming = ObjectFileNaming::new(spec.object_dir.clone());
        let object = naming.object_file_for(Path::new(source));
        fs::create_dir_all(object.parent().unwrap()).unwrap();
        fs::write(&object, content).unwrap();
        object
    }

    #[test]
    fn test_failure_restores_previous_objects() {
        let temp = TempDir::new().unwrap();
        let spec = spec_in(&temp, &["/src/good.cpp", "/src/broken.cpp"], &[]);
        let good = seed_object(&spec, "/src/good.cpp", b"old good");
        let broken = seed_object(&spec, "/src/broken.cpp", b"old broken");

        let mut compiler = TransactionalCompiler::new(FakeCompiler);
        assert!(compiler.execute(&spec).is_err());

        assert_eq!(fs::read(&good).unwrap(), b"old good");
        assert_eq!(fs::read(&broken).unwrap(), b"old broken");
    }

    #[test]
    fn test_failure_restores_removed_objects() {
        let temp = TempDir::new().unwrap();
        let spec = spec_in(&temp, &["/src/broken.cpp"], &["/src/gone.cpp"]);
        let gone = seed_object(&spec, "/src/gone.cpp", b"stale object");

        let mut compiler = TransactionalCompiler::new(FakeCompiler);
        assert!(compiler.execute(&spec).is_err());

        assert_eq!(fs::read(&gone).unwrap(), b"stale object");
    }

    #[test]
    fn test_success_replaces_objects_and_cleans_temp_dirs() {
        let temp = TempDir::new().unwrap();
        let spec = spec_in(&temp, &["/src/good.cpp"], &[]);
        let good = seed_object(&spec, "/src/good.cpp", b"old good");

        let mut compiler = TransactionalCompiler::new(FakeCompiler);
        let result = compiler.execute(&spec).unwrap();

        assert!(result.did_work);
        assert_eq!(fs::read(&good).unwrap(), b"fresh object");
        assert!(!spec.temp_dir.join("stash").exists());
        assert!(!spec.temp_dir.join("backup").exists());
    }

    #[test]
    fn test_success_deletes_stashed_removed_objects() {
        let temp = TempDir::new().unwrap();
        let spec = spec_in(&temp, &[], &["/src/gone.cpp"]);
        let gone = seed_object(&spec, "/src/gone.cpp", b"stale object");

        let mut compiler = TransactionalCompiler::new(FakeCompiler);
        let result = compiler.execute(&spec).unwrap();

        // Deleting a stale object counts as work even though the delegate
        // compiled nothing
        assert!(result.did_work);
        assert!(!gone.exists());
    }

    #[test]
    fn test_sources_without_prior_objects_need_no_backup() {
        let temp = TempDir::new().unwrap();
        let spec = spec_in(&temp, &["/src/good.cpp"], &[]);

        let mut compiler = TransactionalCompiler::new(FakeCompiler);
        let result = compiler.execute(&spec).unwrap();

        assert!(result.did_work);
        let naming = ObjectFileNaming::new(spec.object_dir.clone());
        assert!(naming.object_file_for(Path::new("/src/good.cpp")).exists());
    }
}
