use std::path::{Path, PathBuf};

use crate::hash::hash_bytes;

/// Length of the per-source directory name; 16 hex digits of Blake3 keeps
/// collisions out of reach while staying readable in build output
const DIR_HASH_LEN: usize = 16;

/// Maps source files to their object file locations.
///
/// Each source compiles to `<object_dir>/<hash of source path>/<stem>.o`,
/// so two `util.cpp` files in different directories never collide, and the
/// location is computable without reading the source — the transactional
/// wrapper and removed-source cleanup both rely on that.
#[derive(Debug, Clone)]
pub struct ObjectFileNaming {
    object_dir: PathBuf,
}

impl ObjectFileNaming {
    pub fn new(object_dir: PathBuf) -> Self {
        Self { object_dir }
    }

    pub fn object_file_for(&self, source: &Path) -> PathBuf {
        self.object_dir.join(Self::relative_object_path(source))
    }

    /// Object location relative to the object directory; stash and backup
    /// trees preserve this structure
    pub fn relative_object_path(source: &Path) -> PathBuf {
        let hash = hash_bytes(source.to_string_lossy().as_bytes());
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        PathBuf::from(&hash[..DIR_HASH_LEN]).join(format!("{stem}.o"))
    }
}
