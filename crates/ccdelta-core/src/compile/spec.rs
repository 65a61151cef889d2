use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;

/// Language the toolchain is driven in (`-x` flag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceLanguage {
    C,
    Cpp,
}

impl SourceLanguage {
    pub fn flag(self) -> &'static str {
        match self {
            SourceLanguage::C => "c",
            SourceLanguage::Cpp => "c++",
        }
    }
}

/// The toolchain executable and the arguments every invocation starts with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainSpec {
    pub executable: PathBuf,
    pub base_args: Vec<String>,
}

impl ToolchainSpec {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            base_args: vec![],
        }
    }
}

/// Everything one compiler invocation needs. Buckets are synthesized as
/// field-by-field copies of the default spec with their own source subset
/// and accumulated extra arguments.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// Job name, used only for logging
    pub name: String,
    pub language: SourceLanguage,
    pub toolchain: ToolchainSpec,
    pub source_files: Vec<PathBuf>,
    /// Sources removed since the last invocation; their object files are
    /// deleted exactly once, by the default bucket
    pub removed_sources: Vec<PathBuf>,
    pub include_roots: Vec<PathBuf>,
    pub macros: IndexMap<String, Option<String>>,
    pub object_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub optimized: bool,
    pub debuggable: bool,
    pub position_independent: bool,
    pub extra_args: Vec<String>,
}

impl BuildSpec {
    /// Copy of this spec restricted to a source subset
    pub fn with_sources(&self, source_files: Vec<PathBuf>) -> BuildSpec {
        BuildSpec {
            source_files,
            ..self.clone()
        }
    }

    /// Copy of this spec for an option bucket: its own sources, the
    /// bucket's arguments appended, no removals (the default bucket owns
    /// those), and a temp directory namespaced by the bucket key
    pub fn for_bucket(
        &self,
        key: &str,
        source_files: Vec<PathBuf>,
        bucket_args: Vec<String>,
    ) -> BuildSpec {
        let mut extra_args = self.extra_args.clone();
        extra_args.extend(bucket_args);
        BuildSpec {
            source_files,
            removed_sources: vec![],
            temp_dir: self.temp_dir.join(format!("options-{key}")),
            extra_args,
            ..self.clone()
        }
    }
}
