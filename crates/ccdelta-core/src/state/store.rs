use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::errors::StateError;

use super::CompilationState;

/// State format version - increment when the record structure changes
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    config_hash: String,
    state: CompilationState,
}

/// Reads and writes one job's persisted compilation state.
///
/// Loading never fails: a missing, corrupted, version-incompatible or
/// configuration-mismatched blob degrades to an empty state, which simply
/// means a full recompilation for that job.
pub struct StateStore {
    path: PathBuf,
    config_hash: String,
}

impl StateStore {
    /// `path` is owned by the orchestration layer; `config_hash` covers the
    /// job's resolution-relevant configuration
    pub fn new(path: PathBuf, config_hash: String) -> Self {
        Self { path, config_hash }
    }

    pub fn load(&self) -> CompilationState {
        if !self.path.exists() {
            debug!("No previous compilation state at {}", self.path.display());
            return CompilationState::default();
        }
        match self.read() {
            Ok(state) => {
                debug!(
                    "Loaded compilation state for {} source file(s)",
                    state.per_source.len()
                );
                state
            }
            Err(error) => {
                warn!(
                    "Discarding previous compilation state at {}: {error}",
                    self.path.display()
                );
                CompilationState::default()
            }
        }
    }

    fn read(&self) -> Result<CompilationState, StateError> {
        let bytes = std::fs::read(&self.path)?;
        let file: StateFile = bincode::deserialize(&bytes)?;
        if file.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION,
                found: file.version,
            });
        }
        if file.config_hash != self.config_hash {
            return Err(StateError::ConfigMismatch);
        }
        Ok(file.state)
    }

    /// Persist the new state, replacing any previous blob. The write goes
    /// through a sibling temp file and a rename so a crash cannot leave a
    /// torn state file behind.
    pub fn save(&self, state: &CompilationState) -> Result<(), StateError> {
        let file = StateFile {
            version: STATE_VERSION,
            config_hash: self.config_hash.clone(),
            state: state.clone(),
        };
        let bytes = bincode::serialize(&file)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, &bytes)?;
        std::fs::rename(&staging, &self.path)?;

        debug!(
            "Saved compilation state for {} source file(s)",
            state.per_source.len()
        );
        Ok(())
    }
}
