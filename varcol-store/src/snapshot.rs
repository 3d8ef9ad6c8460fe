use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::store::StoreError;

static SNAPSHOT_FILE: &str = "store.varcol";
static SNAPSHOT_TMP_FILE: &str = "store.varcol.tmp";

/// The paths within a store directory.
///
/// ```text
/// base_path/
/// └── store.varcol
/// ```
///
/// `store.varcol` holds the schema, config and column segments of the
/// store. It is replaced atomically by writing `store.varcol.tmp` first
/// and renaming it over the old snapshot.
pub(crate) struct StorePaths {
    snapshot_path: PathBuf,
    tmp_path: PathBuf,
    base_path: PathBuf,
}

impl StorePaths {
    pub(crate) fn from_base(base_path: PathBuf) -> Self {
        Self {
            snapshot_path: base_path.join(SNAPSHOT_FILE),
            tmp_path: base_path.join(SNAPSHOT_TMP_FILE),
            base_path,
        }
    }

    pub(crate) fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub(crate) fn snapshot_exists(&self) -> io::Result<bool> {
        self.snapshot_path.try_exists()
    }

    pub(crate) fn guess_store_name(&self) -> String {
        if let Some(dir) = self.base_path.file_name() {
            dir.to_string_lossy().to_string()
        } else {
            self.base_path.display().to_string()
        }
    }

    pub(crate) fn ensure_base_path_exists(&self) -> io::Result<()> {
        if self.base_path.try_exists()? {
            return Ok(());
        }

        info!(path = %self.base_path.display(), "Create store path");
        std::fs::create_dir_all(self.base_path.as_path())?;

        Ok(())
    }

    /// Writes a new snapshot, replacing the previous one.
    pub(crate) fn write_snapshot<T: Serialize>(&self, state: &T) -> Result<(), StoreError> {
        let encoded = rmp_serde::to_vec_named(state)?;
        std::fs::write(&self.tmp_path, &encoded)?;
        std::fs::rename(&self.tmp_path, &self.snapshot_path)?;

        debug!(path = %self.snapshot_path.display(), size = encoded.len(), "Wrote snapshot");
        Ok(())
    }

    /// Reads the current snapshot.
    pub(crate) fn read_snapshot<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let encoded = std::fs::read(&self.snapshot_path)?;
        let state = rmp_serde::from_slice(&encoded)?;

        debug!(path = %self.snapshot_path.display(), size = encoded.len(), "Read snapshot");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_paths_resolve_to_correct_layout() {
        let base_path = std::env::temp_dir().join("test-store");
        let paths = StorePaths::from_base(base_path.clone());
        assert_eq!(paths.snapshot_path, base_path.join(SNAPSHOT_FILE));
        assert_eq!(paths.tmp_path, base_path.join(SNAPSHOT_TMP_FILE));
        assert_eq!(paths.guess_store_name(), "test-store");
    }

    #[test]
    fn test_snapshot_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::from_base(dir.path().join("nested"));
        paths.ensure_base_path_exists().unwrap();
        assert!(!paths.snapshot_exists().unwrap());

        let first = BTreeMap::from([("a".to_string(), 1u32)]);
        paths.write_snapshot(&first).unwrap();
        assert!(paths.snapshot_exists().unwrap());

        let second = BTreeMap::from([("b".to_string(), 2u32)]);
        paths.write_snapshot(&second).unwrap();

        let loaded: BTreeMap<String, u32> = paths.read_snapshot().unwrap();
        assert_eq!(loaded, second);
        assert!(!paths.tmp_path.exists(), "Temporary file should be renamed");
    }
}
