//! JSON file store for stage handoffs.
//!
//! Hosts, targets, and batches are kept as camelCase JSON arrays, one file
//! per kind, under a directory. Writes go to a uniquely named temp file that
//! is renamed over the destination, so readers never see a partial file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::core::{Batch, EngineError, Host, Target};

/// File holding the host list.
pub const HOSTS_FILE: &str = "hosts.json";
/// File holding the target list.
pub const TARGETS_FILE: &str = "targets.json";
/// File holding the batch list.
pub const BATCHES_FILE: &str = "batches.json";

/// Directory of handoff files.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// `EngineError::Io` when the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and validate the host list.
    ///
    /// # Errors
    ///
    /// `Io` for a missing file, `Serde` for malformed JSON, `InvalidInput` for
    /// a record that fails validation.
    pub fn load_hosts(&self) -> Result<Vec<Host>, EngineError> {
        let hosts: Vec<Host> = self.read(HOSTS_FILE)?;
        hosts.iter().try_for_each(Host::validate)?;
        Ok(hosts)
    }

    /// Load and validate the target list.
    ///
    /// # Errors
    ///
    /// As for [`JsonStore::load_hosts`].
    pub fn load_targets(&self) -> Result<Vec<Target>, EngineError> {
        let targets: Vec<Target> = self.read(TARGETS_FILE)?;
        targets.iter().try_for_each(Target::validate)?;
        Ok(targets)
    }

    /// Load and validate the batch list.
    ///
    /// # Errors
    ///
    /// As for [`JsonStore::load_hosts`].
    pub fn load_batches(&self) -> Result<Vec<Batch>, EngineError> {
        let batches: Vec<Batch> = self.read(BATCHES_FILE)?;
        batches.iter().try_for_each(Batch::validate)?;
        Ok(batches)
    }

    /// Replace the host list.
    ///
    /// # Errors
    ///
    /// `Io` or `Serde` when the file cannot be written.
    pub fn save_hosts(&self, hosts: &[Host]) -> Result<(), EngineError> {
        self.write(HOSTS_FILE, hosts)
    }

    /// Replace the target list.
    ///
    /// # Errors
    ///
    /// `Io` or `Serde` when the file cannot be written.
    pub fn save_targets(&self, targets: &[Target]) -> Result<(), EngineError> {
        self.write(TARGETS_FILE, targets)
    }

    /// Replace the batch list.
    ///
    /// # Errors
    ///
    /// `Io` or `Serde` when the file cannot be written.
    pub fn save_batches(&self, batches: &[Batch]) -> Result<(), EngineError> {
        self.write(BATCHES_FILE, batches)
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T, EngineError> {
        let path = self.dir.join(name);
        let file = File::open(&path)
            .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
        let value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| EngineError::Serde(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded handoff file");
        Ok(value)
    }

    fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), EngineError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()));
        let result = write_synced(&tmp, value).and_then(|()| fs::rename(&tmp, &path).map_err(EngineError::from));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        debug!(path = %path.display(), ok = result.is_ok(), "wrote handoff file");
        result
    }
}

fn write_synced<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), EngineError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| EngineError::Io(e.to_string()))?
        .sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> JsonStore {
        let dir = std::env::temp_dir().join(format!("batch-store-{}", uuid::Uuid::new_v4()));
        JsonStore::open(dir).unwrap()
    }

    #[test]
    fn test_hosts_persist() {
        let store = temp_store();
        let hosts = vec![Host::new("home", 32), Host::new("n1", 8)];
        store.save_hosts(&hosts).unwrap();
        assert_eq!(store.load_hosts().unwrap(), hosts);

        let raw = fs::read_to_string(store.dir().join(HOSTS_FILE)).unwrap();
        assert!(raw.contains("capacityAvailable"));
        fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let store = temp_store();
        assert!(matches!(store.load_targets(), Err(EngineError::Io(_))));
        fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn test_malformed_file_is_serde_error() {
        let store = temp_store();
        fs::write(store.dir().join(BATCHES_FILE), "[{").unwrap();
        assert!(matches!(store.load_batches(), Err(EngineError::Serde(_))));
        fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn test_invalid_host_rejected() {
        let store = temp_store();
        fs::write(
            store.dir().join(HOSTS_FILE),
            r#"[{"id":"h","capacityTotal":1,"capacityAvailable":5}]"#,
        )
        .unwrap();
        assert!(matches!(store.load_hosts(), Err(EngineError::InvalidInput(_))));
        fs::remove_dir_all(store.dir()).unwrap();
    }
}
