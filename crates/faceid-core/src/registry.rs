//! File-backed registry of identities.
//!
//! Records live in memory behind one `RwLock` and are persisted to two
//! positionally aligned JSON stores: one list of descriptors and one list of
//! names. Entry `i` of each store belongs to the same identity. Every append
//! rewrites both stores in full.
//!
//! The two renames are not atomic as a pair, so a crash or failure between
//! them can leave one store a record longer than the other. The stores are
//! append-only, so `open` repairs this by truncating to the shorter one.

use crate::types::{Descriptor, IdentityRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

pub const DESCRIPTORS_FILE: &str = "face_descriptors.json";
pub const NAMES_FILE: &str = "face_names.json";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: malformed store: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: serializing store: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("registry lock poisoned")]
    Poisoned,
}

/// The parallel columns. Only `Registry` touches them, always in lockstep.
#[derive(Default)]
struct Columns {
    descriptors: Vec<Descriptor>,
    names: Vec<String>,
}

/// Append-only identity registry.
pub struct Registry {
    descriptors_path: PathBuf,
    names_path: PathBuf,
    columns: RwLock<Columns>,
}

impl Registry {
    /// Open the registry stored in `dir`, creating the directory if needed.
    ///
    /// Missing stores mean an empty registry. A lone store or stores of
    /// different lengths are the remains of an interrupted append: the
    /// longer store is cut back to the last record both stores hold, and the
    /// repaired stores are written out again.
    pub fn open(dir: &Path) -> Result<Self, RegistryError> {
        fs::create_dir_all(dir).map_err(|source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let descriptors_path = dir.join(DESCRIPTORS_FILE);
        let names_path = dir.join(NAMES_FILE);

        let mut descriptors: Vec<Descriptor> = read_store_or_empty(&descriptors_path)?;
        let mut names: Vec<String> = read_store_or_empty(&names_path)?;
        let repaired = descriptors.len() != names.len();
        if repaired {
            let keep = descriptors.len().min(names.len());
            tracing::warn!(
                descriptors = descriptors.len(),
                names = names.len(),
                keep,
                "registry stores misaligned, dropping unconfirmed trailing records"
            );
            descriptors.truncate(keep);
            names.truncate(keep);
        }

        let registry = Self {
            descriptors_path,
            names_path,
            columns: RwLock::new(Columns { descriptors, names }),
        };
        if repaired {
            let columns = registry.columns.read().map_err(|_| RegistryError::Poisoned)?;
            registry.persist(&columns)?;
        }

        tracing::info!(
            identities = registry.len(),
            path = %dir.display(),
            "registry loaded"
        );
        Ok(registry)
    }

    /// Number of registered identities. Reads through a poisoned lock.
    pub fn len(&self) -> usize {
        self.columns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a record and persist the full registry.
    ///
    /// The write lock is held across persistence, so concurrent appends are
    /// serialized and each one sees every earlier one. If persistence fails
    /// the in-memory registry is left as it was. Returns the new length.
    pub fn append(&self, record: IdentityRecord) -> Result<usize, RegistryError> {
        let mut columns = self.columns.write().map_err(|_| RegistryError::Poisoned)?;

        columns.descriptors.push(record.descriptor);
        columns.names.push(record.name);

        if let Err(e) = self.persist(&columns) {
            columns.descriptors.pop();
            columns.names.pop();
            return Err(e);
        }

        Ok(columns.names.len())
    }

    /// A consistent, owned copy of every record in registration order.
    pub fn snapshot(&self) -> Result<Vec<IdentityRecord>, RegistryError> {
        let columns = self.columns.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(columns
            .names
            .iter()
            .zip(columns.descriptors.iter())
            .map(|(name, descriptor)| IdentityRecord::new(name.clone(), descriptor.clone()))
            .collect())
    }

    pub fn descriptors_path(&self) -> &Path {
        &self.descriptors_path
    }

    pub fn names_path(&self) -> &Path {
        &self.names_path
    }

    /// Write both stores to temp files first, then rename them into place.
    fn persist(&self, columns: &Columns) -> Result<(), RegistryError> {
        let descriptors_tmp = write_temp(&self.descriptors_path, &columns.descriptors)?;
        let names_tmp = write_temp(&self.names_path, &columns.names)?;

        rename(&descriptors_tmp, &self.descriptors_path)?;
        rename(&names_tmp, &self.names_path)?;

        tracing::debug!(identities = columns.names.len(), "registry persisted");
        Ok(())
    }
}

fn read_store<T: DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let file = File::open(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| RegistryError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn read_store_or_empty<T: DeserializeOwned + Default>(path: &Path) -> Result<T, RegistryError> {
    if path.exists() {
        read_store(path)
    } else {
        Ok(T::default())
    }
}

fn write_temp<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf, RegistryError> {
    let tmp = path.with_extension("json.tmp");
    let io_err = |source| RegistryError::Io {
        path: tmp.clone(),
        source,
    };

    let file = File::create(&tmp).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| RegistryError::Serialize {
        path: tmp.clone(),
        source,
    })?;
    writer.flush().map_err(io_err)?;
    writer.get_ref().sync_all().map_err(io_err)?;

    Ok(tmp)
}

fn rename(from: &Path, to: &Path) -> Result<(), RegistryError> {
    fs::rename(from, to).map_err(|source| RegistryError::Io {
        path: to.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(name: &str, seed: f32) -> IdentityRecord {
        IdentityRecord::new(name, Descriptor::new(vec![seed, seed + 1.0, seed + 2.0]))
    }

    #[test]
    fn test_open_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.snapshot().unwrap().is_empty());
        // Opening does not create the stores.
        assert!(!registry.descriptors_path().exists());
        assert!(!registry.names_path().exists());
    }

    #[test]
    fn test_open_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        Registry::open(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_append_persists_and_reloads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = Registry::open(dir.path()).unwrap();
            assert_eq!(registry.append(record("alice", 0.0)).unwrap(), 1);
            assert_eq!(registry.append(record("bob", 1.0)).unwrap(), 2);
            assert_eq!(registry.append(record("alice", 2.0)).unwrap(), 3);
        }

        let reopened = Registry::open(dir.path()).unwrap();
        let records = reopened.snapshot().unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "alice"]);
        assert_eq!(records[1], record("bob", 1.0));
    }

    #[test]
    fn test_stores_are_plain_parallel_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).unwrap();
        registry
            .append(IdentityRecord::new("carol", Descriptor::new(vec![0.5, -1.0])))
            .unwrap();

        let names = fs::read_to_string(registry.names_path()).unwrap();
        let descriptors = fs::read_to_string(registry.descriptors_path()).unwrap();
        assert_eq!(names, r#"["carol"]"#);
        assert_eq!(descriptors, "[[0.5,-1.0]]");
        assert!(!dir.path().join("face_names.json.tmp").exists());
    }

    #[test]
    fn test_open_truncates_longer_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DESCRIPTORS_FILE), "[[1.0],[2.0]]").unwrap();
        fs::write(dir.path().join(NAMES_FILE), r#"["alice"]"#).unwrap();

        let registry = Registry::open(dir.path()).unwrap();
        assert_eq!(
            registry.snapshot().unwrap(),
            vec![IdentityRecord::new("alice", Descriptor::new(vec![1.0]))]
        );
        // The repair is written back, so both stores agree on disk again.
        assert_eq!(fs::read_to_string(registry.descriptors_path()).unwrap(), "[[1.0]]");
        assert_eq!(fs::read_to_string(registry.names_path()).unwrap(), r#"["alice"]"#);
    }

    #[test]
    fn test_open_repairs_lone_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DESCRIPTORS_FILE), "[[1.0]]").unwrap();

        let registry = Registry::open(dir.path()).unwrap();
        assert!(registry.is_empty());
        assert_eq!(fs::read_to_string(registry.descriptors_path()).unwrap(), "[]");
        assert_eq!(fs::read_to_string(registry.names_path()).unwrap(), "[]");
    }

    #[test]
    fn test_interrupted_persist_recovers_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).unwrap();
        registry.append(record("alice", 0.0)).unwrap();

        // A non-empty directory in place of the names store lets the
        // descriptors rename land while the names rename fails.
        let names_path = registry.names_path().to_path_buf();
        let saved_names = fs::read(&names_path).unwrap();
        fs::remove_file(&names_path).unwrap();
        fs::create_dir(&names_path).unwrap();
        fs::write(names_path.join("blocker"), "x").unwrap();

        assert!(registry.append(record("bob", 1.0)).is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            fs::read_to_string(registry.descriptors_path()).unwrap(),
            "[[0.0,1.0,2.0],[1.0,2.0,3.0]]"
        );

        fs::remove_dir_all(&names_path).unwrap();
        fs::write(&names_path, saved_names).unwrap();
        drop(registry);

        let reopened = Registry::open(dir.path()).unwrap();
        assert_eq!(reopened.snapshot().unwrap(), vec![record("alice", 0.0)]);
        reopened.append(record("carol", 2.0)).unwrap();
        let names: Vec<String> = reopened.snapshot().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["alice", "carol"]);
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refuses to serialize"))
        }
    }

    #[test]
    fn test_serialize_failure_is_not_reported_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_temp(&dir.path().join(NAMES_FILE), &Unserializable).unwrap_err();
        assert!(matches!(err, RegistryError::Serialize { .. }));
        assert!(err.to_string().contains("serializing store"));
    }

    #[test]
    fn test_len_survives_poisoned_lock() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).unwrap());
        registry.append(record("alice", 0.0)).unwrap();

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.columns.write().unwrap();
            panic!("poison the registry lock");
        })
        .join();

        assert_eq!(registry.len(), 1);
        assert!(matches!(registry.snapshot(), Err(RegistryError::Poisoned)));
    }

    #[test]
    fn test_open_rejects_malformed_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DESCRIPTORS_FILE), "not json").unwrap();
        fs::write(dir.path().join(NAMES_FILE), "[]").unwrap();

        let err = Registry::open(dir.path()).err().unwrap();
        assert!(matches!(err, RegistryError::Malformed { .. }));
    }

    #[test]
    fn test_failed_persist_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).unwrap();
        registry.append(record("alice", 0.0)).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(dir.path().join("face_descriptors.json.tmp")).unwrap();
        assert!(registry.append(record("bob", 1.0)).is_err());

        assert_eq!(registry.len(), 1);
        let reopened = Registry::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        const WRITERS: usize = 16;
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.append(record(&format!("user-{i}"), i as f32)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), WRITERS);

        let reopened = Registry::open(dir.path()).unwrap();
        let records = reopened.snapshot().unwrap();
        assert_eq!(records.len(), WRITERS);
        // Alignment survives: each name still sits next to its own descriptor.
        for r in &records {
            let i: usize = r.name.trim_start_matches("user-").parse().unwrap();
            assert_eq!(r.descriptor.as_slice()[0], i as f32);
        }
    }
}
