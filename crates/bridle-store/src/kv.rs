//! Synchronous string-keyed key-value surfaces
//!
//! The local store persists model rows through the [`KeyValue`] trait:
//! a flat namespace of string keys holding JSON text. Two implementations
//! are provided, an in-memory map and a `native_db`-backed table.

use bridle_core::{Error, Result};
use indexmap::IndexMap;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use std::sync::LazyLock;

/// A synchronous string-keyed persistent key-value surface
pub trait KeyValue {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the entry under `key`; returns whether one existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Every stored key, in a stable order usable for prefix scans
    fn keys(&self) -> Result<Vec<String>>;

    /// Number of stored entries
    fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }
}

/// In-memory key-value surface, mainly for tests and demos
#[derive(Default)]
pub struct MemoryKv {
    entries: RefCell<IndexMap<String, String>>,
}

impl MemoryKv {
    /// Create an empty surface
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValue for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.borrow_mut().shift_remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Stored key-value row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
struct KvRecord {
    /// Full storage key, `<namespace>.<model>.<pk>`
    #[primary_key]
    key: String,
    /// JSON text of the row's field-object
    value: String,
}

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<KvRecord>().unwrap();
    models
});

/// Persistent key-value surface backed by `native_db`
pub struct NativeKv {
    db: Database<'static>,
}

impl NativeKv {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path.as_ref())
            .map_err(storage_err)?;
        Ok(Self { db })
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(storage_err)?;
        Ok(Self { db })
    }
}

impl KeyValue for NativeKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let r = self.db.r_transaction().map_err(storage_err)?;
        let record: Option<KvRecord> = r.get().primary(key.to_string()).map_err(storage_err)?;
        Ok(record.map(|r| r.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let rw = self.db.rw_transaction().map_err(storage_err)?;
        rw.upsert(KvRecord {
            key: key.to_string(),
            value: value.to_string(),
        })
        .map_err(storage_err)?;
        rw.commit().map_err(storage_err)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let rw = self.db.rw_transaction().map_err(storage_err)?;
        let record: Option<KvRecord> = rw.get().primary(key.to_string()).map_err(storage_err)?;
        let existed = match record {
            Some(record) => {
                rw.remove(record).map_err(storage_err)?;
                true
            }
            None => false,
        };
        rw.commit().map_err(storage_err)?;
        Ok(existed)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let r = self.db.r_transaction().map_err(storage_err)?;
        let scan = r.scan().primary::<KvRecord>().map_err(storage_err)?;
        let iter = scan.all().map_err(storage_err)?;
        let records: std::result::Result<Vec<KvRecord>, _> = iter.collect();
        let records = records.map_err(storage_err)?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }
}

fn storage_err(err: impl ToString) -> Error {
    Error::Storage(err.to_string())
}
