//! Local key-value model store
//!
//! Persists instances as JSON field-objects under
//! `<namespace>.<modelName>.<primaryKey>` keys in a [`KeyValue`] surface.
//! The backend is synchronous, but the store keeps the uniform async
//! `Store` contract so callers never special-case it.

use crate::kv::KeyValue;
use async_trait::async_trait;
use bridle_core::{map_from_json, map_to_json, Error, Instance, ModelType, Query, Result, Store, Value};
use tracing::debug;

const DEFAULT_NAMESPACE: &str = "bridle.models";

/// Model store over a synchronous key-value backend
pub struct LocalStore<K: KeyValue> {
    kv: K,
    namespace: String,
}

impl<K: KeyValue> LocalStore<K> {
    /// Create a store over `kv` with the default key namespace
    pub fn new(kv: K) -> Self {
        Self::with_namespace(kv, DEFAULT_NAMESPACE)
    }

    /// Create a store with an explicit key namespace
    pub fn with_namespace(kv: K, namespace: impl Into<String>) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
        }
    }

    /// The underlying key-value surface
    pub fn kv(&self) -> &K {
        &self.kv
    }

    fn model_prefix(&self, model: &ModelType) -> Result<String> {
        let name = &model.meta().name;
        if name.is_empty() {
            return Err(Error::Configuration(
                "models without names can't use local storage; set a name in the model's meta"
                    .to_string(),
            ));
        }
        Ok(format!("{}.{}.", self.namespace, name))
    }

    fn instance_key(&self, instance: &Instance) -> Result<String> {
        let key = instance.cache_key().ok_or_else(|| {
            Error::Configuration(
                "attempting to save an instance without a primary key".to_string(),
            )
        })?;
        Ok(format!("{}{}", self.model_prefix(instance.model())?, key))
    }

    fn write(&self, instance: &Instance) -> Result<()> {
        let key = self.instance_key(instance)?;
        let row = map_to_json(&instance.fields()).to_string();
        debug!(key = %key, "local store write");
        self.kv.set(&key, &row)
    }

    fn decode(&self, model: &ModelType, row: &str) -> Result<Instance> {
        let json: serde_json::Value =
            serde_json::from_str(row).map_err(|e| Error::Parse(e.to_string()))?;
        let fields =
            map_from_json(&json).ok_or_else(|| Error::Parse("expected a JSON object".to_string()))?;
        model.get_or_create(fields, true)
    }
}

#[async_trait(?Send)]
impl<K: KeyValue> Store for LocalStore<K> {
    async fn get(&self, model: &ModelType, _query: &Query) -> Result<Vec<Instance>> {
        let prefix = self.model_prefix(model)?;
        let mut instances = Vec::new();
        for key in self.kv.keys()? {
            if !key.starts_with(&prefix) {
                continue;
            }
            if let Some(row) = self.kv.get(&key)? {
                instances.push(self.decode(model, &row)?);
            }
        }
        Ok(instances)
    }

    async fn get_by_id(&self, model: &ModelType, id: &Value, _query: &Query) -> Result<Instance> {
        let id_key = id
            .as_key()
            .ok_or_else(|| Error::NotFound("empty primary key".to_string()))?;
        let key = format!("{}{}", self.model_prefix(model)?, id_key);
        match self.kv.get(&key)? {
            Some(row) => self.decode(model, &row),
            None => Err(Error::NotFound(key)),
        }
    }

    async fn create(&self, instance: &Instance, _query: &Query) -> Result<()> {
        self.write(instance)
    }

    async fn update(&self, instance: &Instance, _query: &Query) -> Result<()> {
        self.write(instance)
    }

    async fn remove(&self, instance: &Instance, _query: &Query) -> Result<()> {
        let key = self.instance_key(instance)?;
        debug!(key = %key, "local store delete");
        if self.kv.delete(&key)? {
            Ok(())
        } else {
            Err(Error::NotFound(key))
        }
    }

    async fn clear(&self, model: &ModelType, _query: &Query) -> Result<()> {
        let prefix = self.model_prefix(model)?;
        for key in self.kv.keys()? {
            if key.starts_with(&prefix) {
                self.kv.delete(&key)?;
            }
        }
        Ok(())
    }
}
