//! Observable model types and instances
//!
//! A [`ModelType`] fixes a field schema and metadata once; [`Instance`]s of
//! it carry their own field values, lifecycle flags (stored/dirty/deleted)
//! and an owned [`EventHub`] firing change, valid/invalid and delete
//! notifications. Instances with a primary key register in the type's
//! identity cache, and `save`/`remove` delegate to the configured
//! [`Store`].

use crate::cache::ModelCache;
use crate::error::{Error, Result};
use crate::events::{AllCallback, Callback, EventHub};
use crate::schema::{Meta, Schema};
use crate::store::{Query, Store};
use crate::value::{Value, ValueMap};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Event names fired by model instances
pub mod event {
    /// Fired on every field mutation
    pub const CHANGE: &str = "change";
    /// Fired when a mutated field passes its validator
    pub const VALID: &str = "valid";
    /// Fired when a mutated field fails its validator
    pub const INVALID: &str = "invalid";
    /// Fired when an instance transitions to deleted
    pub const DELETE: &str = "delete";

    /// Per-field change event name, e.g. `change.color`
    pub fn change(field: &str) -> String {
        format!("{CHANGE}.{field}")
    }

    /// Per-field valid event name
    pub fn valid(field: &str) -> String {
        format!("{VALID}.{field}")
    }

    /// Per-field invalid event name
    pub fn invalid(field: &str) -> String {
        format!("{INVALID}.{field}")
    }
}

/// Payload carried by every model event
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// A field took a new value
    Change {
        /// The mutated field
        field: String,
        /// The value it now holds
        value: Value,
    },
    /// A mutated field passed its validator
    Valid {
        /// The validated field
        field: String,
    },
    /// A mutated field failed its validator
    Invalid {
        /// The failing field
        field: String,
    },
    /// The instance transitioned to deleted
    Deleted,
}

struct TypeInner {
    schema: Schema,
    meta: Meta,
    store: RefCell<Option<Rc<dyn Store>>>,
    cache: ModelCache,
}

/// A model type: schema + metadata fixed at creation, an identity cache of
/// live instances and an optional persistence backend.
///
/// Cheap to clone; clones share the same definition and cache.
#[derive(Clone)]
pub struct ModelType {
    inner: Rc<TypeInner>,
}

impl ModelType {
    /// Define a new model type
    pub fn new(schema: Schema, meta: Meta) -> Self {
        Self {
            inner: Rc::new(TypeInner {
                schema,
                meta,
                store: RefCell::new(None),
                cache: ModelCache::new(),
            }),
        }
    }

    /// The field schema shared by all instances
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// The type metadata
    pub fn meta(&self) -> &Meta {
        &self.inner.meta
    }

    /// The identity cache of live instances
    pub fn cache(&self) -> &ModelCache {
        &self.inner.cache
    }

    /// The configured persistence backend, if any
    pub fn store(&self) -> Option<Rc<dyn Store>> {
        self.inner.store.borrow().clone()
    }

    /// Configure the persistence backend used by `save` and `remove`
    pub fn set_store(&self, store: Rc<dyn Store>) {
        *self.inner.store.borrow_mut() = Some(store);
    }

    /// Construct an instance with the given fields.
    ///
    /// Every key in `fields` must be declared in the schema. The instance
    /// registers in the cache when a primary key is present, then fires one
    /// change event per present field so late and catch-all observers see
    /// the initial state. A fresh instance is dirty unless `stored`.
    pub fn instantiate(&self, fields: ValueMap, stored: bool) -> Result<Instance> {
        for name in fields.keys() {
            if !self.inner.schema.contains(name) {
                return Err(Error::Schema(name.clone()));
            }
        }
        let instance = Instance {
            inner: Rc::new(InstanceInner {
                ty: self.clone(),
                state: RefCell::new(InstanceState {
                    fields,
                    stored,
                    dirty: !stored,
                    deleted: false,
                }),
                hub: EventHub::new(),
            }),
        };
        self.inner.cache.add(&instance);
        instance.notify_all();
        Ok(instance)
    }

    /// The cached instance for the primary key in `fields`, or a newly
    /// constructed one. Delegates to [`ModelCache::get_or_create`].
    pub fn get_or_create(&self, fields: ValueMap, stored: bool) -> Result<Instance> {
        self.inner.cache.get_or_create(self, fields, stored)
    }

    /// Whether two handles refer to the same model type
    pub fn ptr_eq(&self, other: &ModelType) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.inner.meta.name)
            .field("schema", &self.inner.schema)
            .finish()
    }
}

struct InstanceState {
    fields: ValueMap,
    stored: bool,
    dirty: bool,
    deleted: bool,
}

struct InstanceInner {
    ty: ModelType,
    state: RefCell<InstanceState>,
    hub: EventHub<ModelEvent>,
}

/// A single record of a model type.
///
/// Cheap to clone; clones share field values, flags and the event hub.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

impl Instance {
    /// The model type this instance belongs to
    pub fn model(&self) -> &ModelType {
        &self.inner.ty
    }

    /// Whether two handles refer to the same instance
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a field value. Absent schema fields read as `Null`.
    pub fn get(&self, name: &str) -> Result<Value> {
        if !self.inner.ty.schema().contains(name) {
            return Err(Error::Schema(name.to_string()));
        }
        Ok(self.value_of(name))
    }

    /// Write a field value.
    ///
    /// Setting a field to a value equal to its current one is a no-op: no
    /// dirty flag, no events. Otherwise the instance becomes dirty and
    /// fires change (and valid/invalid) notifications. When the primary-key
    /// field changes, the cache entry moves from the old key to the new one
    /// before the change event fires. Deleted instances still accept
    /// writes but never become dirty and never touch the cache.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if !self.inner.ty.schema().contains(name) {
            return Err(Error::Schema(name.to_string()));
        }
        let is_pk = name == self.inner.ty.meta().primary_key;
        let (old_key, deleted) = {
            let mut state = self.inner.state.borrow_mut();
            let current = state.fields.get(name).cloned().unwrap_or(Value::Null);
            if current == value {
                return Ok(());
            }
            let old_key = if is_pk { current.as_key() } else { None };
            state.fields.insert(name.to_string(), value);
            let deleted = state.deleted;
            if !deleted {
                state.dirty = true;
            }
            (old_key, deleted)
        };
        if is_pk && !deleted {
            self.inner.ty.cache().rekey(old_key.as_deref(), self);
        }
        self.fire_change(name);
        Ok(())
    }

    /// Apply every schema-declared key in `fields` via [`Instance::set`];
    /// unknown keys are silently ignored.
    pub fn update(&self, fields: ValueMap) -> Result<()> {
        for (name, value) in fields {
            if self.inner.ty.schema().contains(&name) {
                self.set(&name, value)?;
            }
        }
        Ok(())
    }

    /// A snapshot of the current field values
    pub fn fields(&self) -> ValueMap {
        self.inner.state.borrow().fields.clone()
    }

    /// Names of present fields whose validator rejects the current value.
    /// Empty means valid. Always empty when the type does not validate.
    pub fn validate(&self) -> Vec<String> {
        if !self.inner.ty.meta().validates {
            return Vec::new();
        }
        self.fields()
            .keys()
            .filter(|name| !self.is_valid(name).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Whether the named field passes its validator. Fields without a
    /// validator are always valid.
    pub fn is_valid(&self, field: &str) -> Result<bool> {
        if !self.inner.ty.schema().contains(field) {
            return Err(Error::Schema(field.to_string()));
        }
        match self.inner.ty.schema().validator(field) {
            Some(validator) => Ok(validator(&self.value_of(field))),
            None => Ok(true),
        }
    }

    /// The current primary-key value
    pub fn primary_key(&self) -> Value {
        self.value_of(&self.inner.ty.meta().primary_key)
    }

    /// The canonical cache/storage key derived from the primary key
    pub fn cache_key(&self) -> Option<String> {
        self.primary_key().as_key()
    }

    /// Whether the instance exists in its store
    pub fn is_stored(&self) -> bool {
        self.inner.state.borrow().stored
    }

    /// Whether the instance has unsaved local changes
    pub fn is_dirty(&self) -> bool {
        self.inner.state.borrow().dirty
    }

    /// Whether the instance has been deleted (terminal)
    pub fn is_deleted(&self) -> bool {
        self.inner.state.borrow().deleted
    }

    /// Persist this instance through the configured store.
    ///
    /// Stored and clean: succeeds without contacting the store. Stored and
    /// dirty: delegates to the store's `update`. Unstored: delegates to
    /// `create`. Flags are updated before this returns. Deleted instances
    /// are inert and succeed without effect.
    ///
    /// Overlapping `save`/`remove` calls on one instance are not
    /// serialized; issue them sequentially.
    pub async fn save(&self, query: &Query) -> Result<()> {
        if self.is_deleted() {
            return Ok(());
        }
        let store = self.require_store()?;
        if self.is_stored() && !self.is_dirty() {
            return Ok(());
        }
        if self.is_stored() {
            store.update(self, query).await?;
        } else {
            store.create(self, query).await?;
        }
        self.mark_stored();
        debug!(model = %self.inner.ty.meta().name, key = ?self.cache_key(), "saved instance");
        Ok(())
    }

    /// Delete this instance.
    ///
    /// Stored instances are removed from the store first. Never-persisted
    /// instances complete synchronously without contacting the store.
    /// Either way the instance leaves the cache and transitions to deleted,
    /// firing a delete notification.
    pub async fn remove(&self, query: &Query) -> Result<()> {
        if self.is_deleted() {
            return Ok(());
        }
        let store = self.require_store()?;
        if self.is_stored() {
            store.remove(self, query).await?;
        }
        self.inner.ty.cache().remove(self);
        self.mark_deleted();
        debug!(model = %self.inner.ty.meta().name, key = ?self.cache_key(), "removed instance");
        Ok(())
    }

    /// Mark the instance as persisted and clean. Store implementations and
    /// `save` call this on successful completion.
    pub fn mark_stored(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.stored = true;
        state.dirty = false;
    }

    /// Transition to the terminal deleted state and fire the delete event
    pub fn mark_deleted(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.deleted = true;
            state.stored = false;
            state.dirty = false;
        }
        self.inner.hub.fire(event::DELETE, ModelEvent::Deleted);
    }

    /// The instance's event hub
    pub fn events(&self) -> &EventHub<ModelEvent> {
        &self.inner.hub
    }

    /// Bind a persistent listener (delegates to the hub)
    pub fn on(&self, names: &str, callback: Callback<ModelEvent>) -> &Self {
        self.inner.hub.on(names, callback);
        self
    }

    /// Unbind a listener
    pub fn off(&self, names: &str, callback: &Callback<ModelEvent>) -> &Self {
        self.inner.hub.off(names, callback);
        self
    }

    /// Bind a one-shot listener
    pub fn one(&self, names: &str, callback: Callback<ModelEvent>) -> &Self {
        self.inner.hub.one(names, callback);
        self
    }

    /// Bind a late listener
    pub fn late(&self, names: &str, callback: Callback<ModelEvent>) -> &Self {
        self.inner.hub.late(names, callback);
        self
    }

    /// Bind a catch-all listener
    pub fn all(&self, callback: AllCallback<ModelEvent>) -> &Self {
        self.inner.hub.all(callback);
        self
    }

    /// Fire one change event per present field, replaying current state to
    /// late and catch-all observers
    pub fn notify_all(&self) {
        let names: Vec<String> = self.inner.state.borrow().fields.keys().cloned().collect();
        for name in &names {
            self.fire_change(name);
        }
    }

    fn value_of(&self, name: &str) -> Value {
        self.inner
            .state
            .borrow()
            .fields
            .get(name)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn require_store(&self) -> Result<Rc<dyn Store>> {
        self.inner.ty.store().ok_or_else(|| {
            Error::Configuration(format!(
                "model '{}' has no store configured",
                self.inner.ty.meta().name
            ))
        })
    }

    fn fire_change(&self, field: &str) {
        let value = self.value_of(field);
        let change = ModelEvent::Change {
            field: field.to_string(),
            value,
        };
        self.inner.hub.fire(event::CHANGE, change.clone());
        self.inner.hub.fire(&event::change(field), change);

        if self.inner.ty.meta().validates {
            if self.is_valid(field).unwrap_or(true) {
                let valid = ModelEvent::Valid {
                    field: field.to_string(),
                };
                self.inner.hub.fire(event::VALID, valid.clone());
                self.inner.hub.fire(&event::valid(field), valid);
            } else {
                let invalid = ModelEvent::Invalid {
                    field: field.to_string(),
                };
                self.inner.hub.fire(event::INVALID, invalid.clone());
                self.inner.hub.fire(&event::invalid(field), invalid);
            }
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.inner.ty.meta().name)
            .field("fields", &self.inner.state.borrow().fields)
            .finish()
    }
}
