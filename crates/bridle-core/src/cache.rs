//! Identity cache of live model instances
//!
//! One cache exists per model type. It guarantees at most one live
//! instance per primary-key value: stores deserializing persisted rows go
//! through [`ModelCache::get_or_create`], so repeated fetches hand back the
//! same instance. An instance is cached exactly while it has a non-empty
//! primary key and has not been removed.

use crate::error::Result;
use crate::model::{Instance, ModelType};
use crate::store::{Query, Store};
use crate::value::{Value, ValueMap};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

#[derive(Default)]
struct CacheInner {
    /// Instances by canonical primary-key string, one entry per key
    by_id: IndexMap<String, Instance>,
    /// Instances in insertion order; iteration order for `all`
    order: Vec<Instance>,
}

/// Identity map of the live instances of one model type
#[derive(Default)]
pub struct ModelCache {
    inner: RefCell<CacheInner>,
}

impl ModelCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The cached instance for a primary-key string, if any
    pub fn get(&self, id: &str) -> Option<Instance> {
        self.inner.borrow().by_id.get(id).cloned()
    }

    /// The cached instance for the primary key present in `fields`, or a
    /// newly constructed instance with those fields and the given stored
    /// flag (which registers itself per the construction rules).
    pub fn get_or_create(
        &self,
        model: &ModelType,
        fields: ValueMap,
        stored: bool,
    ) -> Result<Instance> {
        let key = fields
            .get(&model.meta().primary_key)
            .and_then(Value::as_key);
        if let Some(existing) = key.as_deref().and_then(|k| self.get(k)) {
            return Ok(existing);
        }
        model.instantiate(fields, stored)
    }

    /// Register an instance under its current primary key.
    ///
    /// No-op when the instance has no key or the key is already occupied.
    pub fn add(&self, instance: &Instance) {
        let Some(key) = instance.cache_key() else {
            return;
        };
        let mut cache = self.inner.borrow_mut();
        if cache.by_id.contains_key(&key) {
            return;
        }
        trace!(key = %key, "cache add");
        cache.by_id.insert(key, instance.clone());
        if !cache.order.iter().any(|e| e.ptr_eq(instance)) {
            cache.order.push(instance.clone());
        }
    }

    /// Drop an instance's entry. No-op when its key is absent or held by a
    /// different instance.
    pub fn remove(&self, instance: &Instance) {
        let Some(key) = instance.cache_key() else {
            return;
        };
        let mut cache = self.inner.borrow_mut();
        if cache.by_id.get(&key).is_some_and(|e| e.ptr_eq(instance)) {
            trace!(key = %key, "cache remove");
            cache.by_id.shift_remove(&key);
            cache.order.retain(|e| !e.ptr_eq(instance));
        }
    }

    /// Move an instance's entry from `old_key` to its current key. Called
    /// by `Instance::set` when the primary-key field changes, before the
    /// change event fires.
    pub(crate) fn rekey(&self, old_key: Option<&str>, instance: &Instance) {
        let mut cache = self.inner.borrow_mut();
        if let Some(old) = old_key {
            if cache.by_id.get(old).is_some_and(|e| e.ptr_eq(instance)) {
                cache.by_id.shift_remove(old);
            }
        }
        match instance.cache_key() {
            Some(new_key) => {
                if cache.by_id.contains_key(&new_key) {
                    // The new key is held by another instance; this one
                    // leaves the cache entirely rather than shadowing it
                    cache.order.retain(|e| !e.ptr_eq(instance));
                } else {
                    cache.by_id.insert(new_key, instance.clone());
                    if !cache.order.iter().any(|e| e.ptr_eq(instance)) {
                        cache.order.push(instance.clone());
                    }
                }
            }
            // Losing the primary key means leaving the cache entirely
            None => cache.order.retain(|e| !e.ptr_eq(instance)),
        }
    }

    /// Every cached instance, in insertion order
    pub fn all(&self) -> Vec<Instance> {
        self.inner.borrow().order.clone()
    }

    /// Number of cached instances
    pub fn len(&self) -> usize {
        self.inner.borrow().order.len()
    }

    /// Whether the cache holds no instances
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().order.is_empty()
    }

    /// Empty the cache. With `mark_deleted`, every cached instance
    /// transitions to deleted first, each firing its own delete
    /// notification.
    pub fn clear(&self, mark_deleted: bool) {
        if mark_deleted {
            for instance in self.all() {
                instance.mark_deleted();
            }
        }
        let mut cache = self.inner.borrow_mut();
        cache.by_id.clear();
        cache.order.clear();
    }

    /// Persist every dirty cached instance through `store`, creating or
    /// updating by its stored flag. Runs as a parallel fan-out with a
    /// single aggregated completion; no ordering between instances.
    pub async fn save_all_dirty(&self, store: &Rc<dyn Store>) -> Result<()> {
        let dirty: Vec<Instance> = self.all().into_iter().filter(|i| i.is_dirty()).collect();
        let query = Query::new();
        let results = futures::future::join_all(dirty.iter().map(|instance| {
            let store = store.clone();
            let query = &query;
            async move {
                if instance.is_stored() {
                    store.update(instance, query).await?;
                } else {
                    store.create(instance, query).await?;
                }
                instance.mark_stored();
                Ok::<(), crate::error::Error>(())
            }
        }))
        .await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::ModelEvent;
    use crate::schema::{Meta, Schema};
    use futures::executor::block_on;

    fn pony_type() -> ModelType {
        ModelType::new(
            Schema::new().field("name").field("color"),
            Meta::new("Pony").primary_key("name"),
        )
    }

    fn pony(ty: &ModelType, name: &str) -> Instance {
        let mut fields = ValueMap::new();
        fields.insert("name".to_string(), Value::from(name));
        ty.instantiate(fields, false).unwrap()
    }

    #[test]
    fn test_instances_register_on_construction() {
        let ty = pony_type();
        let rarity = pony(&ty, "Rarity");
        assert!(ty.cache().get("Rarity").unwrap().ptr_eq(&rarity));

        // No primary key, no cache entry
        let anon = ty.instantiate(ValueMap::new(), false).unwrap();
        assert!(anon.cache_key().is_none());
        assert_eq!(ty.cache().len(), 1);
    }

    #[test]
    fn test_primary_key_change_moves_cache_entry() {
        let ty = pony_type();
        let inst = pony(&ty, "Rainbow Dash");

        inst.set("name", "Daring Do").unwrap();
        assert!(ty.cache().get("Rainbow Dash").is_none());
        assert!(ty.cache().get("Daring Do").unwrap().ptr_eq(&inst));
    }

    #[test]
    fn test_rekey_happens_before_change_event() {
        let ty = pony_type();
        let inst = pony(&ty, "old");

        let observed = Rc::new(RefCell::new(None));
        let sink = observed.clone();
        let ty_ref = ty.clone();
        inst.on(
            "change.name",
            Rc::new(move |_: &ModelEvent| {
                *sink.borrow_mut() = Some(ty_ref.cache().get("new").is_some());
            }),
        );

        inst.set("name", "new").unwrap();
        assert_eq!(*observed.borrow(), Some(true));
    }

    #[test]
    fn test_rekey_collision_evicts_the_loser_entirely() {
        let ty = pony_type();
        let keeper = pony(&ty, "Twilight Sparkle");
        let loser = pony(&ty, "Pinkie Pie");
        assert_eq!(ty.cache().len(), 2);

        // Renaming onto an occupied key never displaces the holder; the
        // renamed instance leaves both the id map and the iteration order
        loser.set("name", "Twilight Sparkle").unwrap();
        assert!(ty.cache().get("Twilight Sparkle").unwrap().ptr_eq(&keeper));
        assert!(ty.cache().get("Pinkie Pie").is_none());
        assert_eq!(ty.cache().len(), 1);
        assert!(ty.cache().all().iter().all(|i| !i.ptr_eq(&loser)));
    }

    #[test]
    fn test_gaining_a_primary_key_joins_the_cache() {
        let ty = pony_type();
        let inst = ty.instantiate(ValueMap::new(), false).unwrap();
        assert!(ty.cache().is_empty());

        inst.set("name", "Spike").unwrap();
        assert!(ty.cache().get("Spike").unwrap().ptr_eq(&inst));

        inst.set("name", Value::Null).unwrap();
        assert!(ty.cache().is_empty());
    }

    #[test]
    fn test_add_is_idempotent_and_never_overwrites() {
        let ty = pony_type();
        let first = pony(&ty, "Twilight Sparkle");
        ty.cache().add(&first);
        assert_eq!(ty.cache().len(), 1);

        // A second instance with the same key does not displace the first
        let mut fields = ValueMap::new();
        fields.insert("name".to_string(), Value::from("Twilight Sparkle"));
        let imposter = ty.instantiate(fields, false).unwrap();
        assert!(ty.cache().get("Twilight Sparkle").unwrap().ptr_eq(&first));
        assert!(!ty.cache().get("Twilight Sparkle").unwrap().ptr_eq(&imposter));
    }

    #[test]
    fn test_get_or_create_returns_the_same_instance() {
        let ty = pony_type();
        let mut fields = ValueMap::new();
        fields.insert("name".to_string(), Value::from("Pinkie Pie"));
        fields.insert("color".to_string(), Value::from("pink"));

        let first = ty.get_or_create(fields.clone(), true).unwrap();
        let second = ty.get_or_create(fields, true).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(ty.cache().len(), 1);
    }

    #[test]
    fn test_all_preserves_insertion_order() {
        let ty = pony_type();
        let names = ["Applejack", "Fluttershy", "Rarity"];
        for name in names {
            pony(&ty, name);
        }
        let cached: Vec<String> = ty
            .cache()
            .all()
            .iter()
            .map(|i| i.get("name").unwrap().to_string())
            .collect();
        assert_eq!(cached, names);
    }

    #[test]
    fn test_clear_marks_deleted() {
        let ty = pony_type();
        let a = pony(&ty, "a");
        let b = pony(&ty, "b");

        let deletions = Rc::new(RefCell::new(0));
        for inst in [&a, &b] {
            let sink = deletions.clone();
            inst.on("delete", Rc::new(move |_: &ModelEvent| *sink.borrow_mut() += 1));
        }

        ty.cache().clear(true);
        assert_eq!(*deletions.borrow(), 2);
        assert!(a.is_deleted() && b.is_deleted());
        assert!(ty.cache().is_empty());
    }

    #[test]
    fn test_clear_without_marking() {
        let ty = pony_type();
        let a = pony(&ty, "a");
        ty.cache().clear(false);
        assert!(!a.is_deleted());
        assert!(ty.cache().is_empty());
    }

    /// Store double counting creates and updates
    #[derive(Default)]
    struct CountingStore {
        creates: RefCell<usize>,
        updates: RefCell<usize>,
        fail: bool,
    }

    #[async_trait::async_trait(?Send)]
    impl Store for CountingStore {
        async fn get(&self, _m: &ModelType, _q: &Query) -> Result<Vec<Instance>> {
            Ok(Vec::new())
        }

        async fn get_by_id(&self, _m: &ModelType, id: &Value, _q: &Query) -> Result<Instance> {
            Err(Error::NotFound(id.to_string()))
        }

        async fn create(&self, _i: &Instance, _q: &Query) -> Result<()> {
            if self.fail {
                return Err(Error::Request("boom".to_string()));
            }
            *self.creates.borrow_mut() += 1;
            Ok(())
        }

        async fn update(&self, _i: &Instance, _q: &Query) -> Result<()> {
            *self.updates.borrow_mut() += 1;
            Ok(())
        }

        async fn remove(&self, _i: &Instance, _q: &Query) -> Result<()> {
            Ok(())
        }

        async fn clear(&self, _m: &ModelType, _q: &Query) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_save_all_dirty() {
        let ty = pony_type();
        let fresh = pony(&ty, "fresh");
        let stored_clean = {
            let mut fields = ValueMap::new();
            fields.insert("name".to_string(), Value::from("clean"));
            ty.instantiate(fields, true).unwrap()
        };
        let stored_dirty = {
            let mut fields = ValueMap::new();
            fields.insert("name".to_string(), Value::from("touched"));
            let inst = ty.instantiate(fields, true).unwrap();
            inst.set("color", "grey").unwrap();
            inst
        };

        let store: Rc<dyn Store> = Rc::new(CountingStore::default());
        block_on(ty.cache().save_all_dirty(&store)).unwrap();

        assert!(fresh.is_stored() && !fresh.is_dirty());
        assert!(stored_clean.is_stored());
        assert!(stored_dirty.is_stored() && !stored_dirty.is_dirty());
    }

    #[test]
    fn test_save_all_dirty_counts_operations() {
        let ty = pony_type();
        pony(&ty, "fresh");
        {
            let mut fields = ValueMap::new();
            fields.insert("name".to_string(), Value::from("touched"));
            let inst = ty.instantiate(fields, true).unwrap();
            inst.set("color", "grey").unwrap();
        }

        let counting = Rc::new(CountingStore::default());
        let store: Rc<dyn Store> = counting.clone();
        block_on(ty.cache().save_all_dirty(&store)).unwrap();
        assert_eq!(*counting.creates.borrow(), 1);
        assert_eq!(*counting.updates.borrow(), 1);
    }

    #[test]
    fn test_save_all_dirty_surfaces_failures() {
        let ty = pony_type();
        pony(&ty, "doomed");

        let store: Rc<dyn Store> = Rc::new(CountingStore {
            fail: true,
            ..Default::default()
        });
        let err = block_on(ty.cache().save_all_dirty(&store)).unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }
}
