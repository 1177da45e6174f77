//! Application composition root
//!
//! A thin namespace holding configuration, the registry of model types and
//! an application-level event hub. Newly created model types are wired to
//! the application's default store.

use crate::error::{Error, Result};
use crate::events::EventHub;
use crate::model::ModelType;
use crate::schema::{Meta, Schema};
use crate::store::Store;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// REST transport options
#[derive(Debug, Clone)]
pub struct RestOptions {
    /// Base URL for the REST store
    pub base_url: String,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// REST transport options
    pub rest: RestOptions,
}

/// A central location for configuration and model management
pub struct Application {
    options: Options,
    models: RefCell<IndexMap<String, ModelType>>,
    default_store: RefCell<Option<Rc<dyn Store>>>,
    events: EventHub<Value>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Application {
    /// Create an application with the given options
    pub fn new(options: Options) -> Self {
        Self {
            options,
            models: RefCell::new(IndexMap::new()),
            default_store: RefCell::new(None),
            events: EventHub::new(),
        }
    }

    /// The application options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The application-level event hub
    pub fn events(&self) -> &EventHub<Value> {
        &self.events
    }

    /// Set the store wired into model types created after this call
    pub fn set_default_store(&self, store: Rc<dyn Store>) {
        *self.default_store.borrow_mut() = Some(store);
    }

    /// Define and register a model type under its meta name.
    ///
    /// Fails when a model of that name already exists. The default store,
    /// when configured, is wired into the new type.
    pub fn create_model(&self, schema: Schema, meta: Meta) -> Result<ModelType> {
        let name = meta.name.clone();
        if self.models.borrow().contains_key(&name) {
            return Err(Error::Configuration(format!(
                "attempting to redefine the model '{name}'"
            )));
        }
        let model = ModelType::new(schema, meta);
        if let Some(store) = self.default_store.borrow().clone() {
            model.set_store(store);
        }
        self.models.borrow_mut().insert(name, model.clone());
        Ok(model)
    }

    /// Look up a registered model type by name
    pub fn model(&self, name: &str) -> Option<ModelType> {
        self.models.borrow().get(name).cloned()
    }
}
