//! Model type definitions: field schemas and metadata

use crate::Value;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// A predicate validating a single field value
pub type Validator = Rc<dyn Fn(&Value) -> bool>;

/// The set of fields a model type allows, each with an optional validator.
///
/// Shared immutably across every instance of the model type.
#[derive(Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, Option<Validator>>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field without a validator
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    /// Declare a field with a validator predicate
    pub fn field_with(
        mut self,
        name: impl Into<String>,
        validator: impl Fn(&Value) -> bool + 'static,
    ) -> Self {
        self.fields.insert(name.into(), Some(Rc::new(validator)));
        self
    }

    /// Whether the schema declares the named field
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The validator for a field, if one is declared
    pub fn validator(&self, name: &str) -> Option<&Validator> {
        self.fields.get(name).and_then(Option::as_ref)
    }

    /// Declared field names, in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fields.keys()).finish()
    }
}

/// Metadata shared by every instance of a model type
#[derive(Debug, Clone)]
pub struct Meta {
    /// Model name, used for storage keys and REST paths
    pub name: String,
    /// The schema field holding the instance's identity
    pub primary_key: String,
    /// Whether field validators run on mutation
    pub validates: bool,
    /// Plural name for REST collection paths; defaults to the singular name
    pub plural_name: Option<String>,
}

impl Meta {
    /// Create metadata with the defaults: primary key `"id"`, validation on
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            validates: true,
            plural_name: None,
        }
    }

    /// Use a different schema field as the primary key
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Turn field validation on or off
    pub fn validates(mut self, validates: bool) -> Self {
        self.validates = validates;
        self
    }

    /// Set an explicit plural name
    pub fn plural_name(mut self, plural: impl Into<String>) -> Self {
        self.plural_name = Some(plural.into());
        self
    }

    /// Lower-cased collection name: the plural name when set, otherwise the
    /// singular model name
    pub fn collection_name(&self) -> String {
        self.plural_name
            .as_deref()
            .unwrap_or(&self.name)
            .to_lowercase()
    }
}
