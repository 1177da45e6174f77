//! The pluggable persistence contract
//!
//! Stores come in two flavors (a synchronous key-value backend and an
//! asynchronous REST backend) behind one uniformly-async trait, so callers
//! never special-case the backend. Every operation completes exactly once,
//! success or failure, through its returned `Result`; not-found conditions
//! are `Error::NotFound`, never a panic.

use crate::error::Result;
use crate::model::{Instance, ModelType};
use crate::value::{Value, ValueMap};
use async_trait::async_trait;

/// Opaque query parameters passed through to the backend.
///
/// The key-value backend ignores them; the REST backend appends them to the
/// request URL.
pub type Query = ValueMap;

/// A persistence backend for model instances.
///
/// `?Send` because the modeling layer is single-threaded (`Rc` handles,
/// cooperative scheduling).
#[async_trait(?Send)]
pub trait Store {
    /// Fetch every persisted instance of a model type
    async fn get(&self, model: &ModelType, query: &Query) -> Result<Vec<Instance>>;

    /// Fetch one instance by primary key; `Error::NotFound` when absent
    async fn get_by_id(&self, model: &ModelType, id: &Value, query: &Query) -> Result<Instance>;

    /// Persist a new instance
    async fn create(&self, instance: &Instance, query: &Query) -> Result<()>;

    /// Persist changes to an existing instance
    async fn update(&self, instance: &Instance, query: &Query) -> Result<()>;

    /// Delete a persisted instance; `Error::NotFound` when absent
    async fn remove(&self, instance: &Instance, query: &Query) -> Result<()>;

    /// Delete every persisted instance of a model type
    async fn clear(&self, model: &ModelType, query: &Query) -> Result<()>;
}
