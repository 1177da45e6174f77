//! Bridle core - observable client-side data modeling
//!
//! This crate provides the core types of the modeling layer:
//! - Named-event pub/sub (`EventHub`) with one-shot, late-bound and
//!   catch-all subscriptions
//! - Dynamic field values (`Value`, `ValueMap`)
//! - Schema-typed observable records (`ModelType`, `Instance`) with
//!   dirty/stored/deleted lifecycle tracking
//! - A per-type identity cache (`ModelCache`) guaranteeing one live
//!   instance per primary key
//! - The pluggable persistence contract (`Store`)
//! - A thin application composition root (`Application`)
//!
//! Everything is single-threaded and cooperative: handles are `Rc`-based,
//! event dispatch is synchronous, and store operations are `async` so that
//! synchronous and asynchronous backends look identical to callers.

mod app;
mod cache;
mod error;
mod events;
pub mod model;
mod schema;
mod store;
mod value;

pub use app::{Application, Options, RestOptions};
pub use cache::ModelCache;
pub use error::{Error, Result};
pub use events::{AllCallback, Callback, EventHub};
pub use model::{Instance, ModelEvent, ModelType};
pub use schema::{Meta, Schema, Validator};
pub use store::{Query, Store};
pub use value::{map_from_json, map_to_json, Value, ValueMap};
