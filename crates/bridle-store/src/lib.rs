//! Bridle store - persistence backends for the modeling layer
//!
//! Two implementations of the [`bridle_core::Store`] contract:
//! - [`LocalStore`] over a synchronous string-keyed [`KeyValue`] surface
//!   ([`MemoryKv`] or the `native_db`-backed [`NativeKv`])
//! - [`RestStore`] speaking JSON over HTTP via `reqwest`
//!
//! Both deserialize persisted rows through the model's identity cache, so
//! a repeated fetch hands back the same live instance.

mod kv;
mod local;
mod rest;

pub use kv::{KeyValue, MemoryKv, NativeKv};
pub use local::LocalStore;
pub use rest::RestStore;
