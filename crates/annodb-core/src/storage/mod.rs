//! Storage layer
//!
//! SQLite holds every document, label and annotation. Export files are
//! written through [`atomic_write`] so a failed export never leaves a
//! half-written file behind.

pub mod atomic;
pub mod schema;
pub mod store;

pub use atomic::atomic_write;
pub use schema::{init_schema, is_compatible, needs_init, APPLICATION_ID, SCHEMA_VERSION};
pub use store::{LabelPut, NamedAnnotation, Store, StoreTarget};
