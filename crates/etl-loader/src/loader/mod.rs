//! Loading module.
//!
//! Schema creation and batched bulk copy into a [`BulkDestination`].

pub mod bulk;
mod destination;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use bulk::{BatchError, BulkLoader, LoadReport, LoadState};
pub use destination::{BulkDestination, DestinationError};
pub use memory::MemoryDestination;
pub use postgres::PostgresDestination;
pub use schema::{SchemaInferencer, SchemaOutcome};
