// School administration core. The presentation layer (forms, tables,
// document export) lives outside this crate and talks to the modules
// below; everything here returns Result and never panics across the
// boundary.
//
// Data flow:
// 1. Caller submits a plain payload to a core operation
// 2. The operation validates and applies business rules
// 3. Durable write through the RecordStore boundary
// 4. Derived aggregates (balance, point totals, tallies) are
//    recomputed fresh from the store

pub mod attendance;
pub mod error;
pub mod infraction;
pub mod ledger;
pub mod model;
pub mod registry;
pub mod report;
pub mod sample_data;
pub mod store;

pub use error::CoreError;
pub use store::{MemoryStore, PgStore, RecordStore, StoreError};
