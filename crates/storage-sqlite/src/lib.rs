//! SQLite-backed local store for MizanFlow.
//!
//! The device cache is a single key-value table. Reads go through an r2d2
//! pool; every write is funnelled through one writer thread so SQLite never
//! sees two concurrent writers.

pub mod db;
pub mod errors;
pub mod kv;
pub mod schema;

pub use db::{create_pool, get_connection, init, run_migrations, DbPool, WriteHandle};
pub use errors::StorageError;
pub use kv::SqliteStore;
