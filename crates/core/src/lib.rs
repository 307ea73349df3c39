//! MizanFlow core: domain models, local-first sync and the budget/schedule
//! services built on top of it.

pub mod budget;
pub mod config;
pub mod context;
pub mod errors;
pub mod profile;
pub mod schedule;
pub mod storage;
pub mod sync;

pub use errors::{Error, RemoteStoreError, Result};
