mod model;
mod store;

pub use model::KvEntryDB;
pub use store::SqliteStore;
