//! User profile and preferences, synced through the `users` table.

mod profile_model;
mod profile_service;

pub use profile_model::*;
pub use profile_service::*;
