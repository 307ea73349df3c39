//! Budget items, categories and savings goals.

mod budget_model;
mod budget_service;

pub use budget_model::*;
pub use budget_service::*;
