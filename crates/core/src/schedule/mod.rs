//! Daily schedule items (prayer, work, personal) and reminder planning.

mod recurrence;
mod reminders;
mod schedule_model;
mod schedule_service;

pub use recurrence::*;
pub use reminders::*;
pub use schedule_model::*;
pub use schedule_service::*;
