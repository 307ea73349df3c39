//! Local key-value storage and the feature-facing storage handle.

mod handle;
mod memory;

pub use handle::*;
pub use memory::*;
