//! PTZ button module
//!
//! Maps UI button presses onto device commands with click-to-step and
//! hold-to-move behavior.

mod binding;
mod dispatcher;

pub use binding::{default_bindings, Binding};
pub use dispatcher::{GestureDispatcher, GestureInput, DEFAULT_SETTLE_DELAY_MS};
