pub mod generation;
pub mod scheduler;

pub use scheduler::{Completion, Scheduler};
