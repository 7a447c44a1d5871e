//! Tasks: durable per-actor multi-step operations.

pub mod locks;
pub mod model;
pub mod step_data;
pub mod store;

pub use locks::ActorLocks;
pub use model::{AbandonedSnapshot, Task, TaskStatus, TaskType};
pub use step_data::StepData;
pub use store::TaskStore;
