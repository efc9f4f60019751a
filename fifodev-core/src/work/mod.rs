//! Deferred copy work.
//!
//! Devices that use the deferred access path hand each read or write to a
//! [`WorkScheduler`] as a [`WorkItem`] and wait for it to settle.

mod item;
mod scheduler;

pub use item::{Completion, TransferKind, WorkItem, WorkStatus};
pub use scheduler::{Direction, SchedulerConfig, WorkScheduler};
