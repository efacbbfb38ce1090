pub mod scheduler;

pub use scheduler::{AbortInput, PeriodHook, Scheduler, SchedulerStats};
