// ABOUTME: Scheduler module binding flow runs to cron schedules
// ABOUTME: Re-exports the binding, its job types, cron helpers, and errors

pub mod binding;
pub mod cron;
pub mod error;

pub use binding::{
    JobEntry, JobEvent, JobEventKind, JobHandle, SchedulerBinding, SchedulerConfig,
};
pub use self::cron::{next_fire_times, next_fire_times_after, normalize_cron_expression, parse_cron};
pub use error::{Result, SchedulerError};
