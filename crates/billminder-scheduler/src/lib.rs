//! # BillMinder Scheduler
//!
//! Decides which recurring bills need a reminder today, runs one dispatch
//! pass per day at a fixed local hour, and records every send attempt.
//!
//! ## Architecture
//! ```text
//! DispatchScheduler (one armed tokio timer, 06:00 local)
//!   ├── catch-up: slot already open and nothing sent today → run now
//!   └── on fire → DispatchEngine::run_check
//!                   ├── due::reminders(obligations, now)
//!                   ├── minus today's successful log entries (same recipient)
//!                   ├── Notifier::send, one by one, fixed pause between sends
//!                   └── StateStore: append log entries, update bookkeeping
//! ```

pub mod clock;
pub mod due;
pub mod engine;
pub mod persistence;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{DEFAULT_SEND_DELAY, DispatchEngine, RunReport};
pub use persistence::SqliteStateStore;
pub use scheduler::{
    DEFAULT_DISPATCH_HOUR, DispatchScheduler, SchedulerHandle, Wake, plan_next_wake, watch_ledger,
};
pub use store::{JsonStateStore, MemoryStateStore, StateStore};
