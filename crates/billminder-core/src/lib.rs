//! # BillMinder Core
//!
//! Shared building blocks for the BillMinder workspace: the configuration
//! file, the error type and the domain records (obligations, dispatch log,
//! bookkeeping) that the scheduler and the channels exchange.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::BillMinderConfig;
pub use error::{BillMinderError, Result};
pub use traits::{Notifier, SendOutcome};
pub use types::{
    DispatchBookkeeping, DispatchLogEntry, DispatchStatus, DueReason, LedgerState, LogStatus,
    Obligation, Reminder,
};
