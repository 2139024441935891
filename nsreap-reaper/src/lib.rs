//! Collection of descendant state changes
//!
//! This crate provides the asynchronous child-state reaper, the ledger
//! that hands each owed exit status out exactly once, and registration
//! as child subreaper.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod ledger;
pub mod provider;
pub mod reaper;
pub mod subreaper;

pub use ledger::ExitLedger;
pub use provider::{Collection, MockProvider, ProcessStateProvider, SystemWaiter};
pub use reaper::{DrainReport, Reaper};
pub use subreaper::Subreaper;

// Re-export commonly used types
pub use nsreap_core::{ChildState, ProcessRecord, StateChange};
