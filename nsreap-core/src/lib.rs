//! nsreap core - shared types, errors and events
//!
//! This crate provides the process-tree vocabulary used throughout nsreap.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod state;
pub mod types;

pub use error::{Error, Result};
pub use events::ProcessEvent;
pub use state::{ChildState, SIGNAL_EXIT_BASE, StateChange};
pub use types::{CommandSpec, Lineage, ProcessId, ProcessRecord};
