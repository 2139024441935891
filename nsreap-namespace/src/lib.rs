//! Namespace management for the isolated process tree
//!
//! This crate covers the namespace side of nsreap:
//! - Namespace set resolution (`NamespaceConfig`)
//! - Namespace handles resolved through `/proc/<pid>/ns`
//! - Launching a command in new namespaces on a dedicated stack
//! - Re-entering an existing PID namespace to exercise orphan adoption

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod bridge;
pub mod config;
pub mod handle;
pub mod launcher;

pub use bridge::{Bridge, BridgeTiming, Flow, Stage};
pub use config::{NamespaceConfig, NamespaceKind};
pub use handle::{NamespaceHandle, NamespaceProvider, ProcfsNamespaces};
pub use launcher::{ChildStack, Launcher};
