//! Storage abstractions for approval workflow state.
//!
//! This crate defines the storage contract the engine requires:
//! - definitions: immutable once inserted, unique by code
//! - instances: atomic read-modify-write guarded by an optimistic
//!   version check, written together with their log row
//! - approval logs: append-only, never updated or deleted
//!
//! Design stance:
//! - A transactional backend remains the source of truth in production.
//! - The in-memory adapter is deterministic and test-friendly, and
//!   enforces the same invariants (one pending instance per business
//!   key, version-checked updates) a relational backend would.

#![deny(unsafe_code)]

mod error;
pub mod memory;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryWorkflowStore;
pub use traits::{DefinitionStore, InstanceStore, LogStore, Page, QueryWindow, WorkflowStore};
