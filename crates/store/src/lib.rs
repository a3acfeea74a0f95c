//! cla-sync persistence adapter.
//!
//! [`MemoryStore`] implements [`reconcile::OrganizationStore`] and
//! [`reconcile::RepositoryStore`] over records held in memory. It can be
//! seeded from a JSON [`Snapshot`] so the CLI can replay a change batch
//! against a known state, and it is the store used by the engine's tests.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Only the field updates the ports allow are
//! supported; everything else about a record is read-only.

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::{Snapshot, SnapshotError};
