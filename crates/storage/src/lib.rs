//! Repository interfaces the orchestration core consumes, plus in-memory
//! reference implementations, the code resolver, and the workflow
//! checkpoint store.
//!
//! Persistence for peripheral entities is deliberately out of scope: the
//! core only depends on the traits in [`repo`], and anything that can
//! satisfy them (SQL, document store, the in-memory maps here) plugs in.

pub mod checkpoint;
pub mod codes;
pub mod memory;
pub mod repo;

pub use checkpoint::{CheckpointKey, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use codes::CodeResolver;
pub use memory::InMemoryStore;
pub use repo::Repositories;
