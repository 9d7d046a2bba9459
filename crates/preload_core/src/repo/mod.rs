//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define write-side data access contracts for catalog record graphs.
//! - Isolate SQLite statement details from callers.
//!
//! # Invariants
//! - Repository writes must call `validate()` on the whole graph before any
//!   SQL mutation.
//! - Every multi-row write runs in a single transaction.

pub mod catalog_repo;
