//! Storage layer - SQLite-backed persistence
//!
//! One connection, one writer. Every statement the record layer runs goes
//! through `Store::execute_write`/`Store::query`, which retry on a
//! busy/locked database with exponential backoff and surface anything else
//! as a fatal statement error.

pub mod sqlite;

pub use sqlite::{Column, RetryPolicy, Row, Store, WriteOutcome};
