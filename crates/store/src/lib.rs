//! `storyforge-store` — durable, file-backed task/log store.
//!
//! The whole store lives in memory and is rewritten to disk in full after
//! every mutation. That favors simplicity and read-your-own-write consistency
//! over write throughput, which is appropriate for the expected volume (tens
//! to low hundreds of resident jobs).

pub mod file_store;

pub use file_store::{FileStore, JobFilter, StatusCounts, StoreError};
