//! Persistent chain store

pub mod database;

pub use database::{CommitRecord, Database, StorageStats};
