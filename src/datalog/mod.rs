//! # Structured Log Module
//!
//! Persistence of typed telemetry into rotating, append-only log files.
//!
//! This module handles:
//! - The writer interface ([`LogWriter`], [`WriterFactory`])
//! - A JSON Lines writer implementation
//! - The log lifecycle manager (rotation, flush batching, handle caches)

pub mod jsonl;
pub mod manager;
pub mod writer;

pub use jsonl::{JsonlWriter, JsonlWriterFactory};
pub use manager::LogManager;
pub use writer::{EntryHandle, EntryValue, LogWriter, WriterFactory};
