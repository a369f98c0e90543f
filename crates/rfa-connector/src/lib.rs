//! RFA Connector Library
//!
//! Background connector between an RFA (X-ray fluorescence) analyzer and
//! the order database. Ingests measurement payloads from one of two
//! interchangeable channels, parses and validates them, and stores each
//! complete record as a keyed update.
//!
//! # Pipeline
//!
//! raw bytes (TCP chunk or file content) → [`record::parse_payload`] →
//! [`route::target_database`] → [`persist::MeasurementSink`]
//!
//! Exactly one acquisition mode runs per process, selected by
//! `ENABLE_TCP_CONNECTION`:
//!
//! - [`stream::StreamAcquisition`] — persistent TCP stream with unbounded
//!   reconnect.
//! - [`watcher::FileAcquisition`] — watched directory with bounded per-file
//!   retries.

pub mod config;
pub mod persist;
pub mod pipeline;
pub mod record;
pub mod route;
pub mod stream;
pub mod watcher;

// Re-export commonly used types
pub use config::{AcquisitionMode, Config};
pub use pipeline::Pipeline;
pub use record::{Classification, MeasurementRecord, Metal};
