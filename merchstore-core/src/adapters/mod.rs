//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository port
//! - Process memory for the Repository port (tests, dry runs)
//! - `tracing` for the EventSink port

pub mod duckdb;
pub mod memory;
pub mod tracing_sink;

pub use self::duckdb::DuckDbRepository;
pub use memory::{MemoryEventSink, MemoryRepository};
pub use tracing_sink::TracingEventSink;
