//! Single-threaded, edge-triggered HTTP/1.1 reactor core: accept loop,
//! connection state machine, idle timer service, worker pool and a shared
//! mmap file cache behind an injectable telemetry sink and credential
//! store. Logging, configuration loading, signal wiring and the process
//! entry point are the binary's job (`src/bin/main.rs`); this crate only
//! exposes start/stop and the structured-event sink.

pub mod buffer;
pub mod config;
pub mod credential;
pub mod error;
pub mod file_cache;
pub mod http;
pub mod pool;
pub mod prelude;
pub mod reactor;
pub mod registry;
pub mod telemetry;
pub mod timer;

pub use error::{CoreError, Result};
pub use reactor::{active_connections, Server, ServerHandle};
