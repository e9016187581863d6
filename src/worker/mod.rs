//! Worker communication module.
//!
//! Schema metadata, relationship lookups and query execution against real
//! databases are delegated to an external worker process. The worker speaks
//! NDJSON over stdin/stdout; [`WorkerBackend`] adapts it to the engine's
//! collaborator traits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               Tessera (Rust + Tokio)          │
//! │  WorkerBackend ──► WorkerClient               │
//! │                    - spawns worker as child   │
//! │                    - NDJSON over stdin/stdout │
//! │                    - request ids correlate    │
//! └───────────────────────┬──────────────────────┘
//!                         │ stdin / stdout
//!                         ▼
//! ┌──────────────────────────────────────────────┐
//! │          Executor worker (child process)      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera::worker::{WorkerBackend, WorkerClient};
//!
//! let client = Arc::new(WorkerClient::spawn_with_settings(&settings).await?);
//! let backend = WorkerBackend::from_settings(client, &settings);
//! let result = backend.execute(&definition).await?;
//! ```

mod backend;
mod client;
mod error;
pub mod protocol;

pub use backend::WorkerBackend;
pub use client::WorkerClient;
pub use error::{WorkerError, WorkerResult};
