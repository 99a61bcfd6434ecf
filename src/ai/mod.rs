//! Client side of the local inference server.
//!
//! - `probe` - liveness and installed-model checks (`GET /api/tags`)
//! - `installer` - model downloads with progress (`POST /api/pull`)
//! - `streamer` - streaming completions (`POST /api/generate`)
//! - `backend` - the `InferenceBackend` seam used by chat sessions
//!
//! Both streaming endpoints answer with newline-delimited JSON, framed by
//! `ndjson`.

mod backend;
mod error;
mod installer;
mod ndjson;
mod probe;
mod streamer;

pub use backend::{InferenceBackend, OllamaBackend};
pub use error::{ChatError, ChatResult};
pub use installer::{ModelInstaller, ProgressEvent};
pub use probe::{BackendProbe, ModelEntry};
pub use streamer::{CompletionStreamer, Snapshot, SnapshotStatus};
