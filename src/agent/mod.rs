//! The agent-side transfer engine: push a directory tree as a version,
//! or pull a version into a directory with skip and resume semantics.

mod client;
mod progress;
mod pull;
mod push;

pub use client::{ApiClient, RemoteFile, RemoteManifest};
pub use progress::{CountingProgress, NullProgress, ProgressSink};
pub use pull::{PullOutcome, pull};
pub use push::{PushOutcome, push};

/// Builder identity stamped into manifests produced by this agent.
pub const BUILDER_NAME: &str = "stevedore-agent";
