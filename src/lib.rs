//! # Stevedore
//!
//! A content-addressed artifact distribution server and agent, usable
//! both as a standalone binary and as a library.
//!
//! The server stores immutable versions of an application's file tree
//! under `{project}/{app}/{version}/...` with a per-version manifest as
//! the commit marker, and streams them back with resumable range
//! downloads. The agent walks a local directory, digests every file,
//! and pushes or pulls through a bounded worker pool.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use stevedore::server::{AppState, create_router};
//! use stevedore::storage::LocalBlobStore;
//! use stevedore::store::{SqliteStore, Store};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(SqliteStore::new(PathBuf::from("./data/stevedore.db"))?);
//! store.initialize()?;
//! let blobs = Arc::new(LocalBlobStore::new(&PathBuf::from("./data/artifacts")).await?);
//!
//! let state = Arc::new(AppState::new(store, blobs, false, false));
//! let router = create_router(state);
//! // Serve with axum...
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI module. Disable with `default-features = false`.

pub mod agent;
pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod events;
pub mod manifest;
pub mod pathspec;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod store;
pub mod types;
