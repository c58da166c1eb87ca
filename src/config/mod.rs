mod agent;
mod server;

pub use agent::{AgentConfig, AgentOverrides, DEFAULT_CONCURRENCY};
pub use server::{ServerConfig, ServerConfigOverrides, StorageConfig};
