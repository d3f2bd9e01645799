pub mod aggregate;
pub mod config;
pub mod constants;
pub mod engine;
pub mod events;
pub mod models;
pub mod reconciler;
pub mod runtime;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod tracing_setup;

// Re-export the main entry points at crate root for convenience
pub use config::{ConfigError, EngineConfig};
pub use engine::NotificationEngine;
pub use events::{ChannelEvent, EventError};
pub use runtime::{EngineCommand, EngineHandle, EngineRuntime, MountHandle};
