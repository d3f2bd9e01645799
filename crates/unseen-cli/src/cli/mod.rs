pub mod config;
pub mod protocol;
pub mod render;
pub mod replay;
pub mod watch;

pub use config::CliConfig;
pub use protocol::ReplayStep;
pub use render::OutputFormat;
pub use replay::{run_replay, ReplaySummary};
pub use watch::run_watch;
