pub mod cli;
pub mod client;
pub mod load_config;
pub mod repo;
pub mod user_agent;

pub use cli::{run, Cli, Commands, SnapshotArgs};
