//! Command-line flags for the commons game server.
//!
//! Every flag has a `COMMONS_*` environment fallback; parsed values are
//! validated into the orchestrator and gateway runtime configs.

pub mod cli_args;

pub use cli_args::Cli;
