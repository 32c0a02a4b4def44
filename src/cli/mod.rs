//! Command-line interface of the `azmc` binary.

mod commands;
mod output;

pub use commands::{
    Cli, Commands, KindArg, LifecycleArgs, LogFormat, OutputFormat, StateCommands,
};
pub use output::OutputFormatter;
