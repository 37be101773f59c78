//! Settings come from a TOML file layered with `SESSIONGUARD__SECTION__KEY`
//! environment overrides.

mod cli;
pub use clap::{Parser, Subcommand};
pub use cli::*;

mod settings;
pub use settings::*;
