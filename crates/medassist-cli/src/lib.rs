//! Command-line adapter for medassist.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliContext, bootstrap, load_settings};
pub use parser::{Cli, Commands};
