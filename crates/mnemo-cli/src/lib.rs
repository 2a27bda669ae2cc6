pub mod client;
pub mod commands;
pub mod error;
pub mod output;

pub use client::{AdminClient, DEFAULT_URL};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp};
