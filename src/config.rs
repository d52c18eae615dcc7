//! Configuration for Raccoon.
//!
//! Currently holds clap structs for command line arguments and flags.

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(version, author, about)]
pub struct Config {
    /// Run (r) the recipes, or only check (c) the description files
    #[arg(value_enum)]
    pub mode: Mode,

    /// Infrastructure file describing clusters and hosts
    #[arg(long, short, default_value = "infrastructure.yaml")]
    pub infrastructure: String,

    /// Recipe file with the tasks clusters refer to
    #[arg(long, short, default_value = "recipes.yaml")]
    pub recipes: String,

    /// Single job file holding both the infrastructure and its tasks.
    /// Takes precedence over --infrastructure and --recipes.
    #[arg(long, short)]
    pub job: Option<String>,

    /// How often to print remote output. Giving 0 will suppress stdout/stderr.
    #[arg(long, short, default_value = "1")]
    pub print_period: usize,

    /// Maximum number of hosts worked on at once. Unlimited when omitted.
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Seconds to wait for an SSH connection to be established
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Log filter, e.g. "debug" or "raccoon=trace". Overrides RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    #[value(name = "r")]
    Run,
    #[value(name = "c")]
    Check,
}
