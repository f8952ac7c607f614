use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// fallgate: inspect resilience config and degraded answers offline.
#[derive(Debug, Parser)]
#[command(name = "fallgate", version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// More log output on stderr (-v debug, -vv trace). RUST_LOG wins if set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load and validate a config file, then print the resolved breaker settings.
    Check(CheckArgs),

    /// Build a retrieval-only answer from a sources file.
    Fallback(FallbackArgs),

    /// Drive one breaker through a scripted outcome sequence on a virtual clock.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// YAML or JSON config file
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct FallbackArgs {
    #[arg(long)]
    pub query: String,

    /// JSON array of {title, url, domain, snippet}
    #[arg(long)]
    pub sources: PathBuf,

    /// Generated when omitted
    #[arg(long)]
    pub trace_id: Option<String>,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub provider: String,

    /// Steps: s (success), f (failure), t (timeout), +<duration> (wait, e.g. +61s)
    #[arg(long, num_args = 1.., value_delimiter = ',', required = true)]
    pub outcomes: Vec<String>,
}
