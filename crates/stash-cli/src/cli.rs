use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stash", about = "Multi-tenant content-addressable blob storage", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the storage server and its background tasks
    Serve(ServeArgs),
    /// Inspect configuration documents
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Configuration document (TOML)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Override `server.bind_addr`
    #[arg(long)]
    pub bind: Option<String>,
    /// Do not run the import, ref expiry and GC tickers
    #[arg(long)]
    pub no_background: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Resolve a document and report errors
    Check { path: PathBuf },
    /// Print each namespace with its merged backend
    Show { path: PathBuf },
}
