use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chemfetch")]
#[command(about = "Fetch compound data through rotating proxies", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $CHEMFETCH_CONFIG or config/chemfetch.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up PubChem CIDs for SMILES strings
    SmilesToCids(SmilesArgs),
    /// Fetch canonical SMILES, InChI and InChIKey for CIDs
    CidsToRecords(CidsArgs),
    /// Fetch arbitrary URLs through the proxy pool
    Fetch(FetchArgs),
    /// Print the effective configuration
    Config,
}

#[derive(clap::Args, Debug)]
pub struct SmilesArgs {
    #[arg(required = true)]
    pub smiles: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct CidsArgs {
    #[arg(required = true)]
    pub cids: Vec<u64>,

    /// CIDs per request (overrides batch.chunk_size)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Decode responses as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Query parameter as NAME=VALUE, repeatable
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Attempts per URL (overrides fetch.max_attempts)
    #[arg(long)]
    pub attempts: Option<u32>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))
}
