use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(about = "Postgres connection config CLI.")]
pub struct Cli {
    /// Load variables from this file instead of looking for `.env`
    #[arg(long, global = true, env = "PGCONF_ENV_FILE")]
    pub env_file: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the connection config, password redacted
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Open a connection and run `SELECT 1`, without touching the schema
    Check,
    /// List entity and migration files matched under a project root
    Discover {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Apply SQL migrations from the migrations directory under a project root
    Migrate {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}
