use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "datashelf",
    about = "A personal dataset catalog with structured and full-text search"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register or update a dataset from a JSON metadata file
    Add(AddArgs),
    /// Remove a dataset from the catalog
    Remove(RemoveArgs),
    /// Search the catalog (free text, field filters, or both)
    Search(SearchArgs),
    /// List datasets, most recently updated first
    List(ListArgs),
    /// Show recognized filter fields and their operators
    Fields(FieldsArgs),
    /// Rebuild the full-text index from the stored metadata
    Reindex,
    /// Show catalog statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Add --

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Path to a JSON metadata file (must contain "id" and "name")
    pub file: PathBuf,
}

// -- Remove --

#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Dataset id to remove
    pub id: String,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Query string, e.g. 'format:csv size>100MB rainfall "rice field"'
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Output only dataset ids (one per line)
    #[arg(long)]
    pub ids: bool,
}

// -- List --

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Number of datasets to list
    #[arg(short = 'n', long, default_value = "20")]
    pub count: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Fields --

#[derive(Debug, Parser)]
pub struct FieldsArgs {
    /// Show only fields starting with this prefix
    pub prefix: Option<String>,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "datashelf",
            &mut std::io::stdout(),
        );
    }
}
