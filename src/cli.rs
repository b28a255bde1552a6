use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use sieve::settings::Overrides;

#[derive(Debug, Parser)]
#[command(
    name = "sieve",
    about = "Boolean and semantic prefix search over structured records"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Wildcard expansion limit used when a query sets none
    #[arg(long, global = true)]
    pub wel: Option<usize>,

    /// Negation expansion limit
    #[arg(long, global = true)]
    pub nel: Option<usize>,

    /// Resolve free-text terms by nearest-neighbor search
    #[arg(long, global = true)]
    pub hybrid: bool,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Settings given explicitly on the command line.
    pub fn overrides(&self) -> Overrides {
        let id_field = match &self.command {
            Command::Build(args) => args.id_field.clone(),
            _ => None,
        };
        Overrides {
            wel: self.wel,
            nel: self.nel,
            hybrid: self.hybrid.then_some(true),
            id_field,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index a JSON-lines file of records and publish it
    Build(BuildArgs),
    /// Run one query and print the response
    Query(QueryArgs),
    /// Read queries from stdin, one per line, until `q`
    Shell,
    /// List the field paths present in the index
    Keys(KeysArgs),
    /// Show the published index and its settings
    Status(StatusArgs),
    /// Serve queries over HTTP
    Serve(ServeArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Build --

#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// JSON-lines file with one record per line (`-` reads stdin)
    pub records: PathBuf,

    /// Top-level field holding each record's id
    #[arg(long)]
    pub id_field: Option<String>,
}

impl BuildArgs {
    pub fn reads_stdin(&self) -> bool {
        self.records.as_os_str() == "-"
    }
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Query object, e.g. '{"and": ["type:p", "name:j*"]}'
    pub query: String,

    /// Print the per-term expansion report to stderr
    #[arg(long)]
    pub explain: bool,
}

// -- Keys --

#[derive(Debug, Parser)]
pub struct KeysArgs {
    /// Glob applied to field paths, e.g. 'addresses:*'
    pub pattern: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: std::net::IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,
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
            "sieve",
            &mut std::io::stdout(),
        );
    }
}
