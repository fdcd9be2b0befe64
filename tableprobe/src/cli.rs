use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::logic::config::ProbeConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// check that a hosted PostgREST table store is reachable and authorized
#[derive(Parser)]
#[command(name = "tableprobe", version)]
pub struct Cli {
    /// Path to configuration file (supports `~`)
    #[arg(short, long, global = true, env = "TABLEPROBE_CONFIG")]
    pub config: Option<String>,

    /// Print diagnostic logs to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub probe: ProbeArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the probe (the default when no subcommand is given)
    Check {
        #[command(flatten)]
        probe: ProbeArgs,
    },

    /// Configuration management (show, set, path)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct ProbeArgs {
    /// Project endpoint, e.g. https://<ref>.supabase.co (overrides SUPABASE_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// Service key (prefer SUPABASE_SERVICE_KEY; flags end up in shell history)
    #[arg(long)]
    pub key: Option<String>,

    /// Table to read from [default: stories]
    #[arg(short, long)]
    pub table: Option<String>,

    /// Columns to select, comma separated [default: id]
    #[arg(long, value_delimiter = ',')]
    pub columns: Option<Vec<String>>,

    /// Maximum rows to request [default: 1]
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: Option<u32>,

    /// Output format: text (default) or json
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Exit with status 1 when the probe fails
    #[arg(long)]
    pub strict: bool,
}

impl ProbeArgs {
    /// Flags given before `check` fill in whatever `check` itself left unset.
    pub fn under(self, outer: ProbeArgs) -> ProbeArgs {
        ProbeArgs {
            url: self.url.or(outer.url),
            key: self.key.or(outer.key),
            table: self.table.or(outer.table),
            columns: self.columns.or(outer.columns),
            limit: self.limit.or(outer.limit),
            format: self.format.or(outer.format),
            strict: self.strict || outer.strict,
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }
}

impl From<&ProbeArgs> for ProbeConfig {
    fn from(args: &ProbeArgs) -> Self {
        ProbeConfig {
            url: args.url.clone(),
            service_key: args.key.clone(),
            table: args.table.clone(),
            columns: args.columns.clone(),
            limit: args.limit,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration and where each value comes from
    Show,
    /// Store values in the configuration file
    Set {
        /// Project endpoint URL
        #[arg(long)]
        url: Option<String>,
        /// Service key
        #[arg(long)]
        key: Option<String>,
        /// Table to read from
        #[arg(short, long)]
        table: Option<String>,
        /// Columns to select, comma separated
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
        /// Maximum rows to request
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,
    },
    /// Print the configuration file path
    Path,
}
