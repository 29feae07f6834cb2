use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "siphon", about = "Tiered web content extraction engine")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract structured content from a URL
    Extract {
        /// Target URL
        url: String,

        /// Run only a named strategy (e.g. static-parse, openapi-discovery)
        #[arg(long)]
        force_strategy: Option<String>,

        /// Strategies to exclude, comma-separated
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,

        /// Disallow the headless browser tier
        #[arg(long)]
        no_browser: bool,

        /// Acceptance threshold in characters
        #[arg(long)]
        min_content_length: Option<usize>,

        /// Aggregate wall-clock budget in milliseconds
        #[arg(long)]
        max_latency_ms: Option<u64>,

        /// Pretty-print the full result instead of just the markdown
        #[arg(long)]
        json: bool,
    },
    /// Show the planned strategy order for a URL without executing
    Preview {
        /// Target URL
        url: String,
    },
    /// Inspect learned patterns
    Patterns {
        #[command(subcommand)]
        action: PatternsAction,
    },
    /// Query recorded debug traces
    Traces {
        /// Filter by domain
        #[arg(short, long)]
        domain: Option<String>,

        /// Only failures
        #[arg(long)]
        failures: bool,

        /// Max results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show engine statistics
    Status,
}

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List learned patterns with confidence and metrics
    List,
    /// Apply confidence decay and drop hopeless patterns
    Prune,
}
