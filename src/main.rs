//! # Evidence Harness CLI (`evh`)
//!
//! ## Usage
//!
//! ```bash
//! evh --config ./config/evh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `evh init` | Create or verify the vector cache collection |
//! | `evh retrieve "<prompt>"` | Run the full evidence pipeline once |
//! | `evh search "<query>"` | Raw metasearch hits for one query |
//! | `evh fetch <url>` | Fetch and extract one page |
//! | `evh cache search "<query>"` | Similarity lookup in the cache |
//! | `evh cache stats` | Cache backend and size |
//! | `evh ingest <paths...>` | Cache local files |
//! | `evh serve mcp` | MCP server on stdio |
//! | `evh serve http` | REST tool server |
//!
//! ## Examples
//!
//! ```bash
//! evh retrieve "CLAIM: the Great Wall is visible from space"
//! evh retrieve --query "great wall visible from orbit" --claim "visible from space"
//! evh ingest ./papers ./notes.md
//! evh serve mcp --config ./config/evh.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use evidence_harness::{commands, config, logging, mcp, server};

/// Evidence Harness: web evidence retrieval with a semantic cache.
#[derive(Parser)]
#[command(
    name = "evh",
    about = "Evidence Harness: ranked, cited web evidence for prompts and claims",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/evh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or verify the vector cache collection.
    Init,

    /// Search, fetch, cache, rank and assemble evidence for a prompt.
    Retrieve {
        /// Free-text prompt or claim.
        prompt: Option<String>,

        /// Explicit query (repeatable).
        #[arg(long = "query", short = 'q')]
        queries: Vec<String>,

        /// Claim used for ranking cache hits.
        #[arg(long)]
        claim: Option<String>,
    },

    /// Query the metasearch endpoint directly.
    Search {
        query: String,

        /// Results to keep (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Fetch one URL and print the extracted page.
    Fetch { url: String },

    /// Inspect the vector cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Cache local .txt, .md, .html and .pdf files.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Similarity search over cached chunks.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show backend, collection and chunk count.
    Stats,
}

#[derive(Subcommand)]
enum ServeService {
    /// MCP over stdin/stdout.
    Mcp,
    /// REST API on `[server].bind`.
    Http,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Retrieve {
            prompt,
            queries,
            claim,
        } => {
            let payload = commands::retrieve_payload(prompt, queries, claim);
            commands::run_retrieve(&cfg, payload).await?;
        }
        Commands::Search { query, k } => commands::run_search(&cfg, &query, k).await?,
        Commands::Fetch { url } => commands::run_fetch(&cfg, &url).await?,
        Commands::Cache { action } => match action {
            CacheAction::Search { query, limit } => {
                commands::run_cache_search(&cfg, &query, limit).await?
            }
            CacheAction::Stats => commands::run_cache_stats(&cfg).await?,
        },
        Commands::Ingest { paths } => commands::run_ingest(&cfg, &paths).await?,
        Commands::Serve { service } => match service {
            ServeService::Mcp => mcp::serve_stdio(&cfg).await?,
            ServeService::Http => server::run_server(&cfg).await?,
        },
    }

    Ok(())
}
