//! Resume CLI - Command-line interface for the resume search engine.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use resume_core::{ResumeConfig, SearchError, SearchMode};
use resume_embed::MockEmbedder;
use resume_query::{SearchEngine, SearchRequest, ServiceContext, WeightedQuery};

/// Resume - Hybrid semantic and keyword search over candidate resumes
#[derive(Parser)]
#[command(name = "resume")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dataset file (default: from config)
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,

    /// Config file (default: user config dir, then ./resume-search.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the local mock embedder and no remote services
    #[arg(long, global = true)]
    offline: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search resume chunks
    Search {
        /// Search query
        query: String,

        /// semantic, bm25, hybrid
        #[arg(short, long, default_value = "semantic")]
        mode: SearchMode,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Rerank the results
        #[arg(long)]
        rerank: bool,

        /// Rerank model (implies --rerank)
        #[arg(long)]
        rerank_model: Option<String>,
    },

    /// Score candidates against several weighted criteria
    Weighted {
        /// Criterion as name=query, repeatable
        #[arg(long = "criterion", value_parser = parse_pair::<String>, required = true)]
        criteria: Vec<(String, String)>,

        /// Criterion weight as name=weight, repeatable (default 1.0)
        #[arg(long = "weight", value_parser = parse_pair::<f32>)]
        weights: Vec<(String, f32)>,

        /// Minimum total score
        #[arg(long, default_value = "0.0")]
        threshold: f32,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Rerank the results
        #[arg(long)]
        rerank: bool,
    },

    /// Show every chunk of one candidate
    Candidate {
        /// Candidate id
        id: String,
    },

    /// Show engine status
    Stats,

    /// Load the dataset and persist the vector store
    Index {
        /// Discard the persisted store and embed again
        #[arg(long)]
        rebuild: bool,
    },
}

fn parse_pair<T>(s: &str) -> Result<(String, T), String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let value = value.parse::<T>().map_err(|e| e.to_string())?;
    Ok((name.trim().to_string(), value))
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&PathBuf>) -> Result<ResumeConfig, SearchError> {
    match path {
        Some(path) => ResumeConfig::load(path),
        None => ResumeConfig::load_default(),
    }
}

fn build_context(config: ResumeConfig, offline: bool) -> Result<ServiceContext, SearchError> {
    if offline {
        info!("Offline mode: mock embedder, no keyword or rerank service");
        return Ok(ServiceContext::new(config, Arc::new(MockEmbedder::new()), None, None));
    }
    ServiceContext::from_config(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), SearchError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        let body = serde_json::json!({
            "error": e.error_code(),
            "message": e.to_string(),
        });
        eprintln!("{}", body);
        std::process::exit(if e.is_client_error() { 2 } else { 1 });
    }
}

async fn run(cli: Cli) -> Result<(), SearchError> {
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(dataset) = cli.dataset {
        config.data.dataset_file = dataset;
    }
    let dataset = config.data.dataset_file.clone();
    let context = build_context(config, cli.offline)?;

    match cli.command {
        Commands::Search {
            query,
            mode,
            top_k,
            rerank,
            rerank_model,
        } => {
            let mut request = SearchRequest::new(query).with_mode(mode);
            request.limit = top_k;
            if rerank || rerank_model.is_some() {
                request = request.with_rerank(rerank_model);
            }
            let engine = context.open(&dataset).await?;
            search(&engine, &request).await?;
        }
        Commands::Weighted {
            criteria,
            weights,
            threshold,
            top_k,
            rerank,
        } => {
            let mut query = WeightedQuery::new().threshold(threshold);
            for (name, text) in criteria {
                query.criteria.insert(name, text);
            }
            query.weights.extend(weights);

            let mut request = SearchRequest::weighted(query);
            request.limit = top_k;
            request.rerank = rerank;
            let engine = context.open(&dataset).await?;
            search(&engine, &request).await?;
        }
        Commands::Candidate { id } => {
            let engine = context.open(&dataset).await?;
            print_json(&engine.candidate(&id)?)?;
        }
        Commands::Stats => {
            let engine = context.open(&dataset).await?;
            print_json(&engine.health())?;
        }
        Commands::Index { rebuild } => {
            let engine = if rebuild {
                let store = context
                    .config()
                    .data
                    .store_path(&resume_core::dataset_name(&dataset));
                if store.exists() {
                    std::fs::remove_file(&store)?;
                    info!(path = %store.display(), "Removed persisted store");
                }
                context.reload(&dataset).await?
            } else {
                context.open(&dataset).await?
            };
            engine.index().save().await?;
            print_json(&engine.health())?;
        }
    }

    Ok(())
}

async fn search(engine: &SearchEngine, request: &SearchRequest) -> Result<(), SearchError> {
    let response = engine.search(request).await?;
    if let Some(reason) = &response.search_info.degraded {
        eprintln!("Note: {} search degraded to semantic: {}", request.mode, reason);
    }
    print_json(&response)?;
    // Keep embedded queries for the next invocation
    engine.index().save_query_cache().await
}
