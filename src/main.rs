use anyhow::Context as _;
use clap::{Parser, Subcommand};
use ontomatch::{
    ClassifyMode, Config, Context, Engine, FilterPlan, ItemInput, LmdbStore, OpenAiClient, Store,
};
use serde::Serialize;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Attribute ontology resolver and filter matching engine
#[derive(Parser, Debug)]
#[command(name = "ontomatch")]
#[command(about = "Attribute ontology resolver and filter matching engine", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ONTOMATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the data directory (overrides storage.path)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest items from a JSON-lines file ({"id", "title", "description"})
    Ingest { file: PathBuf },
    /// Resolve raw labels into attribute nodes
    Resolve {
        #[arg(required = true)]
        labels: Vec<String>,
    },
    /// Compile a natural-language query into a saved filter
    CompileFilter {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        query: String,
    },
    /// Save a filter plan from a JSON file
    SaveFilter {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: Option<String>,
        plan: PathBuf,
    },
    /// Search items with a plan file, or a query compiled on the fly
    Search {
        #[arg(long, conflicts_with = "query", required_unless_present = "query")]
        plan: Option<PathBuf>,
        #[arg(long)]
        query: Option<String>,
    },
    /// Classify every item against the saved filters
    Classify {
        /// all | best
        #[arg(long, default_value = "all")]
        mode: String,
    },
    /// List attribute nodes
    Nodes,
    /// List saved filters
    Filters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config.storage.path = dir.clone();
    }
    info!("Starting ontomatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", config.storage.path);

    let store = Arc::new(LmdbStore::open(&config.storage.path)?);
    let cancel = CancellationToken::new();
    let engine = Engine::new(build_context(config, store, cancel.clone()));

    let run = run(&engine, args.command);
    tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received, cancelling");
            cancel.cancel();
            anyhow::bail!("interrupted")
        }
    }
}

fn build_context(config: Config, store: Arc<LmdbStore>, cancel: CancellationToken) -> Context {
    let timeout = config.capabilities.retry_policy().timeout;
    let client = match OpenAiClient::from_config(&config.provider, timeout) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Model capabilities unavailable: {}", e);
            None
        }
    };
    let llm_units = config.provider.llm_unit_conversion;

    let mut builder = Context::builder(config, store).cancellation(cancel);
    if let Some(client) = client {
        builder = builder
            .embedder(client.clone())
            .arbiter(client.clone())
            .extractor(client.clone())
            .compiler(client.clone());
        if llm_units {
            builder = builder.converter(client);
        }
    }
    builder.build()
}

async fn run(engine: &Engine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ingest { file } => {
            let inputs = read_items(&file)?;
            info!("Ingesting {} items from {:?}", inputs.len(), file);
            let mut failed = 0usize;
            for result in engine.ingest_batch(inputs).await {
                match result {
                    Ok(report) => emit(&report)?,
                    Err(e) => {
                        failed += 1;
                        error!("Ingestion failed: {}", e);
                    }
                }
            }
            if failed > 0 {
                warn!("{} items failed to ingest", failed);
            }
        }
        Command::Resolve { labels } => {
            for outcome in engine.resolve_labels(&labels).await? {
                emit(&outcome)?;
            }
        }
        Command::CompileFilter { id, name, query } => {
            let name = name.unwrap_or_else(|| query.clone());
            let filter = engine.compile_filter(&id, &name, &query).await?;
            emit(&filter)?;
        }
        Command::SaveFilter { id, name, plan } => {
            let plan = read_plan(&plan)?;
            let filter = engine.save_filter(&id, name.as_deref().unwrap_or(&id), plan)?;
            emit(&filter)?;
        }
        Command::Search { plan, query } => {
            let plan = match (plan, query) {
                (Some(path), _) => read_plan(&path)?,
                (None, Some(query)) => {
                    let ctx = engine.context();
                    ctx.retry_policy()
                        .call("compile_plan", &ctx.cancel, || ctx.compiler.compile(&query))
                        .await?
                }
                (None, None) => anyhow::bail!("either --plan or --query is required"),
            };
            emit(&engine.search(&plan).await?)?;
        }
        Command::Classify { mode } => {
            let mode: ClassifyMode = mode.parse()?;
            for classification in engine.classify(mode).await? {
                emit(&classification)?;
            }
        }
        Command::Nodes => {
            for node in engine.store().attr_nodes()? {
                emit(&serde_json::json!({
                    "id": node.id,
                    "label": node.label,
                    "examples": node.examples,
                    "dim": node.centroid.dim(),
                }))?;
            }
        }
        Command::Filters => {
            for filter in engine.store().filters()? {
                emit(&filter)?;
            }
        }
    }
    Ok(())
}

fn read_items(path: &Path) -> anyhow::Result<Vec<ItemInput>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut inputs = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let input: ItemInput = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid item", path.display(), n + 1))?;
        inputs.push(input);
    }
    Ok(inputs)
}

fn read_plan(path: &Path) -> anyhow::Result<FilterPlan> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(FilterPlan::from_json(&json)?)
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
