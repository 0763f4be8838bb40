//! lodharvest CLI - run harvest configurations and inspect the store.

use anyhow::Context;
use clap::{Parser, Subcommand};
use lodharvest::{AssertionEngine, ConfigBuilder, HarvestSettings, TaskExecutor};
use lodharvest_core::to_ntriples;
use lodharvest_fetch::HttpFetcher;
use lodharvest_store::{CleaningStore, GraphStore, MemoryGraphStore, PartitionMapper, ResultSet, SparqlGraphStore};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lodharvest", version = env!("CARGO_PKG_VERSION"), about = "Linked-data harvester: walk property paths, dereference on demand, track partition age")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Remote query endpoint; overrides settings
    #[arg(long, global = true)]
    read_endpoint: Option<String>,

    /// Remote update endpoint; overrides settings
    #[arg(long, global = true)]
    write_endpoint: Option<String>,

    /// N-Quads state file for the in-memory store; overrides settings
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run configuration files, or directories of them
    Run {
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Assertions driven at once per task
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print each execution report as YAML
        #[arg(long)]
        yaml: bool,
    },
    /// List tracked partitions and their age
    List,
    /// Stop tracking a partition; its content stays
    Forget { key: String },
    /// Run a read-only query
    Query {
        sparql: String,

        /// Scope the query to one partition
        #[arg(long)]
        partition: Option<String>,
    },
}

struct Backend {
    store: Arc<dyn GraphStore>,
    memory: Option<Arc<MemoryGraphStore>>,
    state: Option<PathBuf>,
}

impl Backend {
    fn open(settings: &HarvestSettings) -> anyhow::Result<Self> {
        let mapper = PartitionMapper::new(settings.store.base.clone());
        if settings.store.is_remote() {
            let write = Some(settings.store.write_endpoint.clone()).filter(|w| !w.trim().is_empty());
            let remote = SparqlGraphStore::new(settings.store.read_endpoint.clone(), write)
                .with_mapper(mapper)
                .with_union_graph(settings.store.union_graph.clone());
            info!(
                endpoint = %settings.store.read_endpoint,
                read_only = remote.is_read_only(),
                union_graph = ?settings.store.union_graph,
                "remote store"
            );
            return Ok(Self {
                store: Arc::new(CleaningStore::new(Arc::new(remote))),
                memory: None,
                state: None,
            });
        }

        let memory = Arc::new(MemoryGraphStore::with_mapper(mapper)?);
        let state = settings.store.state_path();
        if let Some(path) = state.as_deref().filter(|p| p.exists()) {
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let count = memory.load_nquads(&bytes)?;
            info!(path = %path.display(), quads = count, "state loaded");
        }
        let inner: Arc<dyn GraphStore> = memory.clone();
        Ok(Self {
            store: Arc::new(CleaningStore::new(inner)),
            memory: Some(memory),
            state,
        })
    }

    /// Write the in-memory store back to its state file, if it has one.
    fn save(&self) -> anyhow::Result<()> {
        let (Some(memory), Some(path)) = (&self.memory, &self.state) else {
            return Ok(());
        };
        let tmp = path.with_extension("tmp");
        let file = std::fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        let mut out = std::io::BufWriter::new(file);
        let count = memory.dump_nquads(&mut out)?;
        out.flush()?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), quads = count, "state saved");
        Ok(())
    }
}

fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes();
    if minutes < 1 {
        format!("{}s", age.num_seconds())
    } else if minutes < 120 {
        format!("{minutes}m")
    } else {
        format!("{}h", age.num_hours())
    }
}

fn print_results(rs: &ResultSet) {
    match rs {
        ResultSet::Boolean(b) => println!("{b}"),
        ResultSet::Solutions { variables, rows } => {
            println!("{}", variables.join("\t"));
            for row in rows {
                let cells: Vec<String> = variables
                    .iter()
                    .map(|v| row.get(v).map(|t| t.to_string()).unwrap_or_default())
                    .collect();
                println!("{}", cells.join("\t"));
            }
        }
        ResultSet::Graph(facts) => print!("{}", to_ntriples(facts)),
    }
}

async fn run(
    backend: &Backend,
    settings: &HarvestSettings,
    configs: &[PathBuf],
    concurrency: usize,
    yaml: bool,
) -> anyhow::Result<usize> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, letting in-flight fetches finish");
                cancel.cancel();
            }
        });
    }

    let fetcher = Arc::new(HttpFetcher::new(settings.fetch.fetcher_config())?);
    let engine = AssertionEngine::new(backend.store.clone(), fetcher)
        .with_accept(settings.fetch.accept.clone())
        .with_cancellation(cancel.clone());
    let executor = TaskExecutor::new(engine).with_concurrency(concurrency);
    let builder = ConfigBuilder::new(backend.store.clone());

    let mut failures = 0;
    for target in configs {
        let built = if target.is_dir() {
            builder.build_from_dir(target).await?
        } else {
            vec![(target.clone(), builder.build_from_path(target).await)]
        };

        for (path, config) in built {
            let config = match config {
                Ok(config) => config,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "config failed to build");
                    println!("✗ {}: {e}", path.display());
                    failures += 1;
                    continue;
                }
            };
            if config.is_snoozed() {
                println!("- {}: snoozed", config.name);
                continue;
            }
            if let Some(report) = executor.execute(&config).await? {
                println!("✓ {}", report.summary());
                if yaml {
                    println!("{}", report.to_yaml()?);
                }
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    Ok(failures)
}

fn load_settings(cli: &Cli) -> anyhow::Result<HarvestSettings> {
    let mut settings = match &cli.settings {
        Some(path) => HarvestSettings::load(path)?,
        None => HarvestSettings::default(),
    };
    if let Some(endpoint) = &cli.read_endpoint {
        settings.store.read_endpoint = endpoint.clone();
    }
    if let Some(endpoint) = &cli.write_endpoint {
        settings.store.write_endpoint = endpoint.clone();
    }
    if let Some(path) = &cli.state_file {
        settings.store.state_file = path.display().to_string();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "lodharvest=debug,lodharvest_store=debug,lodharvest_fetch=debug"
    } else {
        "lodharvest=info,lodharvest_store=info,lodharvest_fetch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let mut settings = load_settings(&cli)?;
    let backend = Backend::open(&settings)?;

    match cli.command {
        Command::Run { configs, concurrency, yaml } => {
            if let Some(n) = concurrency {
                settings.executor.concurrency = n;
            }
            let outcome = run(&backend, &settings, &configs, settings.executor.concurrency, yaml).await;
            // persist whatever was harvested, even after an error
            backend.save()?;
            let failures = outcome?;
            if failures > 0 {
                anyhow::bail!("{failures} configuration(s) failed to build");
            }
        }
        Command::List => {
            for key in backend.store.known_keys().await? {
                let age = backend
                    .store
                    .age_of(&key)
                    .await?
                    .map(format_age)
                    .unwrap_or_else(|| "-".into());
                println!("{age}\t{key}");
            }
        }
        Command::Forget { key } => {
            backend.store.forget(&key).await?;
            backend.save()?;
            println!("forgot {key}");
        }
        Command::Query { sparql, partition } => {
            let rs = backend.store.select(&sparql, partition.as_deref()).await?;
            print_results(&rs);
        }
    }

    Ok(())
}
