//! Campaign Dungeon Master command line.
//!
//! ```bash
//! cargo run -p dm -- --data-dir data play
//! cargo run -p dm -- context "Who is Ireena Kolyana?"
//! cargo run -p dm -- world
//! cargo run -p dm -- reset --yes
//! ```

mod play;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dm_core::{
    clear_collections, ContextRetriever, DmConfig, DungeonMaster, Embedder, HttpEmbedder, MemoryVectorStore,
    QueryIntent, VectorStore, WorldStateStore,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dm")]
#[command(about = "Campaign Dungeon Master backed by an OpenAI-compatible model server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "DM_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the vector store snapshot
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Chat model name
    #[arg(long)]
    model: Option<String>,

    /// Disable streamed narration
    #[arg(long)]
    no_stream: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play an interactive session
    Play,

    /// Print the context the DM would receive for a query
    Context {
        /// The player query
        query: String,

        /// Override the chunk budget
        #[arg(short = 'n', long)]
        max_chunks: Option<usize>,

        /// Session id whose live entries may be used
        #[arg(long)]
        session: Option<String>,

        /// Show provenance and distance for each item
        #[arg(short, long)]
        verbose: bool,
    },

    /// Clear sessions, characters and world state, keeping campaign content
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the current world state
    World {
        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dm=info,dm_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli).await?;

    let store: Arc<dyn VectorStore> = Arc::new(open_store(&config).await?);
    let client = config.llm_client();
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
        client.clone(),
        &config.ai.embedding_model_name,
    ));

    match cli.command {
        Commands::Play => {
            let dm = DungeonMaster::new(Arc::new(client), store, embedder, config);
            match dm.retriever().test_retrieval("Barovia").await {
                Ok(true) => {}
                Ok(false) => warn!("campaign collection returned nothing for a probe query"),
                Err(e) => warn!(error = %e, "retrieval self-test failed"),
            }
            play::run(dm).await
        }
        Commands::Context {
            query,
            max_chunks,
            session,
            verbose,
        } => {
            let world = Arc::new(Mutex::new(WorldStateStore::new(
                store.clone(),
                embedder.clone(),
                config.database.world_state_collection.clone(),
            )));
            let retriever = ContextRetriever::new(store, embedder, world, &config);

            if verbose {
                println!("Intent: {:?}", QueryIntent::classify(&query));
                let items = retriever
                    .retrieve(&query, max_chunks, session.as_deref())
                    .await
                    .context("retrieval failed")?;
                for item in &items {
                    println!("{:<40} {:.4}", item.label(), item.distance());
                }
                println!();
            }

            let context = retriever
                .get_relevant_context(&query, max_chunks, session.as_deref())
                .await;
            if context.is_empty() {
                println!("(no relevant context)");
            } else {
                println!("{context}");
            }
            Ok(())
        }
        Commands::Reset { yes } => {
            let collections = config.database.progress_collections();
            if !yes && !confirm(&format!("Clear {}?", collections.join(", ")))? {
                println!("Reset cancelled.");
                return Ok(());
            }
            let removed = clear_collections(store.as_ref(), &collections)
                .await
                .context("failed to reset campaign progress")?;
            println!("Campaign progress reset ({removed} records removed). Campaign content kept.");
            Ok(())
        }
        Commands::World { json } => {
            let mut world = WorldStateStore::new(
                store,
                embedder,
                config.database.world_state_collection.clone(),
            );
            let state = world.load().await.context("failed to load world state")?;
            if json {
                let json = serde_json::to_string_pretty(state)
                    .context("failed to encode world state")?;
                println!("{json}");
            } else {
                println!("{}", state.context_summary());
                println!();
                println!("{}", state.summary_blurb());
            }
            Ok(())
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn load_config(cli: &Cli) -> Result<DmConfig> {
    let mut config = match &cli.config {
        Some(path) => DmConfig::load(path)
            .await
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => DmConfig::new(),
    };
    config = config.apply_env().context("invalid DM_* environment")?;

    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if cli.no_stream {
        config = config.with_streaming(false);
    }
    Ok(config)
}

async fn open_store(config: &DmConfig) -> Result<MemoryVectorStore> {
    match config.database.snapshot_path() {
        Some(path) => {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
            let store = MemoryVectorStore::open(&path)
                .await
                .with_context(|| format!("failed to open store {}", path.display()))?;
            info!(path = %path.display(), "using persistent store");
            Ok(store)
        }
        None => {
            info!("no data directory configured, store lives in memory");
            Ok(MemoryVectorStore::new())
        }
    }
}
