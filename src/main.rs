use anyhow::{bail, Context};
use clap::Parser;
use journal2vec::core::config::{Config, Settings, SettingsPatch};
use journal2vec::engine::Engine;
use journal2vec::search::model::EmbeddingModel;
use journal2vec::search::query::QueryRequest;
use journal2vec::search::rerank::CrossEncoder;
use journal2vec::ui::cli::{Cli, Commands};
use journal2vec::ui::watch::FileWatcher;
use journal2vec::Granularity;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = cli.base_dir.as_deref().map(PathBuf::from);

    match cli.command {
        Commands::Init => handle_init(base_dir),
        Commands::Index => handle_index(base_dir),
        Commands::Watch => handle_watch(base_dir),
        Commands::Search {
            query,
            mode,
            recency_weight,
            n_results,
            json,
        } => handle_search(base_dir, &query, mode.as_deref(), recency_weight, n_results, json),
        Commands::Settings {
            docs_dir,
            timezone,
            include_titles,
            mode,
            recency_weight,
            n_candidates,
            n_results,
        } => handle_settings(
            base_dir,
            docs_dir,
            SettingsPatch {
                timezone,
                include_titles,
                retrieval_mode: mode
                    .as_deref()
                    .map(str::parse::<Granularity>)
                    .transpose()?,
                recency_weight,
                n_candidates,
                n_results,
            },
        ),
        Commands::Status => handle_status(base_dir),
        Commands::Reset => handle_reset(base_dir),
    }
}

fn handle_init(base_dir: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Initializing journal2vec...");

    let config = Config::new(base_dir)?;
    config.init()?;
    println!("✓ Created base directory: {:?}", config.base_dir);
    println!("✓ Created index directory: {:?}", config.index_dir);
    println!("✓ Created models directory: {:?}", config.models_dir);

    let settings = Settings::load(&config.settings_path);
    println!("✓ Wrote settings file: {:?}", config.settings_path);

    EmbeddingModel::init_verbose(&config).context("failed to set up the embedding model")?;
    CrossEncoder::init_verbose(&config).context("failed to set up the reranker model")?;

    println!("\nInitialization complete!");
    println!("Journal directory: {:?}", settings.docs_dir);
    println!("Next steps:");
    println!("  1. Point journal2vec at your journal: journal2vec settings --docs-dir /path/to/journal");
    println!("  2. Build the index: journal2vec index");
    println!("  3. Or keep it updated continuously: journal2vec watch");

    Ok(())
}

fn handle_index(base_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = open_engine(base_dir)?;
    let docs_dir = engine.settings().docs_dir;
    println!("Indexing journal files from: {}", docs_dir.display());

    let stats = engine.refresh()?;
    let status = engine.status();

    println!("\nIndexing complete!");
    println!("  Files indexed: {}", stats.files_indexed);
    if stats.files_failed > 0 {
        println!("  Files failed:  {}", stats.files_failed);
    }
    println!(
        "  Segments: {} days, {} memories, {} sections, {} lines",
        status.indexed_segments.day,
        status.indexed_segments.memory,
        status.indexed_segments.section,
        status.indexed_segments.line
    );
    Ok(())
}

fn handle_watch(base_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = open_engine(base_dir)?;
    let docs_dir = engine.settings().docs_dir;

    println!("Building initial index from: {}", docs_dir.display());
    let stats = engine.refresh()?;
    println!("✓ Indexed {} files", stats.files_indexed);

    println!("Watching directory: {}", docs_dir.display());
    println!("Press Ctrl+C to stop watching...\n");

    let watcher = FileWatcher::new(&docs_dir, engine);
    watcher.watch()?;
    Ok(())
}

fn handle_search(
    base_dir: Option<PathBuf>,
    query: &str,
    mode: Option<&str>,
    recency_weight: Option<f32>,
    n_results: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(base_dir)?;

    let request = QueryRequest {
        text: query.to_string(),
        mode: mode.map(str::parse::<Granularity>).transpose()?,
        recency_weight,
        n_results,
    };
    let results = engine.query(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        println!("If the index is empty, run 'journal2vec index' first.");
        return Ok(());
    }

    println!("Found {} results:", results.len());
    for (i, result) in results.iter().enumerate() {
        println!(
            "\n{}. [{:.3}] {}",
            i + 1,
            result.score,
            result.title.as_deref().unwrap_or("(untitled)")
        );
        let mut meta = Vec::new();
        if let Some(date) = result.date {
            meta.push(format!("Date: {}", date));
        }
        if let Some(memory) = &result.parent_memory {
            meta.push(format!("Memory: {}", memory));
        }
        if let Some(section) = &result.parent_section {
            meta.push(format!("Section: {}", section));
        }
        if !meta.is_empty() {
            println!("   {}", meta.join(" | "));
        }
        let preview: String = result.text.chars().take(200).collect();
        println!("   {}", preview);
    }
    Ok(())
}

fn handle_settings(
    base_dir: Option<PathBuf>,
    docs_dir: Option<String>,
    patch: SettingsPatch,
) -> anyhow::Result<()> {
    let config = Config::new(base_dir)?;
    let mut settings = Settings::load(&config.settings_path);

    let has_patch = patch.timezone.is_some()
        || patch.include_titles.is_some()
        || patch.retrieval_mode.is_some()
        || patch.recency_weight.is_some()
        || patch.n_candidates.is_some()
        || patch.n_results.is_some();

    if docs_dir.is_none() && !has_patch {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    if let Some(dir) = docs_dir {
        settings.docs_dir = PathBuf::from(dir);
    }
    settings.apply(&patch)?;
    settings.save(&config.settings_path)?;

    println!("Settings updated:");
    println!("{}", serde_json::to_string_pretty(&settings)?);
    println!("\nRun 'journal2vec index' to apply them to the index.");
    Ok(())
}

fn handle_status(base_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = open_engine(base_dir)?;
    let status = engine.status();

    println!("Indexed vectors:");
    for granularity in Granularity::ALL {
        println!(
            "  {:<8} {}",
            granularity,
            status.indexed_vectors.get(granularity)
        );
    }
    println!(
        "\nNote: segment text is rebuilt on each 'index' or 'watch' run,\n\
         so a fresh process reports vectors only."
    );
    Ok(())
}

fn handle_reset(base_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = open_engine(base_dir)?;
    engine.reset()?;
    println!("Index cleared. Run 'journal2vec index' to re-index your journal.");
    Ok(())
}

/// Open the engine with the real candle models. Fails with a pointer to
/// `init` when the base directory has not been set up yet.
fn open_engine(base_dir: Option<PathBuf>) -> anyhow::Result<Arc<Engine>> {
    let config = Config::new(base_dir)?;
    if !config.is_initialized() {
        bail!("journal2vec is not initialized. Run 'journal2vec init' first.");
    }
    config.init()?;

    let settings = Settings::load(&config.settings_path);
    let embedder = Arc::new(EmbeddingModel::init(&config).context("failed to load the embedding model")?);
    let reranker = Arc::new(CrossEncoder::init(&config).context("failed to load the reranker model")?);

    Ok(Arc::new(Engine::new(&config, settings, embedder, reranker)))
}
