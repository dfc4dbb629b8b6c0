/// Cadence - external music folder sync and import
use cadence_core::SourceType;
use cadence_daemon::{CadenceConfig, Library};
use cadence_importer::ImportProgress;
use cadence_storage::PageRequest;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "cadence=info,cadence_daemon=info,cadence_importer=info,cadence_access=info,cadence_storage=info";

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Sync, import and relocate music from external folders", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a music folder and make it the current source
    Register {
        /// Root directory of the source
        path: PathBuf,
        /// Source kind: folder, volume or cloud
        #[arg(short, long, default_value = "folder")]
        kind: String,
    },
    /// List registered sources
    Sources,
    /// Switch the current source
    Use {
        source_id: i64,
    },
    /// Remove a source and its path index (imported songs are kept)
    Remove {
        source_id: i64,
    },
    /// Rescan the current source
    Sync,
    /// Search the current source's indexed paths
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Import from the current source
    Import {
        /// Only import entries matching this search; everything otherwise
        query: Option<String>,
    },
    /// Search imported songs
    Songs {
        query: String,
        #[arg(short, long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 25)]
        page_size: u32,
    },
    /// Run the background copy service until interrupted
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = CadenceConfig::load(cli.config.as_deref())?;
    let library = Library::open(&config).await?;

    match cli.command {
        Commands::Register { path, kind } => register(&library, &path, &kind).await?,
        Commands::Sources => list_sources(&library).await?,
        Commands::Use { source_id } => {
            library
                .registry
                .set_current(&library.user_id, source_id)
                .await?;
            println!("Source {source_id} is now current");
        }
        Commands::Remove { source_id } => {
            library.registry.remove(source_id).await?;
            println!("Removed source {source_id}");
        }
        Commands::Sync => sync(&library).await?,
        Commands::Search { query, limit } => search(&library, &query, limit).await?,
        Commands::Import { query } => import(&library, query.as_deref()).await?,
        Commands::Songs {
            query,
            page,
            page_size,
        } => songs(&library, &query, PageRequest::new(page, page_size)).await?,
        Commands::Run => run(&library).await?,
    }

    Ok(())
}

async fn register(library: &Library, path: &std::path::Path, kind: &str) -> anyhow::Result<()> {
    let source_type: SourceType = kind.parse()?;
    let source = library
        .registry
        .register_root(&library.user_id, path, source_type)
        .await?;

    println!("Registered source {} at {}", source.id, source.root_path);

    let report = library.indexer.sync_source(source.id).await?;
    println!(
        "Indexed {} audio files in {} directories",
        report.audio_files, report.directories
    );
    Ok(())
}

async fn list_sources(library: &Library) -> anyhow::Result<()> {
    let sources = library.registry.list(&library.user_id).await?;

    println!("Sources:");
    for source in sources {
        let marker = if source.is_current { "*" } else { " " };
        println!(
            "{} {:>4}  {:<8} {:>7} entries  {}",
            marker,
            source.id,
            source.source_type.as_str(),
            source.total_paths,
            source.root_path
        );
        if let Some(error) = source.sync_error {
            println!("         last error: {error}");
        }
    }
    Ok(())
}

async fn sync(library: &Library) -> anyhow::Result<()> {
    let report = library.indexer.sync_current(&library.user_id).await?;
    println!(
        "Run {}: {} audio, {} directories, {} other files skipped; {} new, {} pruned",
        report.run_id,
        report.audio_files,
        report.directories,
        report.other_files,
        report.inserted,
        report.pruned
    );
    Ok(())
}

async fn search(library: &Library, query: &str, limit: u32) -> anyhow::Result<()> {
    let hits = library.search_paths(query, limit).await?;
    if hits.is_empty() {
        println!("No matches");
    }
    for (hit, row) in hits {
        let kind = if row.is_directory { "dir " } else { "file" };
        println!("{kind}  {:>8.3}  {}", hit.rank, row.relative_path);
    }
    Ok(())
}

async fn import(library: &Library, query: Option<&str>) -> anyhow::Result<()> {
    let selection = library.selection(query).await?;
    if selection.is_empty() {
        println!("Nothing to import");
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel::<ImportProgress>(32);
    let reporter = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            tracing::info!("{:5.1}%  {}", progress.percent, progress.current_path);
        }
    });

    let importer = library.importer.clone();
    let run = tokio::spawn(async move { importer.import_selection(&selection, Some(tx)).await });

    tokio::select! {
        result = run => {
            let summary = result??;
            println!(
                "Import {:?}: {} imported, {} skipped, {} unresolved",
                summary.outcome, summary.imported, summary.skipped, summary.unresolved
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling import");
            library.importer.cancel_current().await;
        }
    }

    let _ = reporter.await;
    Ok(())
}

async fn songs(library: &Library, query: &str, request: PageRequest) -> anyhow::Result<()> {
    let page = library.search_songs(query, request).await?;

    for song in &page.items {
        println!(
            "{:>6}  {} - {} ({})  [{}]",
            song.id, song.artist, song.title, song.album, song.file_state
        );
    }
    println!(
        "Page {} of {} ({} songs)",
        page.page + 1,
        page.total_pages.max(1),
        page.total
    );
    Ok(())
}

async fn run(library: &Library) -> anyhow::Result<()> {
    let Some(handle) = library.copier.start() else {
        return Ok(());
    };
    tracing::info!("Copy service running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    handle.abort();
    library.access.release_all();

    tracing::info!("Copy service stopped");
    Ok(())
}
