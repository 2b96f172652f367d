use anyhow::{Context, Result};
use clap::Parser;
use mod_indexer::aggregate::CleanupMode;
use mod_indexer::artifact::{ArtifactSummary, ModArtifact};
use mod_indexer::cli::{Cli, Commands};
use mod_indexer::config::{
    DEFAULT_MAX_PAGES, IndexerConfig, clear_db, resolve_cache_dir, resolve_db_path,
    resolve_download_threads, resolve_keep_caches, resolve_max_threads,
};
use mod_indexer::enums::EnumExtension;
use mod_indexer::index::{IndexOptions, index_jar};
use mod_indexer::limiter::ConcurrencyLimiter;
use mod_indexer::lmdb::LmdbStore;
use mod_indexer::pipeline::Indexer;
use mod_indexer::platform::LocalPlatform;
use mod_indexer::progress::LogProgress;
use mod_indexer::record::{ClassRecord, InheritanceEntry};
use mod_indexer::resolve::IdentityCache;
use mod_indexer::sanitize::Sanitizer;
use mod_indexer::schema;
use mod_indexer::store::{IndexedMod, ModStore, ReferenceRow};
use mod_indexer::tags::TagFile;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.clone() {
        Commands::Clear => {
            let db_path = resolve_db_path(&cli)?;
            clear_db(&db_path)?;
        }
        Commands::Stats => {
            let store = open_store(&cli)?;
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&schema::tables())?);
        }
        Commands::Show { mod_id } => {
            let store = open_store(&cli)?;
            let output = show_mod(&store, mod_id)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Inspect {
            jar_path,
            raw,
            no_refs,
        } => {
            let output = inspect_jar(&jar_path, raw, no_refs)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Index {
            root,
            game_version,
            platform,
            page_size,
            max_pages,
            full_cleanup,
        } => {
            let start = Instant::now();
            let store: Arc<dyn ModStore> = Arc::new(open_store(&cli)?);
            let mut config = IndexerConfig::new(resolve_cache_dir(&cli)?, game_version);
            config.download_threads = resolve_download_threads(&cli)?;
            config.keep_caches = resolve_keep_caches();
            config.max_pages = max_pages.unwrap_or(DEFAULT_MAX_PAGES);
            if full_cleanup {
                config.cleanup = CleanupMode::Full;
            }

            let limiter = Arc::new(ConcurrencyLimiter::new(resolve_max_threads(&cli)?)?);
            let indexer = Indexer::new(store, limiter, Arc::new(IdentityCache::new()), config)?;
            let platform = LocalPlatform::new(platform, root).with_page_size(page_size);
            let progress = LogProgress::new();
            let report = indexer
                .run(&platform, &progress)
                .context("Indexing batch failed")?;
            let output = IndexOutput {
                report,
                progress: progress.snapshot(),
                duration_ms: start.elapsed().as_millis() as u64,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_store(cli: &Cli) -> Result<LmdbStore> {
    let db_path = resolve_db_path(cli)?;
    LmdbStore::open(db_path.clone())
        .with_context(|| format!("Failed to open database: {}", db_path.display()))
}

#[derive(Debug, Serialize)]
struct IndexOutput {
    #[serde(flatten)]
    report: mod_indexer::pipeline::BatchReport,
    progress: mod_indexer::progress::ProgressSnapshot,
    duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct NestedOutput {
    identifier: String,
    version: String,
    content_hash: String,
}

#[derive(Debug, Serialize)]
struct InspectResult {
    jar_path: String,
    artifact: ArtifactSummary,
    nested: Vec<NestedOutput>,
    tags: usize,
    enum_extensions: Vec<EnumExtension>,
    rules: Vec<&'static str>,
    class_count: usize,
    reference_count: u64,
    classes: Vec<ClassRecord>,
    duration_ms: u64,
}

fn inspect_jar(jar_path: &Path, raw: bool, no_refs: bool) -> Result<InspectResult> {
    let start = Instant::now();
    let bytes = std::fs::read(jar_path)
        .with_context(|| format!("Failed to read jar: {}", jar_path.display()))?;
    let artifact = ModArtifact::read(Arc::new(bytes), None, None)
        .with_context(|| format!("Failed to read artifact: {}", jar_path.display()))?
        .ok_or_else(|| anyhow::anyhow!("Not a mod or library jar: {}", jar_path.display()))?;

    let options = if no_refs {
        IndexOptions::without_references()
    } else {
        IndexOptions::default()
    };
    let sanitizer = if raw {
        Sanitizer::passthrough()
    } else {
        Sanitizer::standard()
    };
    let classes = index_jar(artifact.payload(), &options)
        .with_context(|| format!("Failed to index classes: {}", jar_path.display()))?;
    let classes = sanitizer.sanitize(classes);

    Ok(InspectResult {
        jar_path: jar_path.to_string_lossy().to_string(),
        artifact: artifact.summary(),
        nested: artifact
            .nested
            .iter()
            .map(|n| NestedOutput {
                identifier: n.identifier.clone(),
                version: n.version.to_string(),
                content_hash: n.artifact.content_hash.clone(),
            })
            .collect(),
        tags: artifact.tags()?.len(),
        enum_extensions: artifact.enum_extensions()?,
        rules: sanitizer.rule_names(),
        class_count: classes.len(),
        reference_count: classes.iter().map(ClassRecord::reference_count).sum(),
        classes,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[derive(Debug, Serialize)]
struct ShowResult {
    #[serde(rename = "mod")]
    indexed: IndexedMod,
    class_count: usize,
    references: Vec<ReferenceRow>,
    inheritance: Vec<InheritanceEntry>,
    tags: Vec<TagFile>,
    enum_extensions: Vec<EnumExtension>,
}

fn show_mod(store: &LmdbStore, mod_id: u64) -> Result<ShowResult> {
    let indexed = store
        .get_mod(mod_id)?
        .ok_or_else(|| anyhow::anyhow!("No mod with id {mod_id}"))?;
    Ok(ShowResult {
        indexed,
        class_count: store.classes(mod_id)?.len(),
        references: store.references(mod_id)?,
        inheritance: store.inheritance(mod_id)?,
        tags: store.tags(mod_id)?,
        enum_extensions: store.enum_extensions(mod_id)?,
    })
}
