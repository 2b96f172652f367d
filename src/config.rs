use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::aggregate::CleanupMode;
use crate::cli::Cli;
use crate::error::{IndexError, IndexResult};

pub const DB_ENV: &str = "MOD_INDEXER_DB";
pub const CACHE_ENV: &str = "MOD_INDEXER_CACHE";
pub const MAX_THREADS_ENV: &str = "MOD_INDEXER_MAX_THREADS";
pub const DOWNLOAD_THREADS_ENV: &str = "MOD_INDEXER_DOWNLOAD_THREADS";
pub const KEEP_CACHES_ENV: &str = "KEEP_PLATFORM_CACHES";

pub const DEFAULT_MAX_THREADS: usize = 50;
pub const DEFAULT_DOWNLOAD_THREADS: usize = 8;
pub const DEFAULT_MAX_PAGES: usize = 20;

/// Settings of one indexing batch. The concurrency ceiling is not among
/// them: it belongs to the process-wide limiter, see [`resolve_max_threads`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    pub download_threads: usize,
    pub cleanup: CleanupMode,
    pub max_pages: usize,
    pub keep_caches: bool,
    pub cache_dir: PathBuf,
    pub game_version: String,
}

impl IndexerConfig {
    pub fn new(cache_dir: impl Into<PathBuf>, game_version: impl Into<String>) -> Self {
        Self {
            download_threads: DEFAULT_DOWNLOAD_THREADS,
            cleanup: CleanupMode::Incremental,
            max_pages: DEFAULT_MAX_PAGES,
            keep_caches: true,
            cache_dir: cache_dir.into(),
            game_version: game_version.into(),
        }
    }

    pub fn validate(&self) -> IndexResult<()> {
        if self.download_threads == 0 {
            return Err(IndexError::Configuration(
                "download threads must be positive".into(),
            ));
        }
        if self.max_pages == 0 {
            return Err(IndexError::Configuration("max pages must be positive".into()));
        }
        Ok(())
    }
}

pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }
    if let Ok(p) = env::var(DB_ENV) {
        return Ok(PathBuf::from(p));
    }

    Ok(indexer_home()?.join("db.lmdb"))
}

pub fn resolve_cache_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.cache.clone() {
        return Ok(p);
    }
    if let Ok(p) = env::var(CACHE_ENV) {
        return Ok(PathBuf::from(p));
    }

    Ok(indexer_home()?.join("cache"))
}

/// Ceiling for the limiter shared by every batch in the process.
pub fn resolve_max_threads(cli: &Cli) -> Result<usize> {
    match cli.threads {
        Some(n) => positive(Some(n.to_string()), MAX_THREADS_ENV, DEFAULT_MAX_THREADS),
        None => positive(env::var(MAX_THREADS_ENV).ok(), MAX_THREADS_ENV, DEFAULT_MAX_THREADS),
    }
}

pub fn resolve_download_threads(cli: &Cli) -> Result<usize> {
    match cli.download_threads {
        Some(n) => positive(Some(n.to_string()), DOWNLOAD_THREADS_ENV, DEFAULT_DOWNLOAD_THREADS),
        None => positive(
            env::var(DOWNLOAD_THREADS_ENV).ok(),
            DOWNLOAD_THREADS_ENV,
            DEFAULT_DOWNLOAD_THREADS,
        ),
    }
}

pub fn resolve_keep_caches() -> bool {
    flag(env::var(KEEP_CACHES_ENV).ok(), true)
}

fn positive(value: Option<String>, name: &str, default: usize) -> Result<usize> {
    let Some(value) = value else {
        return Ok(default);
    };
    let n: usize = value
        .trim()
        .parse()
        .with_context(|| format!("{name} is not a number: {value:?}"))?;
    if n == 0 {
        anyhow::bail!("{name} must be positive");
    }
    Ok(n)
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

pub fn clear_db(db_path: &Path) -> Result<()> {
    remove_file_if_exists(db_path, "db")?;
    remove_file_if_exists(&lmdb_lock_path(db_path), "db lock")?;
    Ok(())
}

fn indexer_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("mod-indexer"))
}

pub fn lmdb_lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-lock");
    PathBuf::from(os)
}

fn remove_file_if_exists(path: &Path, kind: &str) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {kind} file: {}", path.display()))?;
    }
    Ok(())
}
