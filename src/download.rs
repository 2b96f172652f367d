//! On-disk download cache and the prefetch pool that fills it.

use rayon::ThreadPool;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::artifact::content_hash;
use crate::error::{IndexError, IndexResult};
use crate::platform::{Platform, PlatformFile};

pub type Payload = Arc<Vec<u8>>;

#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
    keep: bool,
}

impl DownloadCache {
    /// With `keep` off, payloads are never left on disk after reading.
    pub fn new(dir: impl Into<PathBuf>, keep: bool) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file: &PlatformFile) -> PathBuf {
        self.dir
            .join(&file.link.platform)
            .join(format!("{}.jar", file.link.file_id))
    }

    fn verify(file: &PlatformFile, bytes: &[u8]) -> IndexResult<()> {
        if file.hash.is_empty() {
            return Ok(());
        }
        let actual = content_hash(bytes);
        if !actual.eq_ignore_ascii_case(&file.hash) {
            return Err(IndexError::download(
                file.link.to_string(),
                format!("hash mismatch: expected {}, got {actual}", file.hash),
            ));
        }
        Ok(())
    }

    fn cached(&self, file: &PlatformFile) -> Option<Vec<u8>> {
        let path = self.path_for(file);
        let len = std::fs::metadata(&path).ok()?.len();
        if len != file.length {
            return None;
        }
        let bytes = std::fs::read(&path).ok()?;
        if Self::verify(file, &bytes).is_err() {
            warn!(path = %path.display(), "discarding corrupt cached download");
            let _ = std::fs::remove_file(&path);
            return None;
        }
        if !self.keep {
            let _ = std::fs::remove_file(&path);
        }
        Some(bytes)
    }

    /// Cached bytes when the on-disk length matches, a fresh download
    /// otherwise.
    pub fn fetch(&self, platform: &dyn Platform, file: &PlatformFile) -> IndexResult<Payload> {
        if let Some(bytes) = self.cached(file) {
            debug!(file = %file.link, "download cache hit");
            return Ok(Arc::new(bytes));
        }

        let bytes = platform.download(file)?;
        Self::verify(file, &bytes)?;
        if self.keep {
            let path = self.path_for(file);
            let written = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .and_then(|_| std::fs::write(&path, &bytes));
            if let Err(e) = written {
                warn!(path = %path.display(), error = %e, "could not cache download");
            }
        }
        debug!(file = %file.link, bytes = bytes.len(), "downloaded");
        Ok(Arc::new(bytes))
    }
}

/// Fixed-size pool that downloads ahead of indexing.
pub struct Prefetcher {
    pool: ThreadPool,
    cache: DownloadCache,
}

impl Prefetcher {
    pub fn new(cache: DownloadCache, threads: usize) -> IndexResult<Self> {
        if threads == 0 {
            return Err(IndexError::Configuration(
                "download threads must be positive".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("download-{i}"))
            .build()
            .map_err(|e| IndexError::Configuration(e.to_string()))?;
        Ok(Self { pool, cache })
    }

    pub fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    /// Downloads every file; results keep the input order.
    pub fn fetch_all(
        &self,
        platform: &dyn Platform,
        files: Vec<PlatformFile>,
    ) -> Vec<(PlatformFile, IndexResult<Payload>)> {
        self.pool.install(|| {
            files
                .into_par_iter()
                .map(|file| {
                    let result = self.cache.fetch(platform, &file);
                    (file, result)
                })
                .collect()
        })
    }
}

impl std::fmt::Debug for Prefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prefetcher")
            .field("threads", &self.pool.current_num_threads())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PlatformLink;
    use crate::platform::SearchPage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        bytes: Vec<u8>,
        downloads: AtomicUsize,
    }

    impl Platform for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn search(&self, _game_version: &str, _page_token: Option<&str>) -> IndexResult<SearchPage> {
            Ok(SearchPage::default())
        }

        fn file(&self, _project_id: u64, _file_id: u64) -> IndexResult<Option<PlatformFile>> {
            Ok(None)
        }

        fn download(&self, _file: &PlatformFile) -> IndexResult<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(self.bytes.clone())
        }

        fn files_by_hash(&self, _hashes: &[String]) -> IndexResult<Vec<PlatformFile>> {
            Ok(Vec::new())
        }
    }

    fn temp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{prefix}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn file_for(bytes: &[u8], file_id: u64) -> PlatformFile {
        PlatformFile {
            link: PlatformLink::new("fixed", 1, file_id),
            file_name: format!("{file_id}.jar"),
            hash: content_hash(bytes),
            length: bytes.len() as u64,
        }
    }

    #[test]
    fn cached_files_are_reused() {
        let dir = temp_dir("mod-indexer-download");
        let platform = Fixed {
            bytes: b"jar bytes".to_vec(),
            downloads: AtomicUsize::new(0),
        };
        let cache = DownloadCache::new(&dir, true);
        let file = file_for(b"jar bytes", 7);

        assert_eq!(cache.fetch(&platform, &file).unwrap().as_slice(), b"jar bytes");
        assert!(cache.path_for(&file).exists());
        assert_eq!(cache.fetch(&platform, &file).unwrap().as_slice(), b"jar bytes");
        assert_eq!(platform.downloads.load(Ordering::SeqCst), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn hash_mismatch_is_a_retryable_download_error() {
        let dir = temp_dir("mod-indexer-download-bad");
        let platform = Fixed {
            bytes: b"tampered".to_vec(),
            downloads: AtomicUsize::new(0),
        };
        let cache = DownloadCache::new(&dir, false);
        let err = cache.fetch(&platform, &file_for(b"original", 8)).unwrap_err();
        assert!(matches!(err, IndexError::Download { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn prefetch_keeps_input_order() {
        let dir = temp_dir("mod-indexer-prefetch");
        let platform = Fixed {
            bytes: b"x".to_vec(),
            downloads: AtomicUsize::new(0),
        };
        let prefetcher = Prefetcher::new(DownloadCache::new(&dir, false), 3).unwrap();
        let files: Vec<_> = (0..10).map(|i| file_for(b"x", i)).collect();
        let results = prefetcher.fetch_all(&platform, files);
        let ids: Vec<_> = results.iter().map(|(f, _)| f.link.file_id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(matches!(
            Prefetcher::new(DownloadCache::new(&dir, false), 0),
            Err(IndexError::Configuration(_))
        ));
    }
}
