//! Marketplace backends.
//!
//! A [`Platform`] lists candidate files for a game version page by page,
//! describes single files and downloads their bytes. Backends differ in
//! pagination and rate limits; the pipeline only sees this trait.

use ignore::WalkBuilder;
use memmap2::Mmap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use tracing::debug;

use crate::artifact::content_hash;
use crate::error::{IndexError, IndexResult};
use crate::identity::PlatformLink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFile {
    pub link: PlatformLink,
    pub file_name: String,
    /// SHA-256, hex encoded.
    pub hash: String,
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub files: Vec<PlatformFile>,
    /// Token for the following page, if any.
    pub next: Option<String>,
}

pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, game_version: &str, page_token: Option<&str>) -> IndexResult<SearchPage>;

    fn file(&self, project_id: u64, file_id: u64) -> IndexResult<Option<PlatformFile>>;

    fn download(&self, file: &PlatformFile) -> IndexResult<Vec<u8>>;

    /// Listed files whose content hash is one of `hashes`. Hashes the
    /// platform does not know are simply absent from the result.
    fn files_by_hash(&self, hashes: &[String]) -> IndexResult<Vec<PlatformFile>>;
}

type Listing = Arc<Vec<(u64, u64, PathBuf)>>;

/// Directory-backed platform: `<root>[/<game version>]/<project id>/<file id>.jar`.
///
/// Directory listings and the hash index are built once per instance, so a
/// platform reflects the tree as it was when first searched.
#[derive(Debug)]
pub struct LocalPlatform {
    name: String,
    root: PathBuf,
    page_size: usize,
    listings: Mutex<HashMap<PathBuf, Listing>>,
    by_hash: Mutex<Option<Arc<HashMap<String, PlatformFile>>>>,
}

impl LocalPlatform {
    pub const DEFAULT_PAGE_SIZE: usize = 50;

    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            listings: Mutex::new(HashMap::new()),
            by_hash: Mutex::new(None),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, game_version: &str) -> PathBuf {
        let dir = self.root.join(game_version);
        if !game_version.is_empty() && dir.is_dir() {
            dir
        } else {
            self.root.clone()
        }
    }

    /// `(project id, file id, path)` for every well-formed jar under `base`,
    /// ordered. Scanned on first use.
    fn listing(&self, base: &Path) -> Listing {
        if let Some(cached) = self.listings.lock().get(base) {
            return Arc::clone(cached);
        }
        let listing = Arc::new(scan_listing(base));
        self.listings
            .lock()
            .insert(base.to_path_buf(), Arc::clone(&listing));
        listing
    }

    fn hash_index(&self) -> IndexResult<Arc<HashMap<String, PlatformFile>>> {
        if let Some(index) = self.by_hash.lock().as_ref() {
            return Ok(Arc::clone(index));
        }
        let mut index = HashMap::new();
        for (project, file, path) in self.listing(&self.root).iter() {
            let described = self.describe(*project, *file, path)?;
            index.entry(described.hash.clone()).or_insert(described);
        }
        let index = Arc::new(index);
        *self.by_hash.lock() = Some(Arc::clone(&index));
        Ok(index)
    }

    fn describe(&self, project_id: u64, file_id: u64, path: &Path) -> IndexResult<PlatformFile> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        let hash = if length == 0 {
            content_hash(&[])
        } else {
            // SAFETY: The file is opened read-only and outlives the map; the
            // map is dropped at the end of this block.
            let mmap = unsafe { Mmap::map(&file)? };
            content_hash(&mmap[..])
        };
        Ok(PlatformFile {
            link: PlatformLink::new(self.name.clone(), project_id, file_id),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            hash,
            length,
        })
    }

    fn path_of(&self, project_id: u64, file_id: u64) -> Option<PathBuf> {
        let listing = self.listing(&self.root);
        listing
            .binary_search_by(|(project, id, _)| (*project, *id).cmp(&(project_id, file_id)))
            .ok()
            .map(|i| listing[i].2.clone())
    }
}

impl Platform for LocalPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, game_version: &str, page_token: Option<&str>) -> IndexResult<SearchPage> {
        let base = self.version_dir(game_version);
        if !base.is_dir() {
            return Err(IndexError::Platform(format!(
                "platform directory not found: {}",
                base.display()
            )));
        }
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| IndexError::Platform(format!("bad page token: {token:?}")))?,
            None => 0,
        };

        let listing = self.listing(&base);
        let end = (offset + self.page_size).min(listing.len());
        let mut files = Vec::new();
        for (project, file, path) in listing.iter().take(end).skip(offset) {
            files.push(self.describe(*project, *file, path)?);
        }
        let next = (end < listing.len()).then(|| end.to_string());
        Ok(SearchPage { files, next })
    }

    fn file(&self, project_id: u64, file_id: u64) -> IndexResult<Option<PlatformFile>> {
        self.path_of(project_id, file_id)
            .map(|path| self.describe(project_id, file_id, &path))
            .transpose()
    }

    fn download(&self, file: &PlatformFile) -> IndexResult<Vec<u8>> {
        let path = self
            .path_of(file.link.project_id, file.link.file_id)
            .ok_or_else(|| IndexError::download(file.link.to_string(), "file no longer listed"))?;
        std::fs::read(&path).map_err(|e| IndexError::download(file.link.to_string(), e))
    }

    fn files_by_hash(&self, hashes: &[String]) -> IndexResult<Vec<PlatformFile>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let index = self.hash_index()?;
        Ok(hashes.iter().filter_map(|h| index.get(h).cloned()).collect())
    }
}

fn scan_listing(base: &Path) -> Vec<(u64, u64, PathBuf)> {
    let mut found: Vec<_> = scan_jars(base)
        .into_iter()
        .filter_map(|path| {
            let ids = parse_ids(&path);
            if ids.is_none() {
                debug!(path = %path.display(), "skipping jar outside the <project>/<file>.jar layout");
            }
            ids.map(|(project, file)| (project, file, path))
        })
        .collect();
    found.sort();
    // Equal ids under two version directories: keep the first path.
    found.dedup_by(|b, a| a.0 == b.0 && a.1 == b.1);
    found
}

fn parse_ids(path: &Path) -> Option<(u64, u64)> {
    let file_id = path.file_stem()?.to_str()?.parse().ok()?;
    let project_id = path.parent()?.file_name()?.to_str()?.parse().ok()?;
    Some((project_id, file_id))
}

pub fn scan_jars(base_path: &Path) -> Vec<PathBuf> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "jar") {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    rx.iter().collect()
}
