//! Batch orchestration: enumerate a platform, download, expand, resolve,
//! index, sanitize and commit.
//!
//! Each artifact is one task. A task only blocks on its batch's gate; all
//! network work happens up front on the download pool. Failures are scoped to
//! the artifact that raised them, except platform enumeration, which aborts
//! the batch. This includes panics: each artifact's read and processing runs
//! under `catch_unwind`, and the batch leaves the limiter through a guard.

use rayon::ThreadPool;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::aggregate::{CleanupMode, ReferenceAggregator, cleanup};
use crate::artifact::ModArtifact;
use crate::config::IndexerConfig;
use crate::download::{DownloadCache, Prefetcher};
use crate::error::{IndexError, IndexResult};
use crate::expand::{Candidate, bundled_hashes, expand};
use crate::identity::PlatformLink;
use crate::index::{IndexOptions, index_jar};
use crate::limiter::ConcurrencyLimiter;
use crate::platform::{Platform, PlatformFile};
use crate::progress::ProgressMonitor;
use crate::resolve::{IdentityCache, Resolution, Resolver};
use crate::sanitize::Sanitizer;
use crate::store::{ModId, ModStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub item: String,
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub platform: String,
    pub game_version: String,
    pub pages: usize,
    pub files_seen: usize,
    /// Files skipped because an earlier pass already processed them.
    pub already_seen: usize,
    pub downloads_failed: usize,
    /// Downloaded jars that are neither mods nor loader libraries.
    pub not_mods: usize,
    pub candidates: usize,
    pub indexed: usize,
    pub linked: usize,
    pub skipped: usize,
    pub failed: Vec<FailedItem>,
    pub truncated: bool,
    pub purged: u64,
}

#[derive(Debug)]
enum Outcome {
    Indexed(ModId),
    Linked(ModId),
    Skipped(Option<ModId>),
    Failed(FailedItem),
}

pub struct Indexer {
    store: Arc<dyn ModStore>,
    limiter: Arc<ConcurrencyLimiter>,
    resolver: Resolver,
    prefetcher: Prefetcher,
    pool: ThreadPool,
    sanitizer: Sanitizer,
    options: IndexOptions,
    config: IndexerConfig,
}

impl Indexer {
    /// `limiter` and `identities` may be shared with other indexers running
    /// concurrently in the same process.
    pub fn new(
        store: Arc<dyn ModStore>,
        limiter: Arc<ConcurrencyLimiter>,
        identities: Arc<IdentityCache>,
        config: IndexerConfig,
    ) -> IndexResult<Self> {
        config.validate()?;
        let prefetcher = Prefetcher::new(
            DownloadCache::new(&config.cache_dir, config.keep_caches),
            config.download_threads,
        )?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limiter.ceiling())
            .thread_name(|i| format!("index-{i}"))
            .build()
            .map_err(|e| IndexError::Configuration(e.to_string()))?;
        Ok(Self {
            resolver: Resolver::new(Arc::clone(&store), identities),
            store,
            limiter,
            prefetcher,
            pool,
            sanitizer: Sanitizer::standard(),
            options: IndexOptions::default(),
            config,
        })
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Runs one batch against `platform`.
    pub fn run(
        &self,
        platform: &dyn Platform,
        monitor: &dyn ProgressMonitor,
    ) -> IndexResult<BatchReport> {
        let mut report = BatchReport {
            platform: platform.name().to_string(),
            game_version: self.config.game_version.clone(),
            ..BatchReport::default()
        };

        let (files, truncated) = self.enumerate(platform, &mut report)?;
        report.truncated = truncated;
        report.files_seen = files.len();

        let mut present = HashSet::new();
        let mut pending = Vec::new();
        for file in files {
            if self.config.cleanup == CleanupMode::Incremental
                && let Some(owner) = self
                    .store
                    .seen_file_owner(&file.link.platform, file.link.file_id)?
            {
                present.insert(owner);
                report.already_seen += 1;
                continue;
            }
            pending.push(file);
        }

        let candidates = self.read_candidates(platform, pending, monitor, &mut report);
        let listed = self.listed_bundles(platform, &candidates);
        let candidates = expand(candidates, &listed);
        report.candidates = candidates.len();
        let labels: Vec<String> = candidates.iter().map(Candidate::label).collect();
        monitor.set_expected(&labels);

        if !candidates.is_empty() {
            let gate = self.limiter.enter(candidates.len())?;
            info!(
                platform = platform.name(),
                candidates = candidates.len(),
                share = gate.capacity(),
                running_batches = self.limiter.shares().len(),
                "indexing batch"
            );

            for wave in waves(candidates) {
                let outcomes: Vec<Outcome> = self.pool.install(|| {
                    wave.par_iter()
                        .map(|candidate| {
                            let _permit = gate.acquire();
                            self.process(candidate, monitor)
                        })
                        .collect()
                });
                for outcome in outcomes {
                    match outcome {
                        Outcome::Indexed(id) => {
                            report.indexed += 1;
                            present.insert(id);
                        }
                        Outcome::Linked(id) => {
                            report.linked += 1;
                            present.insert(id);
                        }
                        Outcome::Skipped(id) => {
                            report.skipped += 1;
                            present.extend(id);
                        }
                        Outcome::Failed(item) => report.failed.push(item),
                    }
                }
            }
            drop(gate);
        }

        // A failed artifact may still exist upstream, so an incomplete pass
        // is treated like a truncated one.
        let incomplete = truncated || !report.failed.is_empty();
        report.purged = cleanup(self.store.as_ref(), &present, self.config.cleanup, incomplete)?;
        info!(
            platform = platform.name(),
            indexed = report.indexed,
            linked = report.linked,
            failed = report.failed.len(),
            truncated,
            "batch finished"
        );
        Ok(report)
    }

    /// Follows search pages up to the configured limit. The flag reports a
    /// page still pending when the limit was hit.
    fn enumerate(
        &self,
        platform: &dyn Platform,
        report: &mut BatchReport,
    ) -> IndexResult<(Vec<PlatformFile>, bool)> {
        let mut files = Vec::new();
        let mut token: Option<String> = None;
        for _ in 0..self.config.max_pages {
            let page = platform.search(&self.config.game_version, token.as_deref())?;
            report.pages += 1;
            files.extend(page.files);
            token = page.next;
            if token.is_none() {
                break;
            }
        }
        if token.is_some() {
            warn!(
                platform = platform.name(),
                pages = report.pages,
                "search truncated, cleanup disabled for this pass"
            );
        }
        Ok((files, token.is_some()))
    }

    fn read_candidates(
        &self,
        platform: &dyn Platform,
        files: Vec<PlatformFile>,
        monitor: &dyn ProgressMonitor,
        report: &mut BatchReport,
    ) -> Vec<Candidate> {
        let downloaded = self.prefetcher.fetch_all(platform, files);
        let read: Vec<(PlatformFile, IndexResult<Option<ModArtifact>>)> = self.pool.install(|| {
            downloaded
                .into_par_iter()
                .map(|(file, payload)| {
                    let artifact = payload.and_then(|p| {
                        catch_unwind(AssertUnwindSafe(|| ModArtifact::read(p, None, None)))
                            .unwrap_or_else(|panic| Err(IndexError::from_panic(panic)))
                    });
                    (file, artifact)
                })
                .collect()
        });

        let mut candidates = Vec::new();
        for (file, artifact) in read {
            let item = format!("{} ({})", file.file_name, file.link);
            match artifact {
                Ok(Some(artifact)) => candidates.push(Candidate::from_platform(artifact, file.link)),
                Ok(None) => {
                    report.not_mods += 1;
                    monitor.mark_skipped(&item);
                }
                Err(e) => {
                    if matches!(e, IndexError::Download { .. }) {
                        report.downloads_failed += 1;
                    }
                    monitor.raise_error(&item, &e);
                    report.failed.push(FailedItem {
                        item,
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }
        candidates
    }

    /// Platform listings of bundled jars, by content hash. A failed lookup
    /// leaves every bundled jar unlinked.
    fn listed_bundles(
        &self,
        platform: &dyn Platform,
        candidates: &[Candidate],
    ) -> HashMap<String, PlatformLink> {
        let hashes = bundled_hashes(candidates);
        if hashes.is_empty() {
            return HashMap::new();
        }
        match platform.files_by_hash(&hashes) {
            Ok(files) => files.into_iter().map(|f| (f.hash, f.link)).collect(),
            Err(e) => {
                warn!(platform = platform.name(), error = %e, "bundled jar lookup failed");
                HashMap::new()
            }
        }
    }

    fn process(&self, candidate: &Candidate, monitor: &dyn ProgressMonitor) -> Outcome {
        let label = candidate.label();
        let result = catch_unwind(AssertUnwindSafe(|| self.try_process(candidate, &label, monitor)))
            .unwrap_or_else(|panic| Err(IndexError::from_panic(panic)));
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                monitor.raise_error(&label, &e);
                Outcome::Failed(FailedItem {
                    item: label,
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                })
            }
        }
    }

    fn try_process(
        &self,
        candidate: &Candidate,
        label: &str,
        monitor: &dyn ProgressMonitor,
    ) -> IndexResult<Outcome> {
        let mod_id = match self.resolver.resolve(candidate)? {
            Resolution::Known { mod_id } => {
                monitor.mark_skipped(label);
                return Ok(Outcome::Linked(mod_id));
            }
            Resolution::Outdated { mod_id } => {
                monitor.mark_skipped(label);
                return Ok(Outcome::Skipped(Some(mod_id)));
            }
            Resolution::Unindexable => {
                monitor.mark_skipped(label);
                return Ok(Outcome::Skipped(None));
            }
            Resolution::Index { mod_id, .. } => mod_id,
        };

        let artifact = &candidate.artifact;
        let classes = index_jar(artifact.payload(), &self.options)?;
        let classes = self.sanitizer.sanitize(classes);
        monitor.mark_indexed(label);

        let mut aggregator = ReferenceAggregator::new();
        aggregator.add_classes(&classes);
        aggregator.add_tags(artifact.tags()?);
        aggregator.add_enum_extensions(artifact.enum_extensions()?);
        aggregator.commit(
            self.store.as_ref(),
            mod_id,
            Some(artifact.content_hash.clone()),
            Some(artifact.summary()),
            unix_now(),
        )?;
        self.resolver
            .cache()
            .remember(artifact.content_hash.clone(), mod_id);
        if let Some(link) = &candidate.link {
            self.store.mark_file_seen(link, mod_id)?;
        }
        monitor.mark_stored(label);
        Ok(Outcome::Indexed(mod_id))
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("config", &self.config)
            .field("sanitizer", &self.sanitizer)
            .field("options", &self.options)
            .finish()
    }
}

/// Splits candidates so that only the first candidate of each content hash
/// runs in the first wave. The rest resolve by hash in the second wave.
fn waves(candidates: Vec<Candidate>) -> Vec<Vec<Candidate>> {
    let mut seen = HashSet::new();
    let (first, rest): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| seen.insert(c.artifact.content_hash.clone()));
    [first, rest].into_iter().filter(|w| !w.is_empty()).collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{JARJAR_METADATA, MANIFEST, NEOFORGE_METADATA};
    use crate::classgen::{ClassFile, Insn, jar, jar_with_oversized_entry};
    use crate::record::ClassRecord;
    use crate::sanitize::{SanitizationRule, Siblings, Verdict};
    use crate::identity::PlatformLink;
    use crate::lmdb::LmdbStore;
    use crate::platform::LocalPlatform;
    use crate::progress::LogProgress;
    use crate::record::{RefKind, access};
    use std::path::PathBuf;

    struct Fixture {
        root: PathBuf,
        store: Arc<LmdbStore>,
    }

    impl Fixture {
        fn new(tag: &str) -> Self {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            let root = std::env::temp_dir().join(format!(
                "mod-indexer-pipeline-{tag}-{}-{nanos}",
                std::process::id()
            ));
            std::fs::create_dir_all(&root).unwrap();
            let store = Arc::new(LmdbStore::open(root.join("db.lmdb")).unwrap());
            Self { root, store }
        }

        fn platform_dir(&self) -> PathBuf {
            self.root.join("platform")
        }

        fn publish(&self, project: u64, file: u64, bytes: &[u8]) {
            self.publish_for("1.20.1", project, file, bytes);
        }

        fn publish_for(&self, game_version: &str, project: u64, file: u64, bytes: &[u8]) {
            let path = self
                .platform_dir()
                .join(game_version)
                .join(project.to_string())
                .join(format!("{file}.jar"));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, bytes).unwrap();
        }

        fn indexer(&self, cleanup: CleanupMode, max_pages: usize) -> Indexer {
            let limiter = Arc::new(ConcurrencyLimiter::new(4).unwrap());
            self.indexer_sharing(limiter, cleanup, max_pages)
        }

        fn indexer_sharing(
            &self,
            limiter: Arc<ConcurrencyLimiter>,
            cleanup: CleanupMode,
            max_pages: usize,
        ) -> Indexer {
            let mut config = IndexerConfig::new(self.root.join("cache"), "1.20.1");
            config.download_threads = 2;
            config.cleanup = cleanup;
            config.max_pages = max_pages;
            Indexer::new(
                self.store.clone(),
                limiter,
                Arc::new(IdentityCache::new()),
                config,
            )
            .unwrap()
        }

        fn platform(&self, page_size: usize) -> LocalPlatform {
            LocalPlatform::new("local", self.platform_dir()).with_page_size(page_size)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn widget_class() -> Vec<u8> {
        let mut cf = ClassFile::new("com/example/Widget", "net/minecraft/world/item/Item");
        cf.method(
            access::PUBLIC,
            "tick",
            "()V",
            vec![
                Insn::InvokeStatic("net/minecraft/Util", "log", "()V"),
                Insn::InvokeStatic("net/minecraft/Util", "log", "()V"),
                Insn::Return,
            ],
        );
        cf.to_bytes()
    }

    fn mod_jar(mod_id: &str, class: &[u8]) -> Vec<u8> {
        let toml = format!("[[mods]]\nmodId = \"{mod_id}\"\nversion = \"1.0\"\n");
        jar(&[
            (NEOFORGE_METADATA, toml.as_bytes()),
            ("com/example/Widget.class", class),
        ])
    }

    fn jar_of(mod_id: &str, class_name: &str, class: &[u8]) -> Vec<u8> {
        let toml = format!("[[mods]]\nmodId = \"{mod_id}\"\nversion = \"1.0\"\n");
        let path = format!("{class_name}.class");
        jar(&[(NEOFORGE_METADATA, toml.as_bytes()), (path.as_str(), class)])
    }

    /// Panics on one class name.
    struct Explode(&'static str);

    impl SanitizationRule for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn apply(&self, class: &mut ClassRecord, _siblings: &Siblings<'_>) -> Verdict {
            assert_ne!(class.name, self.0, "sanitizer hit {}", self.0);
            Verdict::Keep
        }
    }

    fn mod_of(store: &LmdbStore, project: u64) -> ModId {
        store.find_by_platform("local", project).unwrap().unwrap()
    }

    fn util_log_count(store: &LmdbStore, id: ModId) -> u64 {
        store
            .references(id)
            .unwrap()
            .into_iter()
            .find(|r| r.owner == "net/minecraft/Util" && r.kind == RefKind::Method)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    #[test]
    fn reindexing_the_same_files_is_idempotent() {
        let fx = Fixture::new("idempotent");
        fx.publish(1, 10, &mod_jar("widgets", &widget_class()));

        let progress = LogProgress::new();
        let first = fx.indexer(CleanupMode::Full, 5).run(&fx.platform(10), &progress).unwrap();
        assert_eq!(first.indexed, 1);
        let id = mod_of(&fx.store, 1);
        let refs = fx.store.references(id).unwrap();
        assert_eq!(util_log_count(&fx.store, id), 2);

        let second = fx.indexer(CleanupMode::Full, 5).run(&fx.platform(10), &progress).unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.linked, 1);
        assert_eq!(fx.store.references(id).unwrap(), refs);
        assert_eq!(second.purged, 0);
    }

    #[test]
    fn equal_content_under_two_listings_commits_once() {
        let fx = Fixture::new("merge");
        let bytes = mod_jar("widgets", &widget_class());
        fx.publish(1, 10, &bytes);
        fx.publish(2, 20, &bytes);

        let progress = LogProgress::new();
        let report = fx.indexer(CleanupMode::Incremental, 5).run(&fx.platform(10), &progress).unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.linked, 1);
        assert_eq!(mod_of(&fx.store, 1), mod_of(&fx.store, 2));
        assert_eq!(fx.store.stats().unwrap().mods, 1);
        assert_eq!(progress.snapshot().stored, 1);
    }

    #[test]
    fn a_broken_artifact_does_not_stop_its_siblings() {
        let fx = Fixture::new("isolation");
        fx.publish(1, 10, &mod_jar("widgets", &widget_class()));
        fx.publish(2, 20, &mod_jar("broken", b"\xCA\xFE\xBA\xBE\x00"));

        let progress = LogProgress::new();
        let report = fx.indexer(CleanupMode::Incremental, 5).run(&fx.platform(10), &progress).unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.failed[0].retryable);
        assert!(fx.store.seen_file_owner("local", 20).unwrap().is_none());
        assert_eq!(fx.store.seen_file_owner("local", 10).unwrap(), Some(mod_of(&fx.store, 1)));
        assert_eq!(progress.snapshot().failed, 1);
    }

    #[test]
    fn a_panicking_artifact_fails_alone_and_the_limiter_is_restored() {
        let fx = Fixture::new("panic");
        fx.publish(1, 10, &mod_jar("widgets", &widget_class()));
        let manifest = b"FMLModType: GAMELIBRARY\nImplementation-Title: Liar\n";
        fx.publish(2, 20, &jar_with_oversized_entry(MANIFEST, manifest));
        let bomb = ClassFile::new("com/example/Bomb", "java/lang/Object").to_bytes();
        fx.publish(3, 30, &jar_of("bomb", "com/example/Bomb", &bomb));

        let limiter = Arc::new(ConcurrencyLimiter::new(4).unwrap());
        let indexer = fx
            .indexer_sharing(Arc::clone(&limiter), CleanupMode::Incremental, 5)
            .with_sanitizer(Sanitizer::new(vec![Box::new(Explode("com/example/Bomb"))]));
        let progress = LogProgress::new();
        let report = indexer.run(&fx.platform(10), &progress).unwrap();

        assert_eq!(report.candidates, 3);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].item.contains("local:3/30"));
        assert!(report.failed[0].error.contains("sanitizer hit com/example/Bomb"));
        assert!(!report.failed[0].retryable);
        assert!(fx.store.seen_file_owner("local", 10).unwrap().is_some());
        assert!(fx.store.seen_file_owner("local", 20).unwrap().is_some());
        assert!(fx.store.seen_file_owner("local", 30).unwrap().is_none());
        assert!(limiter.shares().is_empty());
    }

    #[test]
    fn bundled_jar_listed_elsewhere_is_linked_to_its_listing() {
        let fx = Fixture::new("listed-bundle");
        let manifest = b"FMLModType: GAMELIBRARY\nImplementation-Title: Shared lib\n";
        let lib = jar(&[(MANIFEST, manifest.as_slice())]);
        let toml = "[[mods]]\nmodId = \"host\"\nversion = \"1.0\"\n";
        let jarjar = r#"{"jars": [{"identifier": {"group": "org.x", "artifact": "lib"}, "version": {"artifactVersion": "1.0"}, "path": "META-INF/jarjar/lib-1.0.jar"}]}"#;
        let host = jar(&[
            (NEOFORGE_METADATA, toml.as_bytes()),
            (JARJAR_METADATA, jarjar.as_bytes()),
            ("META-INF/jarjar/lib-1.0.jar", lib.as_slice()),
        ]);
        fx.publish(1, 10, &host);
        // Listed for another game version only, so not a candidate itself.
        fx.publish_for("1.19.2", 9, 90, &lib);

        let progress = LogProgress::new();
        let report = fx.indexer(CleanupMode::Incremental, 5).run(&fx.platform(10), &progress).unwrap();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.indexed, 2);
        let lib_id = mod_of(&fx.store, 9);
        assert_eq!(fx.store.find_by_coordinate("org.x:lib").unwrap(), Some(lib_id));
        assert_eq!(fx.store.seen_file_owner("local", 90).unwrap(), Some(lib_id));
    }

    #[test]
    fn seen_files_are_skipped_in_incremental_passes() {
        let fx = Fixture::new("incremental");
        fx.publish(1, 10, &mod_jar("widgets", &widget_class()));
        let progress = LogProgress::new();
        fx.indexer(CleanupMode::Incremental, 5).run(&fx.platform(10), &progress).unwrap();

        let report = fx.indexer(CleanupMode::Incremental, 5).run(&fx.platform(10), &progress).unwrap();
        assert_eq!(report.already_seen, 1);
        assert_eq!(report.candidates, 0);
    }

    #[test]
    fn truncated_search_never_purges() {
        let fx = Fixture::new("truncated");
        fx.publish(1, 10, &mod_jar("a", &widget_class()));
        fx.publish(2, 20, &mod_jar("b", &widget_class()));
        let progress = LogProgress::new();
        fx.indexer(CleanupMode::Full, 5).run(&fx.platform(10), &progress).unwrap();
        assert_eq!(fx.store.mod_ids_with_rows().unwrap().len(), 2);

        let report = fx.indexer(CleanupMode::Full, 1).run(&fx.platform(1), &progress).unwrap();
        assert!(report.truncated);
        assert_eq!(report.purged, 0);
        assert_eq!(fx.store.mod_ids_with_rows().unwrap().len(), 2);

        std::fs::remove_dir_all(fx.platform_dir().join("1.20.1").join("2")).unwrap();
        let report = fx.indexer(CleanupMode::Full, 5).run(&fx.platform(10), &progress).unwrap();
        assert!(!report.truncated);
        assert_eq!(report.purged, 1);
        assert_eq!(fx.store.mod_ids_with_rows().unwrap(), vec![mod_of(&fx.store, 1)]);
    }

    #[test]
    fn waves_hold_back_duplicate_content() {
        let bytes = mod_jar("widgets", &widget_class());
        let artifact = ModArtifact::read(Arc::new(bytes), None, None).unwrap().unwrap();
        let other = ModArtifact::read(Arc::new(mod_jar("other", &widget_class())), None, None)
            .unwrap()
            .unwrap();
        let waves = waves(vec![
            Candidate::from_platform(artifact.clone(), PlatformLink::new("local", 1, 1)),
            Candidate::from_platform(artifact, PlatformLink::new("local", 2, 2)),
            Candidate::from_platform(other, PlatformLink::new("local", 3, 3)),
        ]);
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].len(), 2);
        assert_eq!(waves[1].len(), 1);
        assert_eq!(waves[1][0].link.as_ref().unwrap().project_id, 2);
    }
}
