//! Identity resolution of indexing candidates against the store.
//!
//! Rules apply in order: a known content hash only links, a platform listing
//! finds or creates by `(platform, project)`, a coordinate finds or creates by
//! coordinate, and anything else cannot be indexed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::IndexResult;
use crate::expand::Candidate;
use crate::store::{LookupKey, ModId, ModStore, NewMod};
use crate::version::ArtifactVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Content already stored; only links were updated.
    Known { mod_id: ModId },
    /// Class data must be (re)indexed and committed for `mod_id`.
    Index { mod_id: ModId, created: bool },
    /// A stored copy is at least as new.
    Outdated { mod_id: ModId },
    /// No hash match, no listing, no coordinate.
    Unindexable,
}

/// Process-wide memo of committed content hashes.
#[derive(Debug, Default)]
pub struct IdentityCache {
    by_hash: Mutex<HashMap<String, ModId>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<ModId> {
        self.by_hash.lock().get(hash).copied()
    }

    pub fn remember(&self, hash: impl Into<String>, id: ModId) {
        self.by_hash.lock().insert(hash.into(), id);
    }

    /// Drops every hash pointing at a mod that no longer exists.
    pub fn forget(&self, id: ModId) {
        self.by_hash.lock().retain(|_, v| *v != id);
    }

    pub fn len(&self) -> usize {
        self.by_hash.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Resolver {
    store: Arc<dyn ModStore>,
    cache: Arc<IdentityCache>,
}

impl Resolver {
    pub fn new(store: Arc<dyn ModStore>, cache: Arc<IdentityCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    fn known_hash(&self, hash: &str) -> IndexResult<Option<ModId>> {
        if let Some(id) = self.cache.get(hash) {
            return Ok(Some(id));
        }
        let found = self.store.find_by_hash(hash)?;
        if let Some(id) = found {
            self.cache.remember(hash, id);
        }
        Ok(found)
    }

    fn link_coordinate(&self, id: ModId, coordinate: Option<&str>) -> IndexResult<()> {
        if let Some(coordinate) = coordinate
            && self.store.find_by_coordinate(coordinate)?.is_none()
        {
            self.store.link_coordinate(id, coordinate)?;
        }
        Ok(())
    }

    pub fn resolve(&self, candidate: &Candidate) -> IndexResult<Resolution> {
        let artifact = &candidate.artifact;

        if let Some(id) = self.known_hash(&artifact.content_hash)? {
            match &candidate.link {
                Some(link) => {
                    if let Some(absorbed) = self.store.attach_platform(id, link)? {
                        self.cache.forget(absorbed);
                    }
                    self.store.mark_file_seen(link, id)?;
                }
                None => self.link_coordinate(id, artifact.coordinate.as_deref())?,
            }
            self.link_coordinate(id, candidate.extra_coordinate.as_deref())?;
            debug!(mod_id = id, hash = %artifact.content_hash, "content already indexed");
            return Ok(Resolution::Known { mod_id: id });
        }

        let new = NewMod::from(artifact);
        if let Some(link) = &candidate.link {
            let key = LookupKey::Platform {
                platform: link.platform.clone(),
                project_id: link.project_id,
            };
            let (m, created) = self.store.find_or_create(&key, &new)?;
            self.store.link_platform(m.id, link)?;
            self.link_coordinate(m.id, artifact.coordinate.as_deref())?;
            self.link_coordinate(m.id, candidate.extra_coordinate.as_deref())?;
            return Ok(Resolution::Index {
                mod_id: m.id,
                created,
            });
        }

        if let Some(coordinate) = &artifact.coordinate {
            let key = LookupKey::Coordinate(coordinate.clone());
            let (m, created) = self.store.find_or_create(&key, &new)?;
            if !created
                && m.indexed_at.is_some()
                && ArtifactVersion::parse(m.version.as_str()) >= artifact.version
            {
                debug!(mod_id = m.id, stored = %m.version, candidate = %artifact.version, "stored copy is newer");
                return Ok(Resolution::Outdated { mod_id: m.id });
            }
            return Ok(Resolution::Index {
                mod_id: m.id,
                created,
            });
        }

        Ok(Resolution::Unindexable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{MANIFEST, ModArtifact, NEOFORGE_METADATA};
    use crate::classgen::jar;
    use crate::identity::PlatformLink;
    use crate::lmdb::LmdbStore;
    use crate::store::TrackBatch;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "mod-indexer-resolve-{tag}-{}-{nanos}.lmdb",
            std::process::id()
        ))
    }

    fn remove_db(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let mut lock = path.as_os_str().to_os_string();
        lock.push("-lock");
        let _ = std::fs::remove_file(PathBuf::from(lock));
    }

    fn resolver(tag: &str) -> (Resolver, Arc<LmdbStore>, PathBuf) {
        let path = temp_db(tag);
        let store = Arc::new(LmdbStore::open(path.clone()).unwrap());
        let resolver = Resolver::new(store.clone(), Arc::new(IdentityCache::new()));
        (resolver, store, path)
    }

    fn mod_artifact(mod_id: &str, version: &str) -> ModArtifact {
        let toml = format!("[[mods]]\nmodId = \"{mod_id}\"\nversion = \"{version}\"\n");
        let bytes = jar(&[(NEOFORGE_METADATA, toml.as_bytes())]);
        ModArtifact::read(Arc::new(bytes), None, None).unwrap().unwrap()
    }

    fn library(coordinate: &str, version: &str) -> ModArtifact {
        let manifest = format!("FMLModType: LIBRARY\nImplementation-Version: {version}\n");
        let bytes = jar(&[(MANIFEST, manifest.as_bytes())]);
        ModArtifact::read(Arc::new(bytes), Some(coordinate), None)
            .unwrap()
            .unwrap()
    }

    fn commit(store: &LmdbStore, id: ModId, artifact: &ModArtifact) {
        store
            .track(
                id,
                &TrackBatch {
                    known_hash: Some(artifact.content_hash.clone()),
                    metadata: Some(artifact.summary()),
                    indexed_at: 1,
                    ..TrackBatch::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn equal_content_on_two_listings_ends_on_one_mod() {
        let (resolver, store, path) = resolver("merge");
        let artifact = mod_artifact("jei", "1.0");
        let first = Candidate::from_platform(artifact.clone(), PlatformLink::new("curseforge", 1, 10));
        let second = Candidate::from_platform(artifact.clone(), PlatformLink::new("modrinth", 9, 90));

        let Resolution::Index { mod_id, created } = resolver.resolve(&first).unwrap() else {
            panic!("first candidate must be indexed");
        };
        assert!(created);
        commit(&store, mod_id, &artifact);

        assert_eq!(resolver.resolve(&second).unwrap(), Resolution::Known { mod_id });
        assert_eq!(store.find_by_platform("modrinth", 9).unwrap(), Some(mod_id));
        assert_eq!(store.seen_file_owner("modrinth", 90).unwrap(), Some(mod_id));
        remove_db(&path);
    }

    #[test]
    fn known_hash_moves_a_listing_off_a_wrong_mod() {
        let (resolver, store, path) = resolver("conflict");
        let artifact = mod_artifact("jei", "1.0");
        let owner = store.create_mod(&NewMod::from(&artifact)).unwrap();
        commit(&store, owner.id, &artifact);

        let wrong = mod_artifact("jei", "0.9");
        let (stale, _) = store
            .find_or_create(
                &LookupKey::Platform {
                    platform: "curseforge".into(),
                    project_id: 5,
                },
                &NewMod::from(&wrong),
            )
            .unwrap();
        resolver.cache().remember("stale-hash", stale.id);

        let candidate = Candidate::from_platform(artifact, PlatformLink::new("curseforge", 5, 50));
        assert_eq!(
            resolver.resolve(&candidate).unwrap(),
            Resolution::Known { mod_id: owner.id }
        );
        assert_eq!(store.get_mod(stale.id).unwrap(), None);
        assert_eq!(resolver.cache().get("stale-hash"), None);
        remove_db(&path);
    }

    #[test]
    fn coordinates_skip_older_or_equal_versions() {
        let (resolver, store, path) = resolver("coordinate");
        let current = library("org.x:lib", "2.0");
        let Resolution::Index { mod_id, .. } = resolver.resolve(&Candidate::bundled(current.clone())).unwrap() else {
            panic!("library must be indexed");
        };
        commit(&store, mod_id, &current);

        let older = library("org.x:lib", "1.5");
        assert_eq!(
            resolver.resolve(&Candidate::bundled(older)).unwrap(),
            Resolution::Outdated { mod_id }
        );
        let newer = library("org.x:lib", "2.1");
        assert_eq!(
            resolver.resolve(&Candidate::bundled(newer)).unwrap(),
            Resolution::Index {
                mod_id,
                created: false
            }
        );
        remove_db(&path);
    }

    #[test]
    fn nothing_to_key_on_is_unindexable() {
        let (resolver, _store, path) = resolver("unindexable");
        let candidate = Candidate::bundled(mod_artifact("loose", "1.0"));
        assert_eq!(resolver.resolve(&candidate).unwrap(), Resolution::Unindexable);
        remove_db(&path);
    }
}
