//! Per-artifact accumulation of references, hierarchy rows, class rows, tags
//! and enum extensions, and their transactional commit.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::artifact::ArtifactSummary;
use crate::enums::EnumExtension;
use crate::error::IndexResult;
use crate::record::{ClassRecord, InheritanceEntry, Reference};
use crate::store::{ClassRow, ModId, ModStore, ReferenceRow, TrackBatch};
use crate::tags::TagFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Never purge; a paged or partial pass cannot tell absence from truncation.
    #[default]
    Incremental,
    /// Purge rows of every mod not seen in this pass.
    Full,
}

#[derive(Debug, Default)]
pub struct ReferenceAggregator {
    references: BTreeMap<Reference, u64>,
    inheritance: IndexMap<String, InheritanceEntry>,
    classes: IndexMap<String, ClassRow>,
    tags: Vec<TagFile>,
    enum_extensions: Vec<EnumExtension>,
}

impl ReferenceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: &ClassRecord) {
        for (reference, count) in &class.references {
            *self.references.entry(reference.clone()).or_insert(0) += u64::from(*count);
        }
        self.inheritance
            .entry(class.name.clone())
            .or_insert_with(|| class.inheritance());
        self.classes
            .entry(class.name.clone())
            .or_insert_with(|| ClassRow::from(class));
    }

    pub fn add_classes<'a>(&mut self, classes: impl IntoIterator<Item = &'a ClassRecord>) {
        for class in classes {
            self.add_class(class);
        }
    }

    pub fn add_tags(&mut self, tags: Vec<TagFile>) {
        self.tags.extend(tags);
    }

    pub fn add_enum_extensions(&mut self, extensions: Vec<EnumExtension>) {
        self.enum_extensions.extend(extensions);
    }

    pub fn reference_rows(&self) -> Vec<ReferenceRow> {
        self.references
            .iter()
            .map(|(r, count)| ReferenceRow {
                owner: r.owner.clone(),
                member: r.member.clone(),
                kind: r.kind,
                count: *count,
            })
            .collect()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Replaces whatever the mod had with exactly this aggregate.
    pub fn into_batch(
        self,
        known_hash: Option<String>,
        metadata: Option<ArtifactSummary>,
        indexed_at: u64,
    ) -> TrackBatch {
        let references = self.reference_rows();
        TrackBatch {
            delete_current: true,
            classes: self.classes.into_values().collect(),
            references,
            inheritance: self.inheritance.into_values().collect(),
            tags: self.tags,
            enum_extensions: self.enum_extensions,
            known_hash,
            metadata,
            indexed_at,
        }
    }

    pub fn commit(
        self,
        store: &dyn ModStore,
        mod_id: ModId,
        known_hash: Option<String>,
        metadata: Option<ArtifactSummary>,
        indexed_at: u64,
    ) -> IndexResult<()> {
        let batch = self.into_batch(known_hash, metadata, indexed_at);
        store.track(mod_id, &batch)?;
        debug!(
            mod_id,
            classes = batch.classes.len(),
            references = batch.references.len(),
            tags = batch.tags.len(),
            enum_extensions = batch.enum_extensions.len(),
            "committed"
        );
        Ok(())
    }
}

/// Purges rows of mods absent from `present`. Only a full, untruncated pass
/// purges; returns the number of mods purged.
pub fn cleanup(
    store: &dyn ModStore,
    present: &HashSet<ModId>,
    mode: CleanupMode,
    truncated: bool,
) -> IndexResult<u64> {
    if mode != CleanupMode::Full || truncated {
        return Ok(0);
    }
    let mut purged = 0;
    for id in store.mod_ids_with_rows()? {
        if !present.contains(&id) {
            store.purge_rows(id)?;
            purged += 1;
        }
    }
    if purged > 0 {
        info!(purged, "purged rows of mods absent from this pass");
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lmdb::LmdbStore;
    use crate::record::RefKind;
    use crate::store::NewMod;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "mod-indexer-aggregate-{tag}-{}-{nanos}.lmdb",
            std::process::id()
        ))
    }

    fn remove_db(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let mut lock = path.as_os_str().to_os_string();
        lock.push("-lock");
        let _ = std::fs::remove_file(PathBuf::from(lock));
    }

    fn class(name: &str, refs: &[(&str, &str, u32)]) -> ClassRecord {
        let mut c = ClassRecord::new(name);
        c.super_class = Some("net/minecraft/world/item/Item".into());
        for (owner, member, n) in refs {
            for _ in 0..*n {
                c.add_reference(Reference::new(*owner, *member, RefKind::Method));
            }
        }
        c
    }

    fn new_mod(name: &str) -> NewMod {
        NewMod {
            display_name: name.into(),
            version: "1.0".into(),
            coordinate: None,
            mod_ids: vec![name.into()],
        }
    }

    #[test]
    fn references_are_summed_and_classes_deduplicated() {
        let mut agg = ReferenceAggregator::new();
        agg.add_class(&class("a/A", &[("x/Y", "run()V", 2)]));
        agg.add_class(&class("a/B", &[("x/Y", "run()V", 1), ("x/Z", "go()V", 1)]));
        agg.add_class(&class("a/A", &[]));

        let batch = agg.into_batch(None, None, 1);
        assert!(batch.delete_current);
        assert_eq!(batch.inheritance.len(), 2);
        assert_eq!(batch.classes.len(), 2);
        let run = batch
            .references
            .iter()
            .find(|r| r.owner == "x/Y")
            .unwrap();
        assert_eq!(run.count, 3);
    }

    #[test]
    fn reindexing_identical_classes_is_idempotent() {
        let path = temp_db("idempotent");
        let store = LmdbStore::open(path.clone()).unwrap();
        let m = store.create_mod(&new_mod("a")).unwrap();
        let classes = vec![
            class("a/A", &[("x/Y", "run()V", 2)]),
            class("a/B", &[("x/Z", "go()V", 1)]),
        ];

        for _ in 0..2 {
            let mut agg = ReferenceAggregator::new();
            agg.add_classes(&classes);
            agg.commit(&store, m.id, Some("h".into()), None, 1).unwrap();
        }
        let mut expected = ReferenceAggregator::new();
        expected.add_classes(&classes);
        assert_eq!(store.references(m.id).unwrap(), expected.reference_rows());
        assert_eq!(store.inheritance(m.id).unwrap().len(), 2);
        remove_db(&path);
    }

    #[test]
    fn cleanup_only_purges_in_full_untruncated_passes() {
        let path = temp_db("cleanup");
        let store = LmdbStore::open(path.clone()).unwrap();
        let kept = store.create_mod(&new_mod("kept")).unwrap();
        let gone = store.create_mod(&new_mod("gone")).unwrap();
        for id in [kept.id, gone.id] {
            let mut agg = ReferenceAggregator::new();
            agg.add_class(&class("a/A", &[("x/Y", "run()V", 1)]));
            agg.commit(&store, id, None, None, 1).unwrap();
        }
        let present: HashSet<ModId> = [kept.id].into_iter().collect();

        assert_eq!(cleanup(&store, &present, CleanupMode::Incremental, false).unwrap(), 0);
        assert_eq!(cleanup(&store, &present, CleanupMode::Full, true).unwrap(), 0);
        assert_eq!(store.mod_ids_with_rows().unwrap().len(), 2);

        assert_eq!(cleanup(&store, &present, CleanupMode::Full, false).unwrap(), 1);
        assert_eq!(store.mod_ids_with_rows().unwrap(), vec![kept.id]);
        remove_db(&path);
    }
}
