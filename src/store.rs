//! Storage contract for indexed mods.
//!
//! Every method is one transaction. [`ModStore::track`] in particular applies
//! a whole [`TrackBatch`] atomically: either all of an artifact's rows are
//! replaced or none are.

use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::artifact::{ArtifactSummary, ModArtifact};
use crate::enums::EnumExtension;
use crate::error::IndexResult;
use crate::identity::PlatformLink;
use crate::record::{ClassRecord, FieldInfo, InheritanceEntry, MethodInfo, RefKind};
use crate::tags::TagFile;

pub type ModId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedMod {
    pub id: ModId,
    pub display_name: String,
    pub version: String,
    pub coordinate: Option<String>,
    pub mod_ids: Vec<String>,
    /// Every marketplace listing known to carry this mod, latest file id each.
    pub platforms: Vec<PlatformLink>,
    pub hashes: Vec<String>,
    pub metadata: Option<ArtifactSummary>,
    pub indexed_at: Option<u64>,
}

impl IndexedMod {
    pub fn new(id: ModId, new: &NewMod) -> Self {
        Self {
            id,
            display_name: new.display_name.clone(),
            version: new.version.clone(),
            coordinate: new.coordinate.clone(),
            mod_ids: new.mod_ids.clone(),
            platforms: Vec::new(),
            hashes: Vec::new(),
            metadata: None,
            indexed_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMod {
    pub display_name: String,
    pub version: String,
    pub coordinate: Option<String>,
    pub mod_ids: Vec<String>,
}

impl From<&ModArtifact> for NewMod {
    fn from(artifact: &ModArtifact) -> Self {
        Self {
            display_name: artifact.display_name.clone(),
            version: artifact.version.to_string(),
            coordinate: artifact.coordinate.clone(),
            mod_ids: artifact.mod_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    Platform { platform: String, project_id: u64 },
    Coordinate(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub owner: String,
    pub member: String,
    pub kind: RefKind,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRow {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub annotations: Vec<String>,
}

impl From<&FieldInfo> for MemberRow {
    fn from(f: &FieldInfo) -> Self {
        Self {
            name: f.name.clone(),
            descriptor: f.descriptor.clone(),
            access: f.access,
            annotations: f.annotations.iter().map(Annotation::to_string).collect(),
        }
    }
}

impl From<&MethodInfo> for MemberRow {
    fn from(m: &MethodInfo) -> Self {
        Self {
            name: m.name.clone(),
            descriptor: m.descriptor.clone(),
            access: m.access,
            annotations: m.annotations.iter().map(Annotation::to_string).collect(),
        }
    }
}

/// Persisted shape of one class, annotations in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRow {
    pub name: String,
    pub access: u16,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<String>,
    pub fields: Vec<MemberRow>,
    pub methods: Vec<MemberRow>,
}

impl From<&ClassRecord> for ClassRow {
    fn from(c: &ClassRecord) -> Self {
        Self {
            name: c.name.clone(),
            access: c.access,
            super_class: c.super_class.clone(),
            interfaces: c.interfaces.clone(),
            annotations: c.annotations.iter().map(Annotation::to_string).collect(),
            fields: c.fields.values().map(MemberRow::from).collect(),
            methods: c.methods.values().map(MemberRow::from).collect(),
        }
    }
}

/// Everything one indexing run writes for one mod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackBatch {
    /// Remove previously stored rows of every per-mod table before inserting.
    pub delete_current: bool,
    pub classes: Vec<ClassRow>,
    pub references: Vec<ReferenceRow>,
    pub inheritance: Vec<InheritanceEntry>,
    pub tags: Vec<TagFile>,
    pub enum_extensions: Vec<EnumExtension>,
    pub known_hash: Option<String>,
    pub metadata: Option<ArtifactSummary>,
    pub indexed_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub db_path: String,
    pub mods: u64,
    pub known_hashes: u64,
    pub platform_links: u64,
    pub coordinates: u64,
    pub seen_files: u64,
    pub reference_rows: u64,
    pub inheritance_rows: u64,
    pub class_rows: u64,
    pub tag_rows: u64,
    pub enum_extension_rows: u64,
}

pub trait ModStore: Send + Sync {
    fn find_by_hash(&self, hash: &str) -> IndexResult<Option<ModId>>;

    fn find_by_platform(&self, platform: &str, project_id: u64) -> IndexResult<Option<ModId>>;

    fn find_by_coordinate(&self, coordinate: &str) -> IndexResult<Option<ModId>>;

    fn get_mod(&self, id: ModId) -> IndexResult<Option<IndexedMod>>;

    fn create_mod(&self, new: &NewMod) -> IndexResult<IndexedMod>;

    /// Looks `key` up and creates the mod under it when absent, in one
    /// transaction. The flag reports whether a mod was created.
    fn find_or_create(&self, key: &LookupKey, new: &NewMod) -> IndexResult<(IndexedMod, bool)>;

    fn link_platform(&self, id: ModId, link: &PlatformLink) -> IndexResult<()>;

    fn link_coordinate(&self, id: ModId, coordinate: &str) -> IndexResult<()>;

    /// Links `link` to `id`. A different mod previously holding the same
    /// listing has its hashes and links transferred to `id` and is deleted;
    /// its id is returned.
    fn attach_platform(&self, id: ModId, link: &PlatformLink) -> IndexResult<Option<ModId>>;

    fn delete_mod(&self, id: ModId) -> IndexResult<()>;

    fn mark_file_seen(&self, link: &PlatformLink, id: ModId) -> IndexResult<()>;

    fn seen_file_owner(&self, platform: &str, file_id: u64) -> IndexResult<Option<ModId>>;

    fn track(&self, id: ModId, batch: &TrackBatch) -> IndexResult<()>;

    /// Mods that currently own any row in a per-mod table.
    fn mod_ids_with_rows(&self) -> IndexResult<Vec<ModId>>;

    fn purge_rows(&self, id: ModId) -> IndexResult<()>;

    fn references(&self, id: ModId) -> IndexResult<Vec<ReferenceRow>>;

    fn inheritance(&self, id: ModId) -> IndexResult<Vec<InheritanceEntry>>;

    fn classes(&self, id: ModId) -> IndexResult<Vec<ClassRow>>;

    fn tags(&self, id: ModId) -> IndexResult<Vec<TagFile>>;

    fn enum_extensions(&self, id: ModId) -> IndexResult<Vec<EnumExtension>>;

    fn stats(&self) -> IndexResult<StoreStats>;
}
