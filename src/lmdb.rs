//! LMDB-backed [`ModStore`].
//!
//! Uses heed with one named database per table and JSON values. Row tables
//! are keyed `<mod id>/<sequence>` so a mod's rows form one contiguous prefix
//! that can be read or replaced inside a single write transaction.

use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::enums::EnumExtension;
use crate::error::{IndexError, IndexResult};
use crate::identity::PlatformLink;
use crate::record::InheritanceEntry;
use crate::store::{
    ClassRow, IndexedMod, LookupKey, ModId, ModStore, NewMod, ReferenceRow, StoreStats, TrackBatch,
};
use crate::tags::TagFile;

pub const MODS_DB: &str = "mods";
pub const MOD_HASHES_DB: &str = "mod_hashes";
pub const MOD_PLATFORMS_DB: &str = "mod_platforms";
pub const MOD_COORDINATES_DB: &str = "mod_coordinates";
pub const KNOWN_FILES_DB: &str = "known_files";
pub const FILES_BY_MOD_DB: &str = "mod_files";
pub const REFERENCES_DB: &str = "mod_references";
pub const INHERITANCE_DB: &str = "mod_inheritance";
pub const CLASSES_DB: &str = "mod_classes";
pub const TAGS_DB: &str = "mod_tags";
pub const ENUM_EXTENSIONS_DB: &str = "mod_enum_extensions";
pub const META_DB: &str = "meta";

const NEXT_MOD_ID: &str = "next_mod_id";

const DEFAULT_MAP_SIZE: usize = 4 * 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 32;

type StrDb = Database<Str, Str>;

#[derive(Debug)]
pub struct LmdbStore {
    env: Arc<Env>,
    db_path: PathBuf,
    mods: StrDb,
    hashes: StrDb,
    platforms: StrDb,
    coordinates: StrDb,
    known_files: StrDb,
    /// `<mod id>/<platform>/<file id>` for every `known_files` entry.
    files_by_mod: StrDb,
    references: StrDb,
    inheritance: StrDb,
    classes: StrDb,
    tags: StrDb,
    enum_extensions: StrDb,
    meta: StrDb,
}

fn mod_key(id: ModId) -> String {
    format!("{id:020}")
}

fn row_prefix(id: ModId) -> String {
    format!("{id:020}/")
}

fn row_key(id: ModId, seq: usize) -> String {
    format!("{id:020}/{seq:010}")
}

fn platform_key(platform: &str, project_id: u64) -> String {
    format!("{platform}/{project_id}")
}

fn file_key(platform: &str, file_id: u64) -> String {
    format!("{platform}/{file_id}")
}

fn owned_file_key(id: ModId, file_key: &str) -> String {
    format!("{id:020}/{file_key}")
}

fn parse_id(value: &str) -> IndexResult<ModId> {
    value
        .parse()
        .map_err(|_| IndexError::Storage(format!("corrupt mod id: {value:?}")))
}

impl LmdbStore {
    pub fn open(db_path: PathBuf) -> IndexResult<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let env = Arc::new(open_env(&db_path)?);

        let mut wtxn = env.write_txn()?;
        let mods = env.create_database::<Str, Str>(&mut wtxn, Some(MODS_DB))?;
        let hashes = env.create_database::<Str, Str>(&mut wtxn, Some(MOD_HASHES_DB))?;
        let platforms = env.create_database::<Str, Str>(&mut wtxn, Some(MOD_PLATFORMS_DB))?;
        let coordinates = env.create_database::<Str, Str>(&mut wtxn, Some(MOD_COORDINATES_DB))?;
        let known_files = env.create_database::<Str, Str>(&mut wtxn, Some(KNOWN_FILES_DB))?;
        let files_by_mod = env.create_database::<Str, Str>(&mut wtxn, Some(FILES_BY_MOD_DB))?;
        let references = env.create_database::<Str, Str>(&mut wtxn, Some(REFERENCES_DB))?;
        let inheritance = env.create_database::<Str, Str>(&mut wtxn, Some(INHERITANCE_DB))?;
        let classes = env.create_database::<Str, Str>(&mut wtxn, Some(CLASSES_DB))?;
        let tags = env.create_database::<Str, Str>(&mut wtxn, Some(TAGS_DB))?;
        let enum_extensions = env.create_database::<Str, Str>(&mut wtxn, Some(ENUM_EXTENSIONS_DB))?;
        let meta = env.create_database::<Str, Str>(&mut wtxn, Some(META_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            mods,
            hashes,
            platforms,
            coordinates,
            known_files,
            files_by_mod,
            references,
            inheritance,
            classes,
            tags,
            enum_extensions,
            meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn row_tables(&self) -> [&StrDb; 5] {
        [
            &self.references,
            &self.inheritance,
            &self.classes,
            &self.tags,
            &self.enum_extensions,
        ]
    }

    fn read_mod(&self, txn: &RoTxn<'_>, id: ModId) -> IndexResult<Option<IndexedMod>> {
        match self.mods.get(txn, &mod_key(id))? {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn require_mod(&self, txn: &RoTxn<'_>, id: ModId) -> IndexResult<IndexedMod> {
        self.read_mod(txn, id)?
            .ok_or_else(|| IndexError::Storage(format!("unknown mod {id}")))
    }

    fn write_mod(&self, wtxn: &mut RwTxn<'_>, m: &IndexedMod) -> IndexResult<()> {
        let json = serde_json::to_string(m)?;
        self.mods.put(wtxn, &mod_key(m.id), &json)?;
        Ok(())
    }

    fn lookup(&self, txn: &RoTxn<'_>, key: &LookupKey) -> IndexResult<Option<ModId>> {
        let found = match key {
            LookupKey::Platform {
                platform,
                project_id,
            } => self.platforms.get(txn, &platform_key(platform, *project_id))?,
            LookupKey::Coordinate(coordinate) => self.coordinates.get(txn, coordinate)?,
        };
        found.map(parse_id).transpose()
    }

    fn insert_mod(&self, wtxn: &mut RwTxn<'_>, new: &NewMod) -> IndexResult<IndexedMod> {
        let id = match self.meta.get(wtxn, NEXT_MOD_ID)? {
            Some(v) => parse_id(v)?,
            None => 1,
        };
        self.meta.put(wtxn, NEXT_MOD_ID, &(id + 1).to_string())?;

        let created = IndexedMod::new(id, new);
        if let Some(coordinate) = &created.coordinate
            && self.coordinates.get(wtxn, coordinate)?.is_none()
        {
            self.coordinates.put(wtxn, coordinate, &id.to_string())?;
        }
        self.write_mod(wtxn, &created)?;
        Ok(created)
    }

    fn set_platform(
        &self,
        wtxn: &mut RwTxn<'_>,
        m: &mut IndexedMod,
        link: &PlatformLink,
    ) -> IndexResult<()> {
        match m.platforms.iter_mut().find(|l| l.same_project(link)) {
            Some(existing) => existing.file_id = link.file_id,
            None => m.platforms.push(link.clone()),
        }
        self.platforms.put(
            wtxn,
            &platform_key(&link.platform, link.project_id),
            &m.id.to_string(),
        )?;
        Ok(())
    }

    fn set_coordinate(
        &self,
        wtxn: &mut RwTxn<'_>,
        m: &mut IndexedMod,
        coordinate: &str,
    ) -> IndexResult<()> {
        if m.coordinate.is_none() {
            m.coordinate = Some(coordinate.to_string());
        }
        self.coordinates.put(wtxn, coordinate, &m.id.to_string())?;
        Ok(())
    }

    fn delete_prefix(&self, db: &StrDb, wtxn: &mut RwTxn<'_>, prefix: &str) -> IndexResult<u64> {
        let mut keys = Vec::new();
        for item in db.prefix_iter(wtxn, prefix)? {
            let (k, _) = item?;
            keys.push(k.to_string());
        }
        for key in &keys {
            db.delete(wtxn, key)?;
        }
        Ok(keys.len() as u64)
    }

    fn purge_rows_in(&self, wtxn: &mut RwTxn<'_>, id: ModId) -> IndexResult<u64> {
        let prefix = row_prefix(id);
        let mut removed = 0;
        for db in self.row_tables() {
            removed += self.delete_prefix(db, wtxn, &prefix)?;
        }
        Ok(removed)
    }

    fn put_rows<T: Serialize>(
        &self,
        db: &StrDb,
        wtxn: &mut RwTxn<'_>,
        id: ModId,
        rows: &[T],
    ) -> IndexResult<()> {
        let start = self.next_seq(db, wtxn, id)?;
        for (i, row) in rows.iter().enumerate() {
            let json = serde_json::to_string(row)?;
            db.put(wtxn, &row_key(id, start + i), &json)?;
        }
        Ok(())
    }

    fn next_seq(&self, db: &StrDb, txn: &RoTxn<'_>, id: ModId) -> IndexResult<usize> {
        let mut count = 0;
        for item in db.prefix_iter(txn, &row_prefix(id))? {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }

    fn read_rows<T: DeserializeOwned>(&self, db: &StrDb, id: ModId) -> IndexResult<Vec<T>> {
        let rtxn = self.env.read_txn()?;
        let mut rows = Vec::new();
        for item in db.prefix_iter(&rtxn, &row_prefix(id))? {
            let (_, v) = item?;
            rows.push(serde_json::from_str(v)?);
        }
        Ok(rows)
    }

    fn put_file_owner(&self, wtxn: &mut RwTxn<'_>, key: &str, id: ModId) -> IndexResult<()> {
        if let Some(previous) = self.known_files.get(wtxn, key)?.map(parse_id).transpose()?
            && previous != id
        {
            self.files_by_mod.delete(wtxn, &owned_file_key(previous, key))?;
        }
        self.known_files.put(wtxn, key, &id.to_string())?;
        self.files_by_mod.put(wtxn, &owned_file_key(id, key), "")?;
        Ok(())
    }

    /// Re-points every seen file owned by `from` at `to`, or forgets them
    /// when `to` is `None`.
    fn reassign_files(
        &self,
        wtxn: &mut RwTxn<'_>,
        from: ModId,
        to: Option<ModId>,
    ) -> IndexResult<()> {
        let prefix = row_prefix(from);
        let mut keys = Vec::new();
        for item in self.files_by_mod.prefix_iter(wtxn, &prefix)? {
            let (k, _) = item?;
            if let Some(file) = k.strip_prefix(prefix.as_str()) {
                keys.push(file.to_string());
            }
        }
        for key in &keys {
            match to {
                Some(to) => self.put_file_owner(wtxn, key, to)?,
                None => {
                    self.known_files.delete(wtxn, key)?;
                    self.files_by_mod.delete(wtxn, &owned_file_key(from, key))?;
                }
            }
        }
        Ok(())
    }

    fn delete_mod_in(&self, wtxn: &mut RwTxn<'_>, id: ModId) -> IndexResult<()> {
        let Some(m) = self.read_mod(wtxn, id)? else {
            return Ok(());
        };
        let owner = id.to_string();
        for hash in &m.hashes {
            if self.hashes.get(wtxn, hash)? == Some(owner.as_str()) {
                self.hashes.delete(wtxn, hash)?;
            }
        }
        for link in &m.platforms {
            let key = platform_key(&link.platform, link.project_id);
            if self.platforms.get(wtxn, &key)? == Some(owner.as_str()) {
                self.platforms.delete(wtxn, &key)?;
            }
        }
        if let Some(coordinate) = &m.coordinate
            && self.coordinates.get(wtxn, coordinate)? == Some(owner.as_str())
        {
            self.coordinates.delete(wtxn, coordinate)?;
        }
        self.reassign_files(wtxn, id, None)?;
        self.purge_rows_in(wtxn, id)?;
        self.mods.delete(wtxn, &mod_key(id))?;
        Ok(())
    }
}

impl ModStore for LmdbStore {
    fn find_by_hash(&self, hash: &str) -> IndexResult<Option<ModId>> {
        let rtxn = self.env.read_txn()?;
        self.hashes.get(&rtxn, hash)?.map(parse_id).transpose()
    }

    fn find_by_platform(&self, platform: &str, project_id: u64) -> IndexResult<Option<ModId>> {
        let rtxn = self.env.read_txn()?;
        self.lookup(
            &rtxn,
            &LookupKey::Platform {
                platform: platform.to_string(),
                project_id,
            },
        )
    }

    fn find_by_coordinate(&self, coordinate: &str) -> IndexResult<Option<ModId>> {
        let rtxn = self.env.read_txn()?;
        self.coordinates.get(&rtxn, coordinate)?.map(parse_id).transpose()
    }

    fn get_mod(&self, id: ModId) -> IndexResult<Option<IndexedMod>> {
        let rtxn = self.env.read_txn()?;
        self.read_mod(&rtxn, id)
    }

    fn create_mod(&self, new: &NewMod) -> IndexResult<IndexedMod> {
        let mut wtxn = self.env.write_txn()?;
        let created = self.insert_mod(&mut wtxn, new)?;
        wtxn.commit()?;
        debug!(mod_id = created.id, name = %created.display_name, "created mod");
        Ok(created)
    }

    fn find_or_create(&self, key: &LookupKey, new: &NewMod) -> IndexResult<(IndexedMod, bool)> {
        let mut wtxn = self.env.write_txn()?;
        if let Some(id) = self.lookup(&wtxn, key)? {
            let existing = self.require_mod(&wtxn, id)?;
            return Ok((existing, false));
        }

        let mut created = self.insert_mod(&mut wtxn, new)?;
        match key {
            LookupKey::Platform {
                platform,
                project_id,
            } => {
                let link = PlatformLink::new(platform.clone(), *project_id, 0);
                self.set_platform(&mut wtxn, &mut created, &link)?;
            }
            LookupKey::Coordinate(coordinate) => {
                self.set_coordinate(&mut wtxn, &mut created, coordinate)?;
            }
        }
        self.write_mod(&mut wtxn, &created)?;
        wtxn.commit()?;
        debug!(mod_id = created.id, name = %created.display_name, "created mod");
        Ok((created, true))
    }

    fn link_platform(&self, id: ModId, link: &PlatformLink) -> IndexResult<()> {
        let mut wtxn = self.env.write_txn()?;
        let mut m = self.require_mod(&wtxn, id)?;
        self.set_platform(&mut wtxn, &mut m, link)?;
        self.write_mod(&mut wtxn, &m)?;
        wtxn.commit()?;
        Ok(())
    }

    fn link_coordinate(&self, id: ModId, coordinate: &str) -> IndexResult<()> {
        let mut wtxn = self.env.write_txn()?;
        let mut m = self.require_mod(&wtxn, id)?;
        self.set_coordinate(&mut wtxn, &mut m, coordinate)?;
        self.write_mod(&mut wtxn, &m)?;
        wtxn.commit()?;
        Ok(())
    }

    fn attach_platform(&self, id: ModId, link: &PlatformLink) -> IndexResult<Option<ModId>> {
        let mut wtxn = self.env.write_txn()?;
        let mut target = self.require_mod(&wtxn, id)?;
        let key = platform_key(&link.platform, link.project_id);
        let holder = self.platforms.get(&wtxn, &key)?.map(parse_id).transpose()?;

        let absorbed = match holder {
            Some(previous) if previous != id => {
                if let Some(old) = self.read_mod(&wtxn, previous)? {
                    for hash in &old.hashes {
                        self.hashes.put(&mut wtxn, hash, &id.to_string())?;
                        if !target.hashes.contains(hash) {
                            target.hashes.push(hash.clone());
                        }
                    }
                    for moved in &old.platforms {
                        if !target.platforms.iter().any(|l| l.same_project(moved)) {
                            self.set_platform(&mut wtxn, &mut target, moved)?;
                        }
                    }
                    if let Some(coordinate) = &old.coordinate {
                        self.set_coordinate(&mut wtxn, &mut target, coordinate)?;
                    }
                    self.reassign_files(&mut wtxn, previous, Some(id))?;
                    self.delete_mod_in(&mut wtxn, previous)?;
                }
                Some(previous)
            }
            _ => None,
        };

        self.set_platform(&mut wtxn, &mut target, link)?;
        self.write_mod(&mut wtxn, &target)?;
        wtxn.commit()?;
        if let Some(previous) = absorbed {
            info!(
                mod_id = id,
                absorbed = previous,
                platform = %link,
                "moved platform listing to the mod owning the content"
            );
        }
        Ok(absorbed)
    }

    fn delete_mod(&self, id: ModId) -> IndexResult<()> {
        let mut wtxn = self.env.write_txn()?;
        self.delete_mod_in(&mut wtxn, id)?;
        wtxn.commit()?;
        Ok(())
    }

    fn mark_file_seen(&self, link: &PlatformLink, id: ModId) -> IndexResult<()> {
        let mut wtxn = self.env.write_txn()?;
        self.put_file_owner(&mut wtxn, &file_key(&link.platform, link.file_id), id)?;
        wtxn.commit()?;
        Ok(())
    }

    fn seen_file_owner(&self, platform: &str, file_id: u64) -> IndexResult<Option<ModId>> {
        let rtxn = self.env.read_txn()?;
        self.known_files
            .get(&rtxn, &file_key(platform, file_id))?
            .map(parse_id)
            .transpose()
    }

    fn track(&self, id: ModId, batch: &TrackBatch) -> IndexResult<()> {
        let mut wtxn = self.env.write_txn()?;
        let mut m = self.require_mod(&wtxn, id)?;

        if batch.delete_current {
            self.purge_rows_in(&mut wtxn, id)?;
        }
        self.put_rows(&self.classes, &mut wtxn, id, &batch.classes)?;
        self.put_rows(&self.references, &mut wtxn, id, &batch.references)?;
        self.put_rows(&self.inheritance, &mut wtxn, id, &batch.inheritance)?;
        self.put_rows(&self.tags, &mut wtxn, id, &batch.tags)?;
        self.put_rows(&self.enum_extensions, &mut wtxn, id, &batch.enum_extensions)?;

        if let Some(hash) = &batch.known_hash {
            self.hashes.put(&mut wtxn, hash, &id.to_string())?;
            if !m.hashes.contains(hash) {
                m.hashes.push(hash.clone());
            }
        }
        if let Some(summary) = &batch.metadata {
            m.display_name = summary.display_name.clone();
            m.version = summary.version.clone();
            for mod_id in &summary.mod_ids {
                if !m.mod_ids.contains(mod_id) {
                    m.mod_ids.push(mod_id.clone());
                }
            }
            m.metadata = Some(summary.clone());
        }
        m.indexed_at = Some(batch.indexed_at);
        self.write_mod(&mut wtxn, &m)?;
        wtxn.commit()?;
        Ok(())
    }

    fn mod_ids_with_rows(&self) -> IndexResult<Vec<ModId>> {
        let rtxn = self.env.read_txn()?;
        let mut ids = BTreeSet::new();
        for db in self.row_tables() {
            for item in db.iter(&rtxn)? {
                let (k, _) = item?;
                if let Some((id, _)) = k.split_once('/') {
                    ids.insert(parse_id(id)?);
                }
            }
        }
        Ok(ids.into_iter().collect())
    }

    fn purge_rows(&self, id: ModId) -> IndexResult<()> {
        let mut wtxn = self.env.write_txn()?;
        let removed = self.purge_rows_in(&mut wtxn, id)?;
        wtxn.commit()?;
        debug!(mod_id = id, removed, "purged rows");
        Ok(())
    }

    fn references(&self, id: ModId) -> IndexResult<Vec<ReferenceRow>> {
        self.read_rows(&self.references, id)
    }

    fn inheritance(&self, id: ModId) -> IndexResult<Vec<InheritanceEntry>> {
        self.read_rows(&self.inheritance, id)
    }

    fn classes(&self, id: ModId) -> IndexResult<Vec<ClassRow>> {
        self.read_rows(&self.classes, id)
    }

    fn tags(&self, id: ModId) -> IndexResult<Vec<TagFile>> {
        self.read_rows(&self.tags, id)
    }

    fn enum_extensions(&self, id: ModId) -> IndexResult<Vec<EnumExtension>> {
        self.read_rows(&self.enum_extensions, id)
    }

    fn stats(&self) -> IndexResult<StoreStats> {
        let rtxn = self.env.read_txn()?;
        Ok(StoreStats {
            db_path: self.db_path.to_string_lossy().to_string(),
            mods: table_len(&self.mods, &rtxn)?,
            known_hashes: table_len(&self.hashes, &rtxn)?,
            platform_links: table_len(&self.platforms, &rtxn)?,
            coordinates: table_len(&self.coordinates, &rtxn)?,
            seen_files: table_len(&self.known_files, &rtxn)?,
            reference_rows: table_len(&self.references, &rtxn)?,
            inheritance_rows: table_len(&self.inheritance, &rtxn)?,
            class_rows: table_len(&self.classes, &rtxn)?,
            tag_rows: table_len(&self.tags, &rtxn)?,
            enum_extension_rows: table_len(&self.enum_extensions, &rtxn)?,
        })
    }
}

fn open_env(db_path: &Path) -> IndexResult<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: We do not use NO_LOCK and keep default LMDB locking guarantees.
    // NO_SUB_DIR keeps the database a single file at the configured path.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        Ok(options.open(db_path)?)
    }
}

fn table_len(db: &StrDb, rtxn: &RoTxn<'_>) -> IndexResult<u64> {
    let mut count = 0u64;
    for item in db.iter(rtxn)? {
        let _ = item?;
        count += 1;
    }
    Ok(count)
}
