//! Description of the persisted tables for external analytics tools.
//!
//! Nothing here is read back by the indexer; it documents what [`crate::lmdb`]
//! writes so dashboards can label the data.

use serde::Serialize;

use crate::lmdb::{
    CLASSES_DB, ENUM_EXTENSIONS_DB, FILES_BY_MOD_DB, INHERITANCE_DB, KNOWN_FILES_DB, META_DB,
    MOD_COORDINATES_DB, MOD_HASHES_DB, MOD_PLATFORMS_DB, MODS_DB, REFERENCES_DB, TAGS_DB,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Semantic {
    Identifier,
    ForeignKey,
    Name,
    Version,
    Count,
    Flags,
    Timestamp,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub semantic: Semantic,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: &'static str,
    pub key: &'static str,
    pub description: &'static str,
    pub columns: Vec<Column>,
}

const fn col(name: &'static str, semantic: Semantic, description: &'static str) -> Column {
    Column {
        name,
        semantic,
        description,
    }
}

pub fn tables() -> Vec<Table> {
    use Semantic::*;
    vec![
        Table {
            name: MODS_DB,
            key: "zero-padded mod id",
            description: "One row per persisted mod identity",
            columns: vec![
                col("id", Identifier, "mod id"),
                col("display_name", Name, "human readable name"),
                col("version", Version, "version of the last indexed content"),
                col("coordinate", Name, "group:artifact, for bundled libraries"),
                col("mod_ids", Json, "declared mod ids"),
                col("platforms", Json, "platform name -> project and file id"),
                col("hashes", Json, "SHA-256 content hashes known to belong to this mod"),
                col("metadata", Json, "artifact summary of the last indexed content"),
                col("indexed_at", Timestamp, "unix seconds of the last commit"),
            ],
        },
        Table {
            name: MOD_HASHES_DB,
            key: "SHA-256 content hash",
            description: "Content hash lookup",
            columns: vec![col("mod_id", ForeignKey, "owning mod")],
        },
        Table {
            name: MOD_PLATFORMS_DB,
            key: "<platform>/<project id>",
            description: "Marketplace listing lookup",
            columns: vec![col("mod_id", ForeignKey, "owning mod")],
        },
        Table {
            name: MOD_COORDINATES_DB,
            key: "group:artifact",
            description: "Bundled dependency coordinate lookup",
            columns: vec![col("mod_id", ForeignKey, "owning mod")],
        },
        Table {
            name: KNOWN_FILES_DB,
            key: "<platform>/<file id>",
            description: "Platform files already processed",
            columns: vec![col("mod_id", ForeignKey, "mod the file resolved to")],
        },
        Table {
            name: FILES_BY_MOD_DB,
            key: "<mod id>/<platform>/<file id>",
            description: "Seen platform files grouped by owning mod",
            columns: vec![col("file", Identifier, "the key; values are empty")],
        },
        Table {
            name: REFERENCES_DB,
            key: "<mod id>/<sequence>",
            description: "Aggregated usage edges from method bodies and annotations",
            columns: vec![
                col("owner", Name, "internal name of the referenced type"),
                col("member", Name, "field name, method name+descriptor, annotation usage, or type"),
                col("kind", Name, "class, field, method, annotation or parameter"),
                col("count", Count, "occurrences across the artifact"),
            ],
        },
        Table {
            name: INHERITANCE_DB,
            key: "<mod id>/<sequence>",
            description: "One hierarchy row per class",
            columns: vec![
                col("class", Name, "internal class name"),
                col("super_class", Name, "superclass, absent for the universal root"),
                col("interfaces", Json, "declared interfaces"),
                col("methods", Json, "declared method signatures"),
            ],
        },
        Table {
            name: CLASSES_DB,
            key: "<mod id>/<sequence>",
            description: "Sanitized class shapes",
            columns: vec![
                col("name", Name, "internal class name"),
                col("access", Flags, "JVM access flags"),
                col("super_class", Name, "superclass"),
                col("interfaces", Json, "declared interfaces"),
                col("annotations", Json, "canonical annotation strings"),
                col("fields", Json, "name, descriptor, access, annotations"),
                col("methods", Json, "name, descriptor, access, annotations"),
            ],
        },
        Table {
            name: TAGS_DB,
            key: "<mod id>/<sequence>",
            description: "Data-pack tag files shipped by the mod",
            columns: vec![
                col("name", Name, "namespace/path of the tag"),
                col("replace", Flags, "whether the tag replaces earlier definitions"),
                col("entries", Json, "qualified entries"),
            ],
        },
        Table {
            name: ENUM_EXTENSIONS_DB,
            key: "<mod id>/<sequence>",
            description: "Constants the mod adds to game enums at load time",
            columns: vec![
                col("enum", Name, "internal name of the extended enum"),
                col("name", Name, "name of the added constant"),
                col("constructor", Name, "descriptor of the constructor used"),
                col("parameters", Json, "constructor arguments as declared"),
            ],
        },
        Table {
            name: META_DB,
            key: "setting name",
            description: "Internal counters",
            columns: vec![col("value", Count, "next_mod_id")],
        },
    ]
}
