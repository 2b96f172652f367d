//! Reading one artifact: manifest, mod metadata, nested jars and content hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::warn;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::IndexResult;
use crate::enums::{self, EnumExtension};
use crate::tags::{self, TagFile};
use crate::version::ArtifactVersion;

pub const MANIFEST: &str = "META-INF/MANIFEST.MF";
pub const NEOFORGE_METADATA: &str = "META-INF/neoforge.mods.toml";
pub const FORGE_METADATA: &str = "META-INF/mods.toml";
pub const FABRIC_METADATA: &str = "fabric.mod.json";
pub const JARJAR_METADATA: &str = "META-INF/jarjar/metadata.json";
pub const MAX_NESTING_DEPTH: usize = 8;

const JAR_VERSION_PLACEHOLDER: &str = "${file.jarVersion}";

/// Service-locator entries that make a jar without mod metadata a loader library.
const LIBRARY_SERVICES: [&str; 8] = [
    "cpw.mods.modlauncher.api.ITransformationService",
    "net.neoforged.neoforgespi.locating.IModFileCandidateLocator",
    "net.neoforged.neoforgespi.locating.IModFileReader",
    "net.neoforged.neoforgespi.locating.IDependencyLocator",
    "net.neoforged.neoforgespi.earlywindow.GraphicsBootstrapper",
    "net.neoforged.neoforgespi.earlywindow.ImmediateWindowProvider",
    "net.minecraftforge.forgespi.locating.IModLocator",
    "net.minecraftforge.forgespi.locating.IDependencyLocator",
];

/// SHA-256 of `bytes`, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Random access over the entries of an in-memory jar.
pub struct Jar<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Jar<'a> {
    pub fn open(bytes: &'a [u8]) -> IndexResult<Self> {
        Ok(Self {
            archive: ZipArchive::new(Cursor::new(bytes))?,
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    pub fn read(&mut self, name: &str) -> IndexResult<Option<Vec<u8>>> {
        match self.archive.by_name(name) {
            Ok(mut entry) => {
                // The declared size is untrusted; let the reader grow the buffer.
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every `data/<namespace>/tags/**.json` entry that parses as a tag.
    pub fn tags(&mut self) -> IndexResult<Vec<TagFile>> {
        let mut out = Vec::new();
        for entry in self.names() {
            let Some(name) = tags::tag_name(&entry) else {
                continue;
            };
            if let Some(content) = self.read(&entry)?
                && let Some(tag) = tags::parse(name, &content)
            {
                out.push(tag);
            }
        }
        Ok(out)
    }

    /// Enum extensions declared in the files at `paths`. Missing or malformed
    /// files are logged and skipped.
    pub fn enum_extensions(&mut self, paths: &[String]) -> IndexResult<Vec<EnumExtension>> {
        let mut out = Vec::new();
        for path in paths {
            let Some(content) = self.read(path)? else {
                warn!(path, "declared enum extension file is missing");
                continue;
            };
            match enums::parse(&content) {
                Ok(found) => out.extend(found),
                Err(e) => warn!(path, error = %e, "invalid enum extension file"),
            }
        }
        Ok(out)
    }
}

/// Main-section attributes of a jar manifest, continuation lines joined.
pub fn parse_manifest(text: &str) -> HashMap<String, String> {
    let mut attrs: HashMap<String, String> = HashMap::new();
    let mut last: Option<String> = None;
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(continued) = line.strip_prefix(' ') {
            if let Some(key) = &last
                && let Some(value) = attrs.get_mut(key)
            {
                value.push_str(continued);
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            attrs.insert(key.clone(), value.strip_prefix(' ').unwrap_or(value).to_string());
            last = Some(key);
        }
    }
    attrs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Mod,
    Library,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModFileMetadata {
    pub license: Option<String>,
    pub issue_tracker: Option<String>,
    pub mod_loader: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NestedArtifact {
    /// `group:artifact` for jar-in-jar entries, the mod id for Fabric ones.
    pub identifier: String,
    pub version: ArtifactVersion,
    pub artifact: ModArtifact,
}

#[derive(Debug, Clone)]
pub struct ModArtifact {
    pub display_name: String,
    pub version: ArtifactVersion,
    pub coordinate: Option<String>,
    pub content_hash: String,
    pub mod_ids: Vec<String>,
    pub kind: ArtifactKind,
    pub metadata: Option<ModFileMetadata>,
    pub nested: Vec<NestedArtifact>,
    /// Jar paths named by `enumExtensions` in the mod metadata.
    pub enum_extension_files: Vec<String>,
    payload: Arc<Vec<u8>>,
}

/// The persisted description of an artifact, without payload or nested tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub display_name: String,
    pub version: String,
    pub coordinate: Option<String>,
    pub content_hash: String,
    pub mod_ids: Vec<String>,
    pub kind: ArtifactKind,
    pub metadata: Option<ModFileMetadata>,
}

#[derive(Debug, Deserialize)]
struct ModsToml {
    #[serde(default)]
    mods: Vec<TomlMod>,
    license: Option<String>,
    #[serde(rename = "issueTrackerURL")]
    issue_tracker: Option<String>,
    #[serde(rename = "modLoader")]
    mod_loader: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlMod {
    #[serde(rename = "modId")]
    mod_id: String,
    version: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "enumExtensions")]
    enum_extensions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FabricModJson {
    id: String,
    version: String,
    name: Option<String>,
    license: Option<serde_json::Value>,
    #[serde(default)]
    jars: Vec<FabricJar>,
}

#[derive(Debug, Deserialize)]
struct FabricJar {
    file: String,
}

#[derive(Debug, Deserialize)]
struct JarJarMetadata {
    #[serde(default)]
    jars: Vec<JarJarEntry>,
}

#[derive(Debug, Deserialize)]
struct JarJarEntry {
    identifier: JarJarIdentifier,
    version: JarJarVersion,
    path: String,
}

#[derive(Debug, Deserialize)]
struct JarJarIdentifier {
    group: String,
    artifact: String,
}

#[derive(Debug, Deserialize)]
struct JarJarVersion {
    #[serde(rename = "artifactVersion")]
    artifact_version: String,
}

struct ModInfo {
    mod_ids: Vec<String>,
    version: ArtifactVersion,
    display_name: String,
    metadata: ModFileMetadata,
    enum_extension_files: Vec<String>,
}

fn read_forge_metadata(content: &[u8], jar_version: &str) -> IndexResult<Option<ModInfo>> {
    let text = String::from_utf8_lossy(content);
    let toml: ModsToml = toml::from_str(&text)?;
    let Some(first) = toml.mods.first() else {
        return Ok(None);
    };
    let version = first
        .version
        .as_deref()
        .map(|v| v.replace(JAR_VERSION_PLACEHOLDER, jar_version))
        .unwrap_or_else(|| jar_version.to_string());
    let display_name = first.display_name.clone().unwrap_or_else(|| first.mod_id.clone());
    Ok(Some(ModInfo {
        mod_ids: toml.mods.iter().map(|m| m.mod_id.clone()).collect(),
        version: ArtifactVersion::parse(version),
        display_name,
        metadata: ModFileMetadata {
            license: toml.license,
            issue_tracker: toml.issue_tracker,
            mod_loader: toml.mod_loader,
        },
        enum_extension_files: toml
            .mods
            .iter()
            .filter_map(|m| m.enum_extensions.clone())
            .collect(),
    }))
}

fn read_fabric_metadata(content: &[u8]) -> IndexResult<FabricModJson> {
    Ok(serde_json::from_slice(content)?)
}

fn fabric_license(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|i| i.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}

impl ModArtifact {
    /// Reads an artifact from its raw bytes. Returns `Ok(None)` for jars that
    /// are neither mods nor loader libraries.
    pub fn read(
        payload: Arc<Vec<u8>>,
        coordinate: Option<&str>,
        version_fallback: Option<&str>,
    ) -> IndexResult<Option<Self>> {
        Self::read_nested(payload, coordinate, version_fallback, 0)
    }

    fn read_nested(
        payload: Arc<Vec<u8>>,
        coordinate: Option<&str>,
        version_fallback: Option<&str>,
        depth: usize,
    ) -> IndexResult<Option<Self>> {
        let mut jar = Jar::open(&payload)?;
        let manifest = jar
            .read(MANIFEST)?
            .map(|m| parse_manifest(&String::from_utf8_lossy(&m)))
            .unwrap_or_default();
        let jar_version = manifest
            .get("Implementation-Version")
            .map(String::as_str)
            .or(version_fallback)
            .unwrap_or(ArtifactVersion::UNKNOWN)
            .to_string();

        let mut info = None;
        for file in [NEOFORGE_METADATA, FORGE_METADATA] {
            let Some(content) = jar.read(file)? else {
                continue;
            };
            match read_forge_metadata(&content, &jar_version) {
                Ok(Some(found)) => {
                    info = Some(found);
                    break;
                }
                Ok(None) => {}
                Err(e) => warn!(file, coordinate, error = %e, "invalid mod metadata"),
            }
        }

        let mut fabric = None;
        if info.is_none()
            && let Some(content) = jar.read(FABRIC_METADATA)?
        {
            match read_fabric_metadata(&content) {
                Ok(fmj) => {
                    info = Some(ModInfo {
                        mod_ids: vec![fmj.id.clone()],
                        version: ArtifactVersion::parse(fmj.version.clone()),
                        display_name: fmj.name.clone().unwrap_or_else(|| fmj.id.clone()),
                        metadata: ModFileMetadata {
                            license: fabric_license(fmj.license.as_ref()),
                            issue_tracker: None,
                            mod_loader: Some("fabric".into()),
                        },
                        enum_extension_files: Vec::new(),
                    });
                    fabric = Some(fmj);
                }
                Err(e) => warn!(file = FABRIC_METADATA, coordinate, error = %e, "invalid mod metadata"),
            }
        }

        let (kind, display_name, version, mod_ids, metadata, enum_extension_files) = match info {
            Some(info) => (
                ArtifactKind::Mod,
                info.display_name,
                info.version,
                info.mod_ids,
                Some(info.metadata),
                info.enum_extension_files,
            ),
            None => {
                let library = manifest.contains_key("FMLModType")
                    || LIBRARY_SERVICES
                        .iter()
                        .any(|s| jar.contains(&format!("META-INF/services/{s}")));
                if !library {
                    return Ok(None);
                }
                let display_name = coordinate
                    .map(str::to_string)
                    .or_else(|| manifest.get("Implementation-Title").cloned())
                    .or_else(|| {
                        jar.names()
                            .into_iter()
                            .find(|n| n.ends_with(".class"))
                            .map(|n| n.trim_end_matches(".class").replace('/', "."))
                    })
                    .unwrap_or_default();
                (
                    ArtifactKind::Library,
                    display_name,
                    ArtifactVersion::parse(jar_version.clone()),
                    Vec::new(),
                    None,
                    Vec::new(),
                )
            }
        };

        let nested = if depth < MAX_NESTING_DEPTH {
            let mut nested = read_jarjar(&mut jar, depth)?;
            if let Some(fmj) = &fabric {
                nested.extend(read_fabric_jars(&mut jar, fmj, depth)?);
            }
            nested
        } else {
            warn!(coordinate, depth, "nesting too deep, ignoring bundled jars");
            Vec::new()
        };

        drop(jar);
        Ok(Some(Self {
            display_name,
            version,
            coordinate: coordinate.map(str::to_string),
            content_hash: content_hash(&payload),
            mod_ids,
            kind,
            metadata,
            nested,
            enum_extension_files,
            payload,
        }))
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn shared_payload(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.payload)
    }

    pub fn is_mod(&self) -> bool {
        !self.mod_ids.is_empty()
    }

    pub fn tags(&self) -> IndexResult<Vec<TagFile>> {
        Jar::open(&self.payload)?.tags()
    }

    pub fn enum_extensions(&self) -> IndexResult<Vec<EnumExtension>> {
        if self.enum_extension_files.is_empty() {
            return Ok(Vec::new());
        }
        Jar::open(&self.payload)?.enum_extensions(&self.enum_extension_files)
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            display_name: self.display_name.clone(),
            version: self.version.to_string(),
            coordinate: self.coordinate.clone(),
            content_hash: self.content_hash.clone(),
            mod_ids: self.mod_ids.clone(),
            kind: self.kind,
            metadata: self.metadata.clone(),
        }
    }
}

fn read_jarjar(jar: &mut Jar<'_>, depth: usize) -> IndexResult<Vec<NestedArtifact>> {
    let Some(content) = jar.read(JARJAR_METADATA)? else {
        return Ok(Vec::new());
    };
    let metadata: JarJarMetadata = match serde_json::from_slice(&content) {
        Ok(m) => m,
        Err(e) => {
            warn!(file = JARJAR_METADATA, error = %e, "invalid jar-in-jar metadata");
            return Ok(Vec::new());
        }
    };

    let mut nested = Vec::new();
    for entry in metadata.jars {
        let identifier = format!("{}:{}", entry.identifier.group, entry.identifier.artifact);
        let version = entry.version.artifact_version;
        let Some(bytes) = jar.read(&entry.path)? else {
            continue;
        };
        if let Some(artifact) = read_bundled(bytes, &identifier, &version, depth) {
            nested.push(NestedArtifact {
                identifier,
                version: ArtifactVersion::parse(version),
                artifact,
            });
        }
    }
    Ok(nested)
}

fn read_fabric_jars(
    jar: &mut Jar<'_>,
    fmj: &FabricModJson,
    depth: usize,
) -> IndexResult<Vec<NestedArtifact>> {
    let mut nested = Vec::new();
    for entry in &fmj.jars {
        let Some(bytes) = jar.read(&entry.file)? else {
            continue;
        };
        // Fabric bundles carry no coordinate; the nested mod id stands in for one.
        let inner = match Jar::open(&bytes).and_then(|mut j| j.read(FABRIC_METADATA)) {
            Ok(Some(content)) => match read_fabric_metadata(&content) {
                Ok(inner) => inner,
                Err(_) => continue,
            },
            Ok(None) | Err(_) => continue,
        };
        if let Some(artifact) = read_bundled(bytes, &inner.id, &inner.version, depth) {
            nested.push(NestedArtifact {
                identifier: inner.id,
                version: ArtifactVersion::parse(inner.version),
                artifact,
            });
        }
    }
    Ok(nested)
}

/// A broken bundled jar is logged and left out; it never fails its parent.
fn read_bundled(bytes: Vec<u8>, identifier: &str, version: &str, depth: usize) -> Option<ModArtifact> {
    match ModArtifact::read_nested(Arc::new(bytes), Some(identifier), Some(version), depth + 1) {
        Ok(artifact) => artifact,
        Err(e) => {
            warn!(identifier, version, error = %e, "skipping unreadable bundled jar");
            None
        }
    }
}
