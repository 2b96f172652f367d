//! Turning a batch of downloaded platform files into the final list of
//! indexing candidates.
//!
//! Bundled jars are flattened across every platform file; the same bundled
//! identifier keeps only its highest version. A bundled jar the platform also
//! lists under its own project carries that listing. Bundled mods are then
//! merged with the platform files that carry the same mod id: content follows
//! the higher version, while a marketplace link always stays with the identity.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use tracing::debug;

use crate::artifact::{ModArtifact, NestedArtifact};
use crate::identity::{ModIdentity, PlatformLink};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub artifact: ModArtifact,
    pub link: Option<PlatformLink>,
    /// Coordinate learned from a bundled copy with identical content.
    pub extra_coordinate: Option<String>,
}

impl Candidate {
    pub fn from_platform(artifact: ModArtifact, link: PlatformLink) -> Self {
        Self {
            artifact,
            link: Some(link),
            extra_coordinate: None,
        }
    }

    pub fn bundled(artifact: ModArtifact) -> Self {
        Self {
            artifact,
            link: None,
            extra_coordinate: None,
        }
    }

    /// Identity of the first declared mod id, if any.
    pub fn identity(&self) -> Option<ModIdentity> {
        self.artifact
            .mod_ids
            .first()
            .map(|id| ModIdentity::new(id.clone(), self.link.clone()))
    }

    pub fn label(&self) -> String {
        match &self.link {
            Some(link) => format!("{} {} ({link})", self.artifact.display_name, self.artifact.version),
            None => format!("{} {}", self.artifact.display_name, self.artifact.version),
        }
    }
}

/// Content hashes of every bundled jar, at any depth, first-seen order.
pub fn bundled_hashes(candidates: &[Candidate]) -> Vec<String> {
    fn walk(nested: &[NestedArtifact], out: &mut IndexSet<String>) {
        for entry in nested {
            out.insert(entry.artifact.content_hash.clone());
            walk(&entry.artifact.nested, out);
        }
    }
    let mut out = IndexSet::new();
    for candidate in candidates {
        walk(&candidate.artifact.nested, &mut out);
    }
    out.into_iter().collect()
}

/// Flattens every bundled jar under `nested` into `into`, recursively.
fn flatten(into: &mut IndexMap<String, NestedArtifact>, nested: Vec<NestedArtifact>) {
    for mut entry in nested {
        let children = std::mem::take(&mut entry.artifact.nested);
        let replace = match into.get(&entry.identifier) {
            Some(existing) => entry.version > existing.version,
            None => true,
        };
        if replace {
            into.insert(entry.identifier.clone(), entry);
        }
        flatten(into, children);
    }
}

/// Expands platform candidates with their bundled jars. `listed` maps the
/// content hash of bundled jars the platform lists on its own to that listing.
pub fn expand(
    platform_candidates: Vec<Candidate>,
    listed: &HashMap<String, PlatformLink>,
) -> Vec<Candidate> {
    let mut platform_candidates = platform_candidates;
    let mut nested = IndexMap::new();
    for candidate in &mut platform_candidates {
        let bundled = std::mem::take(&mut candidate.artifact.nested);
        flatten(&mut nested, bundled);
    }

    // A bundled copy of a file that is itself being indexed from a platform
    // only contributes its coordinate.
    let by_hash: HashMap<String, usize> = platform_candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (c.artifact.content_hash.clone(), i))
        .collect();
    nested.retain(|identifier, entry| match by_hash.get(&entry.artifact.content_hash) {
        Some(&i) => {
            let candidate = &mut platform_candidates[i];
            if candidate.extra_coordinate.is_none() {
                candidate.extra_coordinate = Some(identifier.clone());
            }
            false
        }
        None => true,
    });

    let mut by_mod_id: IndexMap<String, Vec<Candidate>> = IndexMap::new();
    let mut standalone = Vec::new();
    for candidate in platform_candidates {
        match candidate.artifact.mod_ids.first().cloned() {
            Some(mod_id) => by_mod_id.entry(mod_id).or_default().push(candidate),
            None => standalone.push(candidate),
        }
    }

    let mut generic = Vec::new();
    for (identifier, entry) in nested {
        let mut bundled = Candidate::bundled(entry.artifact);
        bundled.link = listed.get(&bundled.artifact.content_hash).cloned();
        let Some(identity) = bundled.identity() else {
            generic.push(bundled);
            continue;
        };
        let bucket = by_mod_id.entry(identity.mod_id().to_string()).or_default();
        let existing = bucket
            .iter_mut()
            .find(|c| c.identity().is_some_and(|other| other.matches(&identity)));
        match existing {
            Some(existing) if bundled.artifact.version > existing.artifact.version => {
                debug!(
                    mod_id = identity.mod_id(),
                    identifier = %identifier,
                    bundled = %bundled.artifact.version,
                    replaced = %existing.artifact.version,
                    "bundled copy is newer than the platform file"
                );
                let kept = match existing.identity() {
                    Some(other) => identity.merge(other),
                    None => identity,
                };
                *existing = Candidate {
                    artifact: bundled.artifact,
                    link: kept.link().cloned(),
                    extra_coordinate: existing.extra_coordinate.take(),
                };
            }
            Some(_) => {}
            None => bucket.push(bundled),
        }
    }

    by_mod_id
        .into_values()
        .flatten()
        .chain(standalone)
        .chain(generic)
        .collect()
}
