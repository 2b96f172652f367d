//! Deduplication keys for mods.
//!
//! A [`ModIdentity`] is either *strong* (the mod id plus a marketplace
//! listing) or *weak* (the mod id alone, as for bundled jars). Matching is
//! asymmetric: a weak identity matches any identity with the same mod id,
//! while two strong identities only match when they point at the same
//! listing. Distinct listings may share a human-chosen mod id.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformLink {
    pub platform: String,
    pub project_id: u64,
    pub file_id: u64,
}

impl PlatformLink {
    pub fn new(platform: impl Into<String>, project_id: u64, file_id: u64) -> Self {
        Self {
            platform: platform.into(),
            project_id,
            file_id,
        }
    }

    /// Whether both links name the same listing, whatever the file.
    pub fn same_project(&self, other: &PlatformLink) -> bool {
        self.platform == other.platform && self.project_id == other.project_id
    }
}

impl fmt::Display for PlatformLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.platform, self.project_id, self.file_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModIdentity {
    Strong { mod_id: String, link: PlatformLink },
    Weak { mod_id: String },
}

impl ModIdentity {
    /// Project id 0 means "unknown" and yields a weak identity.
    pub fn new(mod_id: impl Into<String>, link: Option<PlatformLink>) -> Self {
        let mod_id = mod_id.into();
        match link {
            Some(link) if link.project_id != 0 => ModIdentity::Strong { mod_id, link },
            _ => ModIdentity::Weak { mod_id },
        }
    }

    pub fn mod_id(&self) -> &str {
        match self {
            ModIdentity::Strong { mod_id, .. } | ModIdentity::Weak { mod_id } => mod_id,
        }
    }

    pub fn link(&self) -> Option<&PlatformLink> {
        match self {
            ModIdentity::Strong { link, .. } => Some(link),
            ModIdentity::Weak { .. } => None,
        }
    }

    pub fn matches(&self, other: &ModIdentity) -> bool {
        if self.mod_id() != other.mod_id() {
            return false;
        }
        match (self.link(), other.link()) {
            (Some(a), Some(b)) => a.same_project(b),
            _ => true,
        }
    }

    /// Combines two matching identities. A strong side always wins, so a
    /// marketplace link survives when the content it was attached to is
    /// replaced by a bundled copy.
    pub fn merge(self, other: ModIdentity) -> ModIdentity {
        match (self, other) {
            (strong @ ModIdentity::Strong { .. }, _) => strong,
            (ModIdentity::Weak { mod_id }, ModIdentity::Strong { link, .. }) => {
                ModIdentity::Strong { mod_id, link }
            }
            (weak, ModIdentity::Weak { .. }) => weak,
        }
    }
}

impl fmt::Display for ModIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModIdentity::Strong { mod_id, link } => write!(f, "{mod_id}@{link}"),
            ModIdentity::Weak { mod_id } => f.write_str(mod_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong(id: &str, project: u64) -> ModIdentity {
        ModIdentity::new(id, Some(PlatformLink::new("curseforge", project, 1)))
    }

    fn weak(id: &str) -> ModIdentity {
        ModIdentity::new(id, None)
    }

    #[test]
    fn matching_is_asymmetric_on_project_ids() {
        assert!(strong("geckolib", 388172).matches(&weak("geckolib")));
        assert!(weak("geckolib").matches(&strong("geckolib", 388172)));
        assert!(strong("geckolib", 388172).matches(&strong("geckolib", 388172)));
        assert!(!strong("geckolib", 388172).matches(&strong("geckolib", 999)));
        assert!(!weak("geckolib").matches(&weak("other")));
    }

    #[test]
    fn unknown_project_is_weak() {
        let id = ModIdentity::new("jei", Some(PlatformLink::new("modrinth", 0, 5)));
        assert_eq!(id, weak("jei"));
        assert!(id.link().is_none());
    }

    #[test]
    fn same_project_id_on_different_platforms_does_not_match() {
        let cf = ModIdentity::new("jei", Some(PlatformLink::new("curseforge", 7, 1)));
        let mr = ModIdentity::new("jei", Some(PlatformLink::new("modrinth", 7, 1)));
        assert!(!cf.matches(&mr));
    }

    #[test]
    fn merge_keeps_the_strong_link() {
        let merged = weak("geckolib").merge(strong("geckolib", 388172));
        assert_eq!(merged.link().map(|l| l.project_id), Some(388172));
        assert_eq!(merged.mod_id(), "geckolib");
        assert_eq!(strong("a", 1).merge(strong("a", 1)), strong("a", 1));
        assert_eq!(weak("a").merge(weak("a")), weak("a"));
    }
}
