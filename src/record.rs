//! The structured shape of one compiled class.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::annotation::Annotation;
use crate::descriptor::OBJECT;

pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const INTERFACE: u16 = 0x0200;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const MODULE: u16 = 0x8000;

    pub fn is_visible(flags: u16) -> bool {
        flags & (PUBLIC | PROTECTED) != 0
    }

    pub fn is_static(flags: u16) -> bool {
        flags & STATIC != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Class,
    Field,
    Method,
    Annotation,
    Parameter,
}

impl RefKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RefKind::Class => "class",
            RefKind::Field => "field",
            RefKind::Method => "method",
            RefKind::Annotation => "annotation",
            RefKind::Parameter => "parameter",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(owner, member, kind)` usage edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub owner: String,
    pub member: String,
    pub kind: RefKind,
}

impl Reference {
    pub fn new(owner: impl Into<String>, member: impl Into<String>, kind: RefKind) -> Self {
        Self {
            owner: owner.into(),
            member: member.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub annotations: Vec<Annotation>,
}

impl MethodInfo {
    /// `name + descriptor`, the key of the method table.
    pub fn key(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassRecord {
    pub name: String,
    pub access: u16,
    /// `None` when the class has no superclass or extends `java/lang/Object`.
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub fields: BTreeMap<String, FieldInfo>,
    pub methods: BTreeMap<String, MethodInfo>,
    #[serde(serialize_with = "serialize_references")]
    pub references: BTreeMap<Reference, u32>,
}

impl ClassRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: access::PUBLIC,
            super_class: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    /// No declared interfaces and nothing above the universal root.
    pub fn is_root(&self) -> bool {
        self.interfaces.is_empty() && self.super_class.as_deref().is_none_or(|s| s == OBJECT)
    }

    /// Part of the name after the last `/`.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Looks up a member by the shape a [`Reference`] carries: a bare field
    /// name, or a method `name + descriptor`.
    pub fn member_access(&self, member: &str, kind: RefKind) -> Option<u16> {
        match kind {
            RefKind::Field => self.fields.get(member).map(|f| f.access),
            RefKind::Method => self.methods.get(member).map(|m| m.access),
            _ => None,
        }
    }

    pub fn add_reference(&mut self, reference: Reference) {
        *self.references.entry(reference).or_insert(0) += 1;
    }

    pub fn reference_count(&self) -> u64 {
        self.references.values().map(|c| *c as u64).sum()
    }

    pub fn inheritance(&self) -> InheritanceEntry {
        InheritanceEntry {
            class: self.name.clone(),
            super_class: self.super_class.clone(),
            interfaces: self.interfaces.clone(),
            methods: self.methods.keys().cloned().collect(),
        }
    }
}

fn serialize_references<S>(refs: &BTreeMap<Reference, u32>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;

    #[derive(Serialize)]
    struct Row<'a> {
        #[serde(flatten)]
        reference: &'a Reference,
        count: u32,
    }

    let mut seq = serializer.serialize_seq(Some(refs.len()))?;
    for (reference, count) in refs {
        seq.serialize_element(&Row {
            reference,
            count: *count,
        })?;
    }
    seq.end()
}

/// Hierarchy row persisted once per class name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceEntry {
    pub class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    /// Declared method signatures, `name + descriptor`.
    pub methods: Vec<String>,
}
