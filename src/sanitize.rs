//! Pruning rules applied to every class of an artifact before aggregation.
//!
//! Each rule sees a private copy of one class and the untouched records of all
//! its siblings, so the outcome never depends on rule order or on which
//! sibling was sanitized first.

use std::collections::HashMap;

use crate::record::{ClassRecord, RefKind, access};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Drop,
}

pub type Siblings<'a> = HashMap<&'a str, &'a ClassRecord>;

pub trait SanitizationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, class: &mut ClassRecord, siblings: &Siblings<'_>) -> Verdict;
}

/// Removes fields and methods that are neither public nor protected.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropPrivate;

impl SanitizationRule for DropPrivate {
    fn name(&self) -> &'static str {
        "drop-private"
    }

    fn apply(&self, class: &mut ClassRecord, _siblings: &Siblings<'_>) -> Verdict {
        class.fields.retain(|_, f| access::is_visible(f.access));
        class.methods.retain(|_, m| access::is_visible(m.access));
        Verdict::Keep
    }
}

pub const LAMBDA_PREFIX: &str = "lambda$";

#[derive(Debug, Default, Clone, Copy)]
pub struct DropSyntheticLambdas;

impl SanitizationRule for DropSyntheticLambdas {
    fn name(&self) -> &'static str {
        "drop-synthetic-lambda"
    }

    fn apply(&self, class: &mut ClassRecord, _siblings: &Siblings<'_>) -> Verdict {
        class.methods.retain(|_, m| !m.name.starts_with(LAMBDA_PREFIX));
        Verdict::Keep
    }
}

/// Removes field and method references into sibling classes when the target
/// member is static or not visible, or when its class is a root class.
/// Only the artifact's own classes are consulted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropSelfReferences;

impl SanitizationRule for DropSelfReferences {
    fn name(&self) -> &'static str {
        "drop-self-references"
    }

    fn apply(&self, class: &mut ClassRecord, siblings: &Siblings<'_>) -> Verdict {
        class.references.retain(|reference, _| {
            if !matches!(reference.kind, RefKind::Field | RefKind::Method) {
                return true;
            }
            let Some(owner) = siblings.get(reference.owner.as_str()) else {
                return true;
            };
            let Some(flags) = owner.member_access(&reference.member, reference.kind) else {
                return true;
            };
            let noise = access::is_static(flags) || !access::is_visible(flags) || owner.is_root();
            !noise
        });
        Verdict::Keep
    }
}

/// Drops `Outer$1`-style classes entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropAnonymousClasses;

pub fn is_anonymous(name: &str) -> bool {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    digits > 0 && name[..name.len() - digits].ends_with('$')
}

impl SanitizationRule for DropAnonymousClasses {
    fn name(&self) -> &'static str {
        "drop-anonymous-classes"
    }

    fn apply(&self, class: &mut ClassRecord, _siblings: &Siblings<'_>) -> Verdict {
        if is_anonymous(class.simple_name()) {
            Verdict::Drop
        } else {
            Verdict::Keep
        }
    }
}

pub struct Sanitizer {
    rules: Vec<Box<dyn SanitizationRule>>,
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::standard()
    }
}

impl Sanitizer {
    pub fn new(rules: Vec<Box<dyn SanitizationRule>>) -> Self {
        Self { rules }
    }

    /// All four rules, in the order the indexer applies them.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(DropPrivate),
            Box::new(DropSyntheticLambdas),
            Box::new(DropSelfReferences),
            Box::new(DropAnonymousClasses),
        ])
    }

    /// A pipeline that keeps everything unchanged.
    pub fn passthrough() -> Self {
        Self::new(Vec::new())
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn sanitize(&self, classes: Vec<ClassRecord>) -> Vec<ClassRecord> {
        if self.rules.is_empty() {
            return classes;
        }

        let siblings: Siblings<'_> = classes.iter().map(|c| (c.name.as_str(), c)).collect();
        let mut kept = Vec::with_capacity(classes.len());
        'classes: for original in &classes {
            let mut class = original.clone();
            for rule in &self.rules {
                if rule.apply(&mut class, &siblings) == Verdict::Drop {
                    tracing::trace!(class = %original.name, rule = rule.name(), "class dropped");
                    continue 'classes;
                }
            }
            kept.push(class);
        }
        kept
    }
}
