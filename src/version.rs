//! Comparable artifact versions with Maven ordering rules.
//!
//! `1.0 == 1.0.0`, `1.0-alpha < 1.0-beta < 1.0-rc1 < 1.0-SNAPSHOT < 1.0 <
//! 1.0-sp1 < 1.0.1`. Unknown qualifiers sort after the known ones,
//! lexically among themselves.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// Decimal digits without leading zeros; empty for zero.
    Number(String),
    Qualifier(String),
}

const KNOWN_QUALIFIERS: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];
const RELEASE_RANK: usize = 5;

fn qualifier_rank(q: &str) -> (usize, &str) {
    match KNOWN_QUALIFIERS.iter().position(|k| *k == q) {
        Some(rank) => (rank, ""),
        None => (KNOWN_QUALIFIERS.len(), q),
    }
}

fn canonical_qualifier(raw: &str, followed_by_digit: bool) -> String {
    match raw {
        "a" if followed_by_digit => "alpha".into(),
        "b" if followed_by_digit => "beta".into(),
        "m" if followed_by_digit => "milestone".into(),
        "cr" => "rc".into(),
        "ga" | "final" | "release" => String::new(),
        other => other.into(),
    }
}

impl Item {
    fn is_null(&self) -> bool {
        match self {
            Item::Number(n) => n.is_empty(),
            Item::Qualifier(q) => q.is_empty(),
        }
    }

    fn cmp_null(&self) -> Ordering {
        match self {
            Item::Number(n) if n.is_empty() => Ordering::Equal,
            Item::Number(_) => Ordering::Greater,
            Item::Qualifier(q) => qualifier_rank(q).cmp(&(RELEASE_RANK, "")),
        }
    }

    fn cmp_item(&self, other: &Item) -> Ordering {
        match (self, other) {
            (Item::Number(a), Item::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Item::Number(_), Item::Qualifier(_)) => Ordering::Greater,
            (Item::Qualifier(_), Item::Number(_)) => Ordering::Less,
            (Item::Qualifier(a), Item::Qualifier(b)) => qualifier_rank(a).cmp(&qualifier_rank(b)),
        }
    }
}

fn tokenize(raw: &str) -> Vec<Item> {
    let lower = raw.trim().to_ascii_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    let mut items = Vec::new();
    let mut start = 0;

    let mut push = |token: &str, next: Option<char>| {
        if token.chars().all(|c| c.is_ascii_digit()) && !token.is_empty() {
            items.push(Item::Number(token.trim_start_matches('0').to_string()));
        } else {
            let followed_by_digit = next.is_some_and(|c| c.is_ascii_digit());
            items.push(Item::Qualifier(canonical_qualifier(token, followed_by_digit)));
        }
    };

    for i in 0..=chars.len() {
        let boundary = match chars.get(i) {
            None => true,
            Some('.') | Some('-') | Some('_') | Some('+') => true,
            Some(c) => i > start && chars[i - 1].is_ascii_digit() != c.is_ascii_digit(),
        };
        if !boundary {
            continue;
        }
        if i > start {
            let token: String = chars[start..i].iter().collect();
            push(&token, chars.get(i).copied());
        }
        start = match chars.get(i) {
            Some(c) if c.is_ascii_alphanumeric() => i,
            _ => i + 1,
        };
    }

    while items.last().is_some_and(Item::is_null) {
        items.pop();
    }
    items
}

/// A parsed version that keeps its original spelling for display and storage.
#[derive(Debug, Clone)]
pub struct ArtifactVersion {
    raw: String,
    items: Vec<Item>,
}

impl ArtifactVersion {
    pub const UNKNOWN: &'static str = "0.0NONE";

    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let items = tokenize(&raw);
        Self { raw, items }
    }

    pub fn unknown() -> Self {
        Self::parse(Self::UNKNOWN)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for ArtifactVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        for i in 0..len {
            let ord = match (self.items.get(i), other.items.get(i)) {
                (Some(a), Some(b)) => a.cmp_item(b),
                (Some(a), None) => a.cmp_null(),
                (None, Some(b)) => b.cmp_null().reverse(),
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for ArtifactVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ArtifactVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ArtifactVersion {}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for ArtifactVersion {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl Serialize for ArtifactVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ArtifactVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::parse)
    }
}
