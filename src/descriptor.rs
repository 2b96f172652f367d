//! JVM type and method descriptors.
//!
//! Descriptors are kept as borrowed slices of the original string; only the
//! shapes the indexer needs are exposed.

use crate::error::{IndexError, IndexResult};

pub const OBJECT: &str = "java/lang/Object";

/// Length of the single field type starting at the beginning of `desc`.
fn field_type_len(desc: &str) -> Option<usize> {
    let bytes = desc.as_bytes();
    let mut i = 0;
    while bytes.get(i) == Some(&b'[') {
        i += 1;
    }
    match bytes.get(i)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(i + 1),
        b'L' => desc[i..].find(';').map(|end| i + end + 1),
        _ => None,
    }
}

/// Splits `(args)ret` into its argument descriptors.
pub fn method_arguments(desc: &str) -> IndexResult<Vec<&str>> {
    let body = desc
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(args, _)| args)
        .ok_or_else(|| IndexError::parse(format!("malformed method descriptor {desc:?}")))?;

    let mut args = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let len = field_type_len(rest)
            .ok_or_else(|| IndexError::parse(format!("malformed method descriptor {desc:?}")))?;
        args.push(&rest[..len]);
        rest = &rest[len..];
    }
    Ok(args)
}

/// Internal name for an object descriptor (`Lfoo/Bar;` -> `foo/Bar`); any
/// other descriptor (primitive or array) is returned unchanged.
pub fn internal_name(desc: &str) -> &str {
    desc.strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(desc)
}

/// Internal name of the innermost element type of an array descriptor, or of
/// the type itself when it is not an array.
pub fn element_type(desc: &str) -> &str {
    internal_name(desc.trim_start_matches('['))
}

/// Whether the innermost element type is a primitive.
pub fn is_primitive_element(desc: &str) -> bool {
    matches!(
        desc.trim_start_matches('['),
        "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" | "V"
    )
}
