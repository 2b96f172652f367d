//! Annotation value trees and their canonical string form.
//!
//! ```text
//! member := name "=" value
//! value  := scalar
//!         | "[" value ("," value)* "]"
//!         | "@" type "(" member ("," member)* ")"
//!         | type "." enumConstant
//!         | type ".class"
//! ```
//!
//! Members live in a `BTreeMap`, so the canonical form lists them by ascending
//! name whatever order the class file declared them in.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::internal_name;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Scalar {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Byte(v) => write!(f, "{v}"),
            Scalar::Char(v) => write!(f, "{v}"),
            Scalar::Short(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Long(v) => write!(f, "{v}"),
            // Debug keeps the trailing ".0" so 1.0 and 1 stay distinguishable.
            Scalar::Float(v) => write!(f, "{v:?}"),
            Scalar::Double(v) => write!(f, "{v:?}"),
            Scalar::Boolean(v) => write!(f, "{v}"),
            Scalar::String(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnnotationValue {
    Scalar { value: Scalar },
    List { values: Vec<AnnotationValue> },
    Annotation { annotation: Annotation },
    Enum { type_name: String, constant: String },
    Class { type_name: String },
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Scalar { value } => write!(f, "{value}"),
            AnnotationValue::List { values } => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            AnnotationValue::Annotation { annotation } => write!(f, "{annotation}"),
            AnnotationValue::Enum {
                type_name,
                constant,
            } => write!(f, "{type_name}.{constant}"),
            AnnotationValue::Class { type_name } => write!(f, "{type_name}.class"),
        }
    }
}

impl AnnotationValue {
    /// Enum constant from the raw class-file descriptor of its type.
    pub fn enum_constant(descriptor: &str, constant: &str) -> Self {
        AnnotationValue::Enum {
            type_name: internal_name(descriptor).to_string(),
            constant: constant.to_string(),
        }
    }

    /// Class literal from the raw return descriptor stored in the class file.
    pub fn class_literal(descriptor: &str) -> Self {
        AnnotationValue::Class {
            type_name: internal_name(descriptor).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    /// Internal name of the annotation type.
    pub type_name: String,
    pub members: BTreeMap<String, AnnotationValue>,
}

impl Annotation {
    pub fn new(descriptor: &str) -> Self {
        Self {
            type_name: internal_name(descriptor).to_string(),
            members: BTreeMap::new(),
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.members.insert(name.into(), value);
        self
    }

    /// `name=value` pairs joined by `,`, by ascending name.
    pub fn members_string(&self) -> String {
        self.members
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Canonical form used for the reference row of an annotation applied to a
    /// `class`, `field` or `method`.
    pub fn usage_key(&self, target: &str) -> String {
        format!("@{target}({})", self.members_string())
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}({})", self.type_name, self.members_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i32]) -> AnnotationValue {
        AnnotationValue::List {
            values: values
                .iter()
                .map(|v| AnnotationValue::Scalar {
                    value: Scalar::Int(*v),
                })
                .collect(),
        }
    }

    #[test]
    fn canonical_form_ignores_declaration_order() {
        let a = Annotation::new("LFoo;")
            .with_member("value", ints(&[1, 2]))
            .with_member("kind", AnnotationValue::enum_constant("LBar;", "BAZ"));
        let b = Annotation::new("LFoo;")
            .with_member("kind", AnnotationValue::enum_constant("LBar;", "BAZ"))
            .with_member("value", ints(&[1, 2]));

        assert_eq!(a.to_string(), "@Foo(kind=Bar.BAZ,value=[1,2])");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn nested_annotations_and_class_literals_render_recursively() {
        let inner = Annotation::new("Lcom/example/Inner;").with_member(
            "type",
            AnnotationValue::class_literal("Ljava/lang/String;"),
        );
        let outer = Annotation::new("Lcom/example/Outer;")
            .with_member(
                "inner",
                AnnotationValue::Annotation { annotation: inner },
            )
            .with_member(
                "ratio",
                AnnotationValue::Scalar {
                    value: Scalar::Double(1.0),
                },
            );

        assert_eq!(
            outer.to_string(),
            "@com/example/Outer(inner=@com/example/Inner(type=java/lang/String.class),ratio=1.0)"
        );
        assert_eq!(
            outer.usage_key("method"),
            "@method(inner=@com/example/Inner(type=java/lang/String.class),ratio=1.0)"
        );
    }

    #[test]
    fn primitive_class_literals_keep_their_descriptor() {
        assert_eq!(AnnotationValue::class_literal("I").to_string(), "I.class");
        assert_eq!(
            AnnotationValue::class_literal("[Lfoo/Bar;").to_string(),
            "[Lfoo/Bar;.class"
        );
    }
}
