//! Closed schema tree compiled by [`crate::lower`].
//!
//! CRD documents carry a JSON-Schema subset whose shape is only known at
//! runtime (`type` may be missing, `$ref` may stand alone, extension markers
//! change the meaning of an untyped node). [`RawSchema`] is the permissive
//! serde view of that subset; [`SchemaNode`] is the classified tree the
//! compiler matches on exhaustively.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ————————————————————————————————————————————————————————————————————————————
// RAW (SERDE) VIEW
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSchema {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, RawSchema>,
    pub items: Option<Box<RawSchema>>,
    #[serde(rename = "enum", default)]
    pub enum_: Vec<Value>,
    #[serde(rename = "$ref")]
    pub ref_: Option<String>,
    pub additional_properties: Option<RawAdditional>,
    #[serde(rename = "x-kubernetes-preserve-unknown-fields", default)]
    pub preserve_unknown_fields: bool,
    #[serde(rename = "x-kubernetes-int-or-string", default)]
    pub int_or_string: bool,
}

/// `additionalProperties` is either a boolean or a schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAdditional {
    Allowed(bool),
    Schema(Box<RawSchema>),
}

// ————————————————————————————————————————————————————————————————————————————
// CLASSIFIED TREE
// ————————————————————————————————————————————————————————————————————————————

/// Serializes canonically: properties are kept in a `BTreeMap` and enum
/// literals are key-sorted on construction, so equal content always yields
/// equal bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum Shape {
    Scalar {
        kind: ScalarKind,
        format: Option<String>,
    },
    Enum {
        kind: ScalarKind,
        format: Option<String>,
        literals: Vec<Value>,
    },
    Object(ObjectShape),
    Array {
        items: Option<Box<SchemaNode>>,
    },
    Ref {
        pointer: String,
    },
    IntOrString,
    Untyped,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectShape {
    pub properties: BTreeMap<String, SchemaNode>,
    pub additional: Option<Box<SchemaNode>>,
    pub preserve_unknown: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
    /// A `type` outside the JSON-Schema scalar set (or none, for enums).
    Other(String),
}

impl ScalarKind {
    fn parse(ty: &str) -> Self {
        match ty {
            "string" => ScalarKind::String,
            "integer" => ScalarKind::Integer,
            "number" => ScalarKind::Number,
            "boolean" => ScalarKind::Boolean,
            other => ScalarKind::Other(other.to_string()),
        }
    }

    /// Best guess for an enum declared without `type`.
    fn of_literals(literals: &[Value]) -> Self {
        let non_null = literals.iter().filter(|v| !v.is_null());
        if non_null.clone().all(Value::is_string) {
            ScalarKind::String
        } else if non_null.clone().all(|v| v.is_i64() || v.is_u64()) {
            ScalarKind::Integer
        } else if non_null.clone().all(Value::is_number) {
            ScalarKind::Number
        } else if non_null.clone().all(Value::is_boolean) {
            ScalarKind::Boolean
        } else {
            ScalarKind::Other(String::new())
        }
    }
}

impl From<RawSchema> for SchemaNode {
    fn from(raw: RawSchema) -> Self {
        let description = raw.description.clone().filter(|d| !d.is_empty());
        let shape = classify(raw);
        SchemaNode { description, shape }
    }
}

fn classify(raw: RawSchema) -> Shape {
    let literals: Vec<Value> = raw.enum_.iter().map(canonical_value).collect();
    match raw.type_.as_deref().filter(|t| !t.is_empty()) {
        Some("object") => Shape::Object(ObjectShape {
            properties: raw.properties.into_iter()
                .map(|(k, v)| (k, SchemaNode::from(v)))
                .collect(),
            additional: match raw.additional_properties {
                Some(RawAdditional::Schema(s)) => Some(Box::new(SchemaNode::from(*s))),
                Some(RawAdditional::Allowed(_)) | None => None,
            },
            preserve_unknown: raw.preserve_unknown_fields,
        }),
        Some("array") => Shape::Array {
            items: raw.items.map(|items| Box::new(SchemaNode::from(*items))),
        },
        Some(ty) => {
            let kind = ScalarKind::parse(ty);
            if literals.is_empty() {
                Shape::Scalar { kind, format: raw.format }
            } else {
                Shape::Enum { kind, format: raw.format, literals }
            }
        }
        None => match raw.ref_ {
            Some(pointer) => Shape::Ref { pointer },
            None if raw.int_or_string => Shape::IntOrString,
            None if !literals.is_empty() => Shape::Enum {
                kind: ScalarKind::of_literals(&literals),
                format: raw.format,
                literals,
            },
            None => Shape::Untyped,
        },
    }
}

/// Rebuild a value with every object's keys in sorted order.
pub fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            Value::Object(sorted.into_iter()
                .map(|(k, v)| (k.clone(), canonical_value(v)))
                .collect())
        }
        Value::Array(xs) => Value::Array(xs.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ACCESSORS
// ————————————————————————————————————————————————————————————————————————————

impl SchemaNode {
    pub fn as_object(&self) -> Option<&ObjectShape> {
        match &self.shape {
            Shape::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Scalar kind and format for both plain scalars and enums.
    pub fn scalar(&self) -> Option<(&ScalarKind, Option<&str>)> {
        match &self.shape {
            Shape::Scalar { kind, format } | Shape::Enum { kind, format, .. } => {
                Some((kind, format.as_deref()))
            }
            _ => None,
        }
    }

    pub fn literals(&self) -> &[Value] {
        match &self.shape {
            Shape::Enum { literals, .. } => literals,
            _ => &[],
        }
    }
}

impl ObjectShape {
    pub fn has_properties(&self) -> bool {
        !self.properties.is_empty()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
