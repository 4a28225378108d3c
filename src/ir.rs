// Strongly-typed IR for codegen. No schema nodes or serde_json::Value types here
// (enum literals aside).
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

/// Target type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", content = "of", rename_all = "camelCase")]
pub enum TypeRef {
    Str,
    I32,
    I64,
    F32,
    F64,
    Bool,
    /// Opaque value for anything the type table does not recognize.
    Any,
    External(External),
    /// A generated struct or enum, or a `$ref` target.
    Named(String),
    Sequence(Box<TypeRef>),
    /// String-keyed mapping.
    Mapping(Box<TypeRef>),
    Optional(Box<TypeRef>),
}

/// Types provided by `k8s-openapi`, imported by generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum External {
    Time,
    ByteString,
    Condition,
    ObjectMeta,
    ListMeta,
    IntOrString,
    RawExtension,
    /// Untyped schema node (`apiextensions/v1.JSON`).
    Json,
}

impl External {
    pub const ALL: [External; 8] = [
        External::Time,
        External::ByteString,
        External::Condition,
        External::ObjectMeta,
        External::ListMeta,
        External::IntOrString,
        External::RawExtension,
        External::Json,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            External::Time => "k8s_openapi::apimachinery::pkg::apis::meta::v1::Time",
            External::ByteString => "k8s_openapi::ByteString",
            External::Condition => "k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition",
            External::ObjectMeta => "k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta",
            External::ListMeta => "k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta",
            External::IntOrString => "k8s_openapi::apimachinery::pkg::util::intstr::IntOrString",
            External::RawExtension => "k8s_openapi::apimachinery::pkg::runtime::RawExtension",
            External::Json => "k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::JSON",
        }
    }

    /// Identifier the type is referred to by once imported.
    pub fn ident(&self) -> &'static str {
        self.path().rsplit("::").next().unwrap_or_default()
    }
}

impl TypeRef {
    pub fn seq(inner: TypeRef) -> Self { TypeRef::Sequence(Box::new(inner)) }
    pub fn map(inner: TypeRef) -> Self { TypeRef::Mapping(Box::new(inner)) }
    pub fn opt(inner: TypeRef) -> Self { TypeRef::Optional(Box::new(inner)) }

    /// Every external type mentioned anywhere in this reference.
    pub fn externals(&self, out: &mut BTreeSet<External>) {
        match self {
            TypeRef::External(e) => { out.insert(*e); }
            TypeRef::Sequence(t) | TypeRef::Mapping(t) | TypeRef::Optional(t) => t.externals(out),
            _ => {}
        }
    }
}

/// Identity of the compiled resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub kind: String,
    pub plural: String,
    pub list_kind: String,
    pub group: String,
    pub version: String,
}

impl ResourceDescriptor {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,        // PascalCase identifier; fields sort by it
    pub json_key: String,    // source key
    pub ty: TypeRef,
    pub description: Option<String>,
    pub enum_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructDef {
    pub name: String,
    pub path: String,        // dotted source keys below the root, empty for the root
    pub fields: Vec<FieldDef>,
    pub description: String,
    pub is_root: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumDef {
    pub name: String,
    pub base: TypeRef,
    pub description: String,
    pub constants: Vec<EnumConst>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumConst {
    pub name: String,
    pub value: Value,
}

/// Everything compiled for one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeModel {
    pub descriptor: ResourceDescriptor,
    pub root: StructDef,
    pub structs: BTreeMap<String, StructDef>,
    pub enums: BTreeMap<String, EnumDef>,
    pub imports: BTreeSet<External>,
    /// Names produced by `$ref` resolution. Not checked against the batch.
    pub refs: BTreeSet<String>,
}

impl TypeModel {
    /// Names of every type this model defines (root included).
    pub fn defined_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.root.name.as_str())
            .chain(self.structs.keys().map(String::as_str))
            .chain(self.enums.keys().map(String::as_str))
    }

    /// Non-root structs, sorted by name.
    pub fn nested_structs(&self) -> impl Iterator<Item = &StructDef> {
        self.structs.values()
    }
}

/// Output of one multi-resource compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledBatch {
    pub group: String,
    pub version: String,
    pub resources: Vec<TypeModel>,
}

impl CompiledBatch {
    /// `$ref` targets that no resource of the batch defines.
    pub fn dangling_refs(&self) -> BTreeSet<String> {
        let defined: BTreeSet<&str> = self.resources.iter()
            .flat_map(TypeModel::defined_names)
            .collect();
        self.resources.iter()
            .flat_map(|m| m.refs.iter())
            .filter(|r| !defined.contains(r.as_str()))
            .cloned()
            .collect()
    }

    pub fn model(&self, kind: &str) -> Option<&TypeModel> {
        self.resources.iter().find(|m| m.descriptor.kind == kind)
    }
}
