//! CRD document loading.
//!
//! Reads YAML (or JSON) bytes that may hold several documents, keeps the
//! `CustomResourceDefinition`s among them and turns each into a
//! [`ResourceDefinition`]: identity plus its versions, in declaration order,
//! with classified schema trees.
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{CompileError, InputError, SchemaError};
use crate::ir::ResourceDescriptor;
use crate::path_de::from_yaml_with_path;
use crate::schema::{RawSchema, SchemaNode};

const CRD_KIND: &str = "CustomResourceDefinition";

// ————————————————————————————————————————————————————————————————————————————
// DOCUMENT SHAPE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Deserialize)]
struct CrdDocument {
    spec: CrdSpec,
}

#[derive(Debug, Deserialize)]
struct CrdSpec {
    group: String,
    names: CrdNames,
    #[serde(default)]
    versions: Vec<CrdVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrdNames {
    kind: String,
    plural: String,
    list_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrdVersion {
    name: String,
    #[serde(default)]
    served: bool,
    #[serde(default)]
    storage: bool,
    schema: Option<CrdValidation>,
}

#[derive(Debug, Deserialize)]
struct CrdValidation {
    #[serde(rename = "openAPIV3Schema")]
    open_api_v3_schema: Option<RawSchema>,
}

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDefinition {
    pub kind: String,
    pub plural: String,
    pub list_kind: String,
    pub group: String,
    pub versions: IndexMap<String, VersionDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionDef {
    pub name: String,
    pub served: bool,
    pub storage: bool,
    pub schema: Option<SchemaNode>,
}

impl ResourceDefinition {
    /// A definition with a single served storage version.
    pub fn new(kind: &str, plural: &str, group: &str, version: &str, schema: SchemaNode) -> Self {
        let mut versions = IndexMap::new();
        versions.insert(version.to_string(), VersionDef {
            name: version.to_string(),
            served: true,
            storage: true,
            schema: Some(schema),
        });
        ResourceDefinition {
            kind: kind.to_string(),
            plural: plural.to_string(),
            list_kind: format!("{kind}List"),
            group: group.to_string(),
            versions,
        }
    }

    pub fn storage_version(&self) -> Option<&VersionDef> {
        self.versions.values().find(|v| v.storage)
    }

    /// First version flagged as storage that also matches `desired` (when
    /// given), together with its schema.
    pub fn select_version(&self, desired: Option<&str>) -> Result<(&VersionDef, &SchemaNode), SchemaError> {
        let version = self.versions.values()
            .find(|v| v.storage && desired.is_none_or(|d| d == v.name))
            .ok_or_else(|| SchemaError::NoMatchingVersion {
                kind: self.kind.clone(),
                desired: desired.map(str::to_string),
            })?;
        let schema = version.schema.as_ref().ok_or_else(|| SchemaError::MissingSchema {
            kind: self.kind.clone(),
            version: version.name.clone(),
        })?;
        if !version.served {
            tracing::warn!(kind = %self.kind, version = %version.name, "storage version is not served");
        }
        Ok((version, schema))
    }

    pub fn descriptor(&self, version: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            kind: self.kind.clone(),
            plural: self.plural.clone(),
            list_kind: self.list_kind.clone(),
            group: self.group.clone(),
            version: version.to_string(),
        }
    }
}

impl From<CrdDocument> for ResourceDefinition {
    fn from(doc: CrdDocument) -> Self {
        let CrdSpec { group, names, versions } = doc.spec;
        let list_kind = names.list_kind
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| format!("{}List", names.kind));
        let versions = versions.into_iter()
            .map(|v| {
                let schema = v.schema
                    .and_then(|s| s.open_api_v3_schema)
                    .map(SchemaNode::from);
                (v.name.clone(), VersionDef { name: v.name, served: v.served, storage: v.storage, schema })
            })
            .collect();
        ResourceDefinition { kind: names.kind, plural: names.plural, list_kind, group, versions }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LOADING
// ————————————————————————————————————————————————————————————————————————————

/// Parse every CRD in `bytes`. Documents of other kinds are skipped; a
/// source without any CRD is an error.
pub fn parse_documents(bytes: &[u8], source_name: &str) -> Result<Vec<ResourceDefinition>, SchemaError> {
    let malformed = |path: String, message: String| SchemaError::Malformed {
        source_name: source_name.to_string(),
        path,
        message,
    };

    let mut out = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_slice(bytes).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| malformed(format!("document {index}"), e.to_string()))?;
        let kind = value.get("kind").and_then(serde_yaml::Value::as_str);
        if kind != Some(CRD_KIND) {
            tracing::debug!(source = source_name, index, ?kind, "skipping non-CRD document");
            continue;
        }
        let doc: CrdDocument = from_yaml_with_path(value)
            .map_err(|e| malformed(format!("document {index}: {}", e.path), e.message))?;
        out.push(ResourceDefinition::from(doc));
    }

    if out.is_empty() {
        return Err(SchemaError::NoDefinition(source_name.to_string()));
    }
    Ok(out)
}

pub fn load_file(path: &Path) -> Result<Vec<ResourceDefinition>, CompileError> {
    let bytes = std::fs::read(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let definitions = parse_documents(&bytes, &path.to_string_lossy())?;
    tracing::debug!(path = %path.display(), count = definitions.len(), "loaded CRDs");
    Ok(definitions)
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_VERSIONS: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  group: example.com
  names:
    kind: Widget
    plural: widgets
  scope: Namespaced
  versions:
    - name: v1beta1
      served: true
      storage: false
      schema:
        openAPIV3Schema:
          type: object
    - name: v1
      served: true
      storage: true
      schema:
        openAPIV3Schema:
          type: object
          properties:
            spec:
              type: object
              properties:
                replicas:
                  type: integer
                  format: int32
"#;

    #[test]
    fn parses_identity_and_versions_in_order() {
        let defs = parse_documents(TWO_VERSIONS.as_bytes(), "widgets.yaml").unwrap();
        assert_eq!(defs.len(), 1);
        let d = &defs[0];
        assert_eq!(d.kind, "Widget");
        assert_eq!(d.list_kind, "WidgetList");
        assert_eq!(d.group, "example.com");
        assert_eq!(d.versions.keys().collect::<Vec<_>>(), ["v1beta1", "v1"]);
    }

    #[test]
    fn selects_storage_version() {
        let d = parse_documents(TWO_VERSIONS.as_bytes(), "widgets.yaml").unwrap().remove(0);
        assert_eq!(d.select_version(None).unwrap().0.name, "v1");
        assert_eq!(d.select_version(Some("v1")).unwrap().0.name, "v1");
        // served but not storage
        let err = d.select_version(Some("v1beta1")).unwrap_err();
        assert_eq!(err, SchemaError::NoMatchingVersion { kind: "Widget".into(), desired: Some("v1beta1".into()) });
    }

    #[test]
    fn unserved_storage_version_is_still_selected() {
        let src = TWO_VERSIONS.replace("served: true\n      storage: true", "served: false\n      storage: true");
        assert_ne!(src, TWO_VERSIONS);
        let d = parse_documents(src.as_bytes(), "widgets.yaml").unwrap().remove(0);
        let (version, _) = d.select_version(None).unwrap();
        assert_eq!(version.name, "v1");
        assert!(!version.served);
        assert!(d.versions["v1beta1"].served);
    }

    #[test]
    fn skips_other_documents() {
        let src = format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n---\n{TWO_VERSIONS}");
        let defs = parse_documents(src.as_bytes(), "mixed.yaml").unwrap();
        assert_eq!(defs.len(), 1);
    }

    #[test]
    fn rejects_sources_without_crds() {
        let err = parse_documents(b"foo: bar\n", "a.yaml").unwrap_err();
        assert_eq!(err, SchemaError::NoDefinition("a.yaml".into()));
    }

    #[test]
    fn reports_path_of_malformed_fields() {
        let src = "kind: CustomResourceDefinition\nspec:\n  group: g\n  names:\n    kind: [1]\n    plural: p\n";
        match parse_documents(src.as_bytes(), "bad.yaml").unwrap_err() {
            SchemaError::Malformed { path, .. } => assert!(path.contains("spec.names.kind"), "{path}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn accepts_json_documents() {
        let src = r#"{"kind": "CustomResourceDefinition", "spec": {"group": "g", "names": {"kind": "A", "plural": "as", "listKind": "AList"},
            "versions": [{"name": "v1", "storage": true, "schema": {"openAPIV3Schema": {"type": "object"}}}]}}"#;
        let d = parse_documents(src.as_bytes(), "a.json").unwrap().remove(0);
        assert!(d.select_version(None).is_ok());
    }
}
