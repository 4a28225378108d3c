//! Deterministic naming and structural deduplication.
//!
//! A [`NamingRegistry`] lives for one compile batch. It maps content
//! [`Signature`]s to the name first assigned to them and keeps the set of
//! names already handed out, so identical shapes collapse to one type and
//! distinct shapes never share a name.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schema::SchemaNode;

const ENUM_WILDCARD: &str = "*";
const ENUM_WILDCARD_SUFFIX: &str = "All";
const ENUM_EMPTY_SUFFIX: &str = "EmptyValue";

// ————————————————————————————————————————————————————————————————————————————
// CASING
// ————————————————————————————————————————————————————————————————————————————

/// Split on anything that is not a letter or digit and upper-case the first
/// character of every word. The rest of each word keeps its casing, so
/// `lastTransitionTime` becomes `LastTransitionTime` and `api-server_url`
/// becomes `ApiServerUrl`.
pub fn to_camel_case(s: &str) -> String {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Suffix of an enum constant for one literal.
pub fn enum_constant_suffix(literal: &Value) -> String {
    let cleaned = match literal {
        Value::String(s) => s.clone(),
        other => other.to_string().replace('"', ""),
    };
    match cleaned.as_str() {
        ENUM_WILDCARD => ENUM_WILDCARD_SUFFIX.to_string(),
        "" => ENUM_EMPTY_SUFFIX.to_string(),
        _ => to_camel_case(&cleaned),
    }
}

/// Rust module a resource kind is rendered into.
pub fn module_name(kind: &str) -> String {
    format!("types_{}", kind.to_lowercase())
}

/// PascalCased last segment of a `$ref` pointer.
pub fn ref_type_name(pointer: &str) -> String {
    to_camel_case(pointer.rsplit('/').next().unwrap_or(pointer))
}

// ————————————————————————————————————————————————————————————————————————————
// SIGNATURES
// ————————————————————————————————————————————————————————————————————————————

/// SHA-256 over a canonical serialization of a schema fragment.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 32]);

impl Signature {
    /// Signature of an object's property set. Properties are a `BTreeMap`,
    /// so the serialization is in sorted key order by construction.
    pub fn of_properties<'a, I>(properties: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a SchemaNode)>,
    {
        #[derive(Serialize)]
        struct Prop<'a> {
            key: &'a str,
            schema: &'a SchemaNode,
        }
        let mut props: Vec<Prop<'_>> = properties.into_iter()
            .map(|(key, schema)| Prop { key, schema })
            .collect();
        props.sort_by(|a, b| a.key.cmp(&b.key));
        Self::digest("struct", &props)
    }

    /// Signature of an enum's literal set, independent of literal order.
    /// The scalar type is not part of it: a later enum with the same
    /// literals reuses the first one's name and base type.
    pub fn of_literals(literals: &[Value]) -> Self {
        let set: BTreeSet<String> = literals.iter()
            .map(|v| crate::schema::canonical_value(v).to_string())
            .collect();
        Self::digest("enum", &set)
    }

    fn digest<T: Serialize + ?Sized>(tag: &str, value: &T) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        hasher.update([0u8]);
        // Serializing plain structs, strings and `serde_json::Value`s cannot fail.
        let bytes = serde_json::to_vec(value).unwrap_or_default();
        hasher.update(&bytes);
        Signature(hasher.finalize().into())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CANDIDATES
// ————————————————————————————————————————————————————————————————————————————

/// Where a type is being named: the field, the resource kind and the raw
/// keys leading to the field's parent (the kind first).
#[derive(Debug, Clone)]
pub struct NameCandidates<'a> {
    pub field_name: &'a str,
    pub kind: &'a str,
    pub path: &'a [String],
    /// The bare field name is only offered when the parent is not the root.
    pub allow_bare: bool,
}

impl NameCandidates<'_> {
    /// Candidates in precedence order, excluding the hash fallback.
    pub fn ordered(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.path.len() + 2);
        if self.allow_bare {
            out.push(self.field_name.to_string());
        }
        out.push(format!("{}{}", self.kind, self.field_name));
        let mut prefix = String::new();
        for segment in self.path.iter().rev() {
            prefix = to_camel_case(segment) + &prefix;
            out.push(format!("{prefix}{}", self.field_name));
        }
        out
    }

    /// `FieldName_<digest>`; the digest covers the full path, which is
    /// unique per field.
    pub fn fallback(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.path.join(".").as_bytes());
        hasher.update(b".");
        hasher.update(self.field_name.as_bytes());
        let digest = hasher.finalize();
        format!("{}_{}", self.field_name, hex::encode(&digest[..16]))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRY
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Default)]
pub struct NamingRegistry {
    by_signature: HashMap<Signature, String>,
    reserved: HashSet<String>,
}

impl NamingRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Reserve a name outright. Returns `false` if it was already taken.
    pub fn reserve(&mut self, name: &str) -> bool {
        self.reserved.insert(name.to_string())
    }

    /// Return the name memoized for `signature`, or assign the first free
    /// candidate. The flag is `true` when the name was assigned by this call.
    pub fn get_or_assign(&mut self, signature: Signature, candidates: &NameCandidates<'_>) -> (String, bool) {
        if let Some(name) = self.by_signature.get(&signature) {
            return (name.clone(), false);
        }
        let name = self.first_free(candidates);
        self.by_signature.insert(signature, name.clone());
        (name, true)
    }

    fn first_free(&mut self, candidates: &NameCandidates<'_>) -> String {
        for name in candidates.ordered() {
            if !name.is_empty() && self.reserved.insert(name.clone()) {
                return name;
            }
        }
        let fallback = candidates.fallback();
        let mut name = fallback.clone();
        let mut n = 2;
        while !self.reserved.insert(name.clone()) {
            name = format!("{fallback}{n}");
            n += 1;
        }
        name
    }

    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn camel_case_preserves_inner_casing() {
        assert_eq!(to_camel_case("lastTransitionTime"), "LastTransitionTime");
        assert_eq!(to_camel_case("api-server_url"), "ApiServerUrl");
        assert_eq!(to_camel_case("x509"), "X509");
        assert_eq!(to_camel_case("--"), "");
        assert_eq!(to_camel_case("DNSNames"), "DNSNames");
    }

    #[test]
    fn enum_suffixes_for_reserved_literals() {
        assert_eq!(enum_constant_suffix(&json!("*")), "All");
        assert_eq!(enum_constant_suffix(&json!("")), "EmptyValue");
        assert_eq!(enum_constant_suffix(&json!("in-progress")), "InProgress");
        assert_eq!(enum_constant_suffix(&json!(42)), "42");
    }

    #[test]
    fn ref_names_use_last_segment() {
        assert_eq!(ref_type_name("#/definitions/io.k8s.api.core.v1.pod-spec"), "IoK8sApiCoreV1PodSpec");
        assert_eq!(ref_type_name("#/definitions/podSpec"), "PodSpec");
    }

    #[test]
    fn module_names_fold_case() {
        assert_eq!(module_name("FooBar"), "types_foobar");
        assert_eq!(module_name("FooBar"), module_name("Foobar"));
    }

    #[test]
    fn candidate_precedence() {
        // Mirrors the sequence of names one field receives when every
        // earlier candidate is already taken.
        let mut reg = NamingRegistry::new();
        let mut assign = |field: &str, allow_bare: bool, p: &[&str], seed: u8| {
            let p = path(p);
            let c = NameCandidates { field_name: field, kind: "TestCase", path: &p, allow_bare };
            reg.get_or_assign(Signature([seed; 32]), &c).0
        };
        assert_eq!(assign("Spec", false, &["TestCase"], 1), "TestCaseSpec");
        assert_eq!(assign("Status", false, &["TestCase"], 2), "TestCaseStatus");
        assert_eq!(assign("Foo", true, &["TestCase", "spec"], 3), "Foo");
        assert_eq!(assign("Foo", true, &["TestCase", "status"], 4), "TestCaseFoo");
        assert_eq!(assign("Foo", true, &["TestCase", "spec", "bar"], 5), "BarFoo");
        assert_eq!(assign("Foo", true, &["TestCase", "status", "bar"], 6), "StatusBarFoo");
        assert_eq!(assign("Foo", true, &["TestCase", "status", "bar"], 7), "TestCaseStatusBarFoo");
        let last = assign("Foo", true, &["TestCase", "status", "bar"], 8);
        assert!(last.starts_with("Foo_"), "{last}");
        assert_eq!(last.len(), "Foo_".len() + 32);
    }

    #[test]
    fn same_signature_is_a_pure_lookup() {
        let mut reg = NamingRegistry::new();
        let p = path(&["Widget", "spec"]);
        let c = NameCandidates { field_name: "Template", kind: "Widget", path: &p, allow_bare: true };
        let sig = Signature([9; 32]);
        assert_eq!(reg.get_or_assign(sig, &c), ("Template".to_string(), true));
        assert_eq!(reg.get_or_assign(sig, &c), ("Template".to_string(), false));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn reserved_names_are_skipped() {
        let mut reg = NamingRegistry::new();
        assert!(reg.reserve("Widget"));
        assert!(!reg.reserve("Widget"));
        let p = path(&["Widget", "spec"]);
        let c = NameCandidates { field_name: "Widget", kind: "Widget", path: &p, allow_bare: true };
        assert_eq!(reg.get_or_assign(Signature([1; 32]), &c).0, "WidgetWidget");
    }

    #[test]
    fn literal_signature_ignores_order() {
        let a = Signature::of_literals(&[json!("a"), json!("b")]);
        let b = Signature::of_literals(&[json!("b"), json!("a")]);
        let c = Signature::of_literals(&[json!("a"), json!("c")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
