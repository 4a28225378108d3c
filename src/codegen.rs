//! Type model → Rust source.
//!
//! One file per resource (`types_<kind>.rs`), one `group_version_info.rs`
//! and a `mod.rs` that re-exports both, all under `<version>/`. Every struct
//! derives serde and maps each field back to its source key.
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ir::{CompiledBatch, EnumDef, FieldDef, StructDef, TypeModel, TypeRef};
use crate::naming;

const HEADER: &str = "// Code generated by crd-typegen. DO NOT EDIT.";
const STRUCT_DERIVES: &str = "#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]";
const ENUM_DERIVES: &str = "#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]";
const GROUP_VERSION_MODULE: &str = "group_version_info";

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "abstract", "become", "box", "do", "final", "gen", "macro", "override", "priv", "try", "typeof",
    "unsized", "virtual", "yield",
];
/// Keywords that cannot be raw identifiers.
const NON_RAW_KEYWORDS: &[&str] = &["crate", "self", "super", "Self"];

static ACRONYM_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("static regex"));
static WORD_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));
static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex"));

// ————————————————————————————————————————————————————————————————————————————
// OUTPUT PLAN
// ————————————————————————————————————————————————————————————————————————————

/// A rendered file, relative to the output target.
#[derive(Debug, Clone, PartialEq)]
pub struct OutFile {
    pub path: PathBuf,
    pub contents: String,
}

pub fn module_name(model: &TypeModel) -> String {
    naming::module_name(&model.descriptor.kind)
}

/// Render every file of a batch.
pub fn render_batch(batch: &CompiledBatch) -> Vec<OutFile> {
    let dir = PathBuf::from(&batch.version);
    let mut files: Vec<OutFile> = batch.resources.iter()
        .map(|model| {
            let mut cg = Codegen::new();
            cg.emit_resource(model);
            OutFile { path: dir.join(format!("{}.rs", module_name(model))), contents: cg.into_string() }
        })
        .collect();

    let mut cg = Codegen::new();
    cg.emit_group_version_info(batch);
    files.push(OutFile { path: dir.join(format!("{GROUP_VERSION_MODULE}.rs")), contents: cg.into_string() });

    let mut cg = Codegen::new();
    cg.emit_mod(batch);
    files.push(OutFile { path: dir.join("mod.rs"), contents: cg.into_string() });
    files
}

// ————————————————————————————————————————————————————————————————————————————
// WRITER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Default)]
pub struct Codegen {
    out: String,
}

impl Codegen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn line(&mut self, indent: usize, text: impl AsRef<str>) {
        for _ in 0..indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn doc(&mut self, indent: usize, text: &str) {
        for line in text.trim().lines() {
            let line = line.trim_end();
            if line.is_empty() {
                self.line(indent, "///");
            } else {
                self.line(indent, format!("/// {line}"));
            }
        }
    }

    pub fn emit_resource(&mut self, model: &TypeModel) {
        self.line(0, HEADER);
        self.blank();
        self.emit_imports(model);
        self.emit_root(model);
        self.emit_list(model);
        for def in model.nested_structs() {
            self.emit_struct(def);
        }
        for def in model.enums.values() {
            self.emit_enum(def);
        }
    }

    fn emit_imports(&mut self, model: &TypeModel) {
        let mut types: Vec<&TypeRef> = struct_fields(model).map(|f| &f.ty).collect();
        types.extend(model.enums.values().map(|e| &e.base));

        if types.iter().any(|t| has_mapping(t)) {
            self.line(0, "use std::collections::BTreeMap;");
            self.blank();
        }
        let mut paths: Vec<&str> = model.imports.iter().map(|e| e.path()).collect();
        paths.sort_unstable();
        for path in paths {
            self.line(0, format!("use {path};"));
        }
        self.line(0, "use serde::{Deserialize, Serialize};");

        // types deduplicated into other resources' files
        let defined: HashSet<&str> = model.defined_names().collect();
        let mut named = BTreeSet::new();
        for ty in &types {
            named_types(ty, &mut named);
        }
        if named.iter().any(|n| !defined.contains(n)) {
            self.blank();
            self.line(0, "use super::*;");
        }
        self.blank();
    }

    fn emit_root(&mut self, model: &TypeModel) {
        let d = &model.descriptor;
        let root = &model.root;
        self.doc(0, &root.description);
        self.line(0, STRUCT_DERIVES);
        self.line(0, format!("pub struct {} {{", root.name));
        self.line(1, "#[serde(rename = \"apiVersion\", default)]");
        self.line(1, "pub api_version: String,");
        self.line(1, "#[serde(default)]");
        self.line(1, "pub kind: String,");
        self.line(1, "#[serde(default)]");
        self.line(1, "pub metadata: ObjectMeta,");
        let mut idents = FieldIdents::with_taken(["api_version", "kind", "metadata"]);
        for field in &root.fields {
            self.emit_field(field, &mut idents);
        }
        self.line(0, "}");
        self.blank();

        self.line(0, format!("impl {} {{", root.name));
        self.line(1, format!("pub const KIND: &'static str = {:?};", d.kind));
        self.line(1, format!("pub const PLURAL: &'static str = {:?};", d.plural));
        self.line(1, format!("pub const API_VERSION: &'static str = {:?};", d.api_version()));
        self.line(0, "}");
        self.blank();
    }

    fn emit_list(&mut self, model: &TypeModel) {
        let d = &model.descriptor;
        self.doc(0, &format!("{} is a list of {}.", d.list_kind, d.kind));
        self.line(0, STRUCT_DERIVES);
        self.line(0, format!("pub struct {} {{", d.list_kind));
        self.line(1, "#[serde(rename = \"apiVersion\", default)]");
        self.line(1, "pub api_version: String,");
        self.line(1, "#[serde(default)]");
        self.line(1, "pub kind: String,");
        self.line(1, "#[serde(default)]");
        self.line(1, "pub metadata: ListMeta,");
        self.line(1, format!("pub items: Vec<{}>,", d.kind));
        self.line(0, "}");
        self.blank();
    }

    pub fn emit_struct(&mut self, def: &StructDef) {
        self.doc(0, &def.description);
        self.line(0, STRUCT_DERIVES);
        self.line(0, format!("pub struct {} {{", def.name));
        let mut idents = FieldIdents::default();
        for field in &def.fields {
            self.emit_field(field, &mut idents);
        }
        self.line(0, "}");
        self.blank();
    }

    fn emit_field(&mut self, field: &FieldDef, idents: &mut FieldIdents) {
        let ident = idents.claim(&field.json_key);
        if let Some(description) = &field.description {
            self.doc(1, description);
        }
        let mut attrs = Vec::new();
        if ident.trim_start_matches("r#") != field.json_key {
            attrs.push(format!("rename = {:?}", field.json_key));
        }
        attrs.push("default".to_string());
        if let Some(check) = skip_check(&field.ty) {
            attrs.push(format!("skip_serializing_if = {check:?}"));
        }
        self.line(1, format!("#[serde({})]", attrs.join(", ")));
        self.line(1, format!("pub {ident}: {},", rust_type(&field.ty)));
    }

    pub fn emit_enum(&mut self, def: &EnumDef) {
        self.doc(0, &def.description);
        let all_strings = !def.constants.is_empty() && def.constants.iter().all(|c| c.value.is_string());
        if all_strings {
            self.emit_string_enum(def);
        } else {
            self.emit_const_enum(def);
        }
    }

    fn emit_string_enum(&mut self, def: &EnumDef) {
        self.line(0, ENUM_DERIVES);
        self.line(0, format!("pub enum {} {{", def.name));
        let mut taken = HashSet::new();
        for (i, constant) in def.constants.iter().enumerate() {
            let mut variant = variant_name(&def.name, &constant.name);
            if !taken.insert(variant.clone()) {
                variant = constant.name.clone();
                taken.insert(variant.clone());
            }
            if i == 0 {
                self.line(1, "#[default]");
            }
            self.line(1, format!("#[serde(rename = {:?})]", constant.value.as_str().unwrap_or_default()));
            self.line(1, format!("{variant},"));
        }
        self.line(0, "}");
        self.blank();
    }

    fn emit_const_enum(&mut self, def: &EnumDef) {
        self.line(0, format!("pub type {} = {};", def.name, rust_type(&def.base)));
        for constant in &def.constants {
            match const_literal(&def.base, &constant.value) {
                Some(literal) => self.line(0, format!(
                    "pub const {}: {} = {literal};",
                    to_snake_case(&constant.name).to_uppercase(),
                    def.name,
                )),
                None => self.line(0, format!("// {}: {}", constant.name, constant.value)),
            }
        }
        self.blank();
    }

    pub fn emit_group_version_info(&mut self, batch: &CompiledBatch) {
        let api_version = match batch.resources.first() {
            Some(model) => model.descriptor.api_version(),
            None => batch.version.clone(),
        };
        self.line(0, HEADER);
        self.blank();
        self.line(0, "/// API group of every resource in this module.");
        self.line(0, format!("pub const GROUP: &str = {:?};", batch.group));
        self.line(0, format!("pub const VERSION: &str = {:?};", batch.version));
        self.line(0, format!("pub const API_VERSION: &str = {api_version:?};"));
        self.blank();
        self.line(0, "/// `(kind, plural)` of every resource in this module.");
        self.line(0, "pub const KINDS: &[(&str, &str)] = &[");
        for model in &batch.resources {
            self.line(1, format!("({:?}, {:?}),", model.descriptor.kind, model.descriptor.plural));
        }
        self.line(0, "];");
    }

    pub fn emit_mod(&mut self, batch: &CompiledBatch) {
        let mut modules: Vec<String> = batch.resources.iter().map(module_name).collect();
        modules.push(GROUP_VERSION_MODULE.to_string());
        modules.sort();
        self.line(0, HEADER);
        self.blank();
        for m in &modules {
            self.line(0, format!("pub mod {m};"));
        }
        self.blank();
        for m in &modules {
            self.line(0, format!("pub use {m}::*;"));
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IDENTIFIERS
// ————————————————————————————————————————————————————————————————————————————

pub fn to_snake_case(s: &str) -> String {
    let s = ACRONYM_BOUNDARY.replace_all(s, "${1}_${2}");
    let s = WORD_BOUNDARY.replace_all(&s, "${1}_${2}");
    let s = NON_IDENT.replace_all(&s, "_");
    s.trim_matches('_').to_lowercase()
}

/// A valid Rust field identifier for a source key.
pub fn field_ident(key: &str) -> String {
    let snake = to_snake_case(key);
    if snake.is_empty() {
        return "field".to_string();
    }
    if snake.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("_{snake}");
    }
    if NON_RAW_KEYWORDS.contains(&snake.as_str()) {
        return format!("{snake}_");
    }
    if KEYWORDS.contains(&snake.as_str()) {
        return format!("r#{snake}");
    }
    snake
}

/// Distinct field identifiers within one struct.
#[derive(Default)]
struct FieldIdents {
    taken: HashSet<String>,
}

impl FieldIdents {
    fn with_taken<const N: usize>(names: [&str; N]) -> Self {
        FieldIdents { taken: names.iter().map(|n| n.to_string()).collect() }
    }

    fn claim(&mut self, key: &str) -> String {
        let base = field_ident(key);
        let mut ident = base.clone();
        let mut n = 2;
        while !self.taken.insert(ident.clone()) {
            ident = format!("{}_{n}", base.trim_start_matches("r#"));
            n += 1;
        }
        ident
    }
}

/// Variant of a string enum: the constant name without the enum prefix,
/// unless that leaves something unusable.
fn variant_name(enum_name: &str, constant: &str) -> String {
    let stripped = constant.strip_prefix(enum_name).unwrap_or(constant);
    let usable = stripped.starts_with(|c: char| c.is_ascii_alphabetic())
        && !NON_RAW_KEYWORDS.contains(&stripped);
    if usable { stripped.to_string() } else { constant.to_string() }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

pub fn rust_type(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Str => "String".to_string(),
        TypeRef::I32 => "i32".to_string(),
        TypeRef::I64 => "i64".to_string(),
        TypeRef::F32 => "f32".to_string(),
        TypeRef::F64 => "f64".to_string(),
        TypeRef::Bool => "bool".to_string(),
        TypeRef::Any => "serde_json::Value".to_string(),
        TypeRef::External(e) => e.ident().to_string(),
        TypeRef::Named(name) => name.clone(),
        TypeRef::Sequence(inner) => format!("Vec<{}>", rust_type(inner)),
        TypeRef::Mapping(inner) => format!("BTreeMap<String, {}>", rust_type(inner)),
        TypeRef::Optional(inner) => format!("Option<{}>", rust_type(inner)),
    }
}

fn skip_check(ty: &TypeRef) -> Option<&'static str> {
    match ty {
        TypeRef::Optional(_) => Some("Option::is_none"),
        TypeRef::Sequence(_) => Some("Vec::is_empty"),
        TypeRef::Mapping(_) => Some("BTreeMap::is_empty"),
        _ => None,
    }
}

fn has_mapping(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::Mapping(_) => true,
        TypeRef::Sequence(inner) | TypeRef::Optional(inner) => has_mapping(inner),
        _ => false,
    }
}

fn named_types<'a>(ty: &'a TypeRef, out: &mut BTreeSet<&'a str>) {
    match ty {
        TypeRef::Named(name) => { out.insert(name.as_str()); }
        TypeRef::Sequence(inner) | TypeRef::Mapping(inner) | TypeRef::Optional(inner) => named_types(inner, out),
        _ => {}
    }
}

fn struct_fields(model: &TypeModel) -> impl Iterator<Item = &FieldDef> {
    std::iter::once(&model.root)
        .chain(model.structs.values())
        .flat_map(|s| s.fields.iter())
}

/// Rust literal for a constant of a non-string enum.
fn const_literal(base: &TypeRef, value: &Value) -> Option<String> {
    match (base, value) {
        (TypeRef::I32 | TypeRef::I64, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        (TypeRef::F32 | TypeRef::F64, Value::Number(n)) => {
            let s = n.to_string();
            if s.contains(['.', 'e', 'E']) { Some(s) } else { Some(format!("{s}.0")) }
        }
        (TypeRef::Bool, Value::Bool(b)) => Some(b.to_string()),
        (TypeRef::Str, Value::String(s)) => Some(format!("{s:?}")),
        _ => None,
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
