//! Schema tree → type model.
//!
//! Walks a [`SchemaNode`] in sorted key order and produces the root struct,
//! the nested structs and the enums of one resource. Naming and structural
//! dedup go through a [`NamingRegistry`] that is shared by every resource of
//! a batch, so the order resources are lowered in decides who gets the short
//! names; [`compile_batch`] keeps that order fixed to the caller's.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use crate::crd::ResourceDefinition;
use crate::error::{CompileError, ConsistencyError, ConsistencyField, SchemaError};
use crate::ir::{
    CompiledBatch, EnumConst, EnumDef, External, FieldDef, ResourceDescriptor, StructDef, TypeModel,
    TypeRef,
};
use crate::naming::{enum_constant_suffix, module_name, ref_type_name, to_camel_case, NameCandidates, NamingRegistry, Signature};
use crate::schema::{ObjectShape, ScalarKind, SchemaNode, Shape};

/// Top-level keys of the resource schema that become root fields.
const ROOT_KEYS: [&str; 2] = ["spec", "status"];

/// Names generated modules import or use unqualified, besides the externals.
const IMPORTED_IDENTS: [&str; 6] = ["BTreeMap", "Serialize", "Deserialize", "String", "Vec", "Option"];

const CONDITION_STATUS: [&str; 3] = ["True", "False", "Unknown"];
const CONDITION_KEYS: [&str; 6] = ["type", "status", "reason", "message", "lastTransitionTime", "observedGeneration"];

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Pin every resource to this storage version.
    pub version: Option<String>,
    /// Rewrite nested field types to their optional form.
    pub pointer: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// ENTRY POINTS
// ————————————————————————————————————————————————————————————————————————————

/// Select the version of one definition and lower its schema.
pub fn compile_resource(
    registry: &mut NamingRegistry,
    definition: &ResourceDefinition,
    desired_version: Option<&str>,
) -> Result<TypeModel, SchemaError> {
    let (version, schema) = definition.select_version(desired_version)?;
    Ok(lower_schema(registry, schema, definition.descriptor(&version.name)))
}

/// Compile resources in the given order with one shared registry. All of
/// them must share one API group and one version.
pub fn compile_batch(definitions: &[ResourceDefinition], options: &CompileOptions) -> Result<CompiledBatch, CompileError> {
    let mut registry = NamingRegistry::new();
    // root and list names are claimed before any nested type is named
    for name in definitions.iter().map(|d| &d.kind).chain(definitions.iter().map(|d| &d.list_kind)) {
        if !registry.reserve(name) {
            return Err(ConsistencyError::DuplicateKind { kind: name.clone() }.into());
        }
    }
    let mut modules: HashMap<String, &str> = HashMap::new();
    for definition in definitions {
        let module = module_name(&definition.kind);
        if let Some(first_kind) = modules.insert(module.clone(), &definition.kind) {
            return Err(ConsistencyError::ModuleClash {
                first_kind: first_kind.to_string(),
                second_kind: definition.kind.clone(),
                module,
            }.into());
        }
    }
    reserve_imported_idents(&mut registry);

    let pinned = options.version.as_deref();
    let mut first: Option<ResourceDescriptor> = None;
    let mut resources: Vec<TypeModel> = Vec::with_capacity(definitions.len());

    for definition in definitions {
        let (version, schema) = match definition.select_version(pinned) {
            Ok(selected) => selected,
            Err(err @ SchemaError::NoMatchingVersion { .. }) => {
                // a later resource stored at another version than the batch
                return match (&first, definition.storage_version()) {
                    (Some(first), Some(storage)) => {
                        Err(mismatch(ConsistencyField::Version, first, &first.version, definition, &storage.name).into())
                    }
                    _ => Err(err.into()),
                };
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(first) = &first {
            if first.group != definition.group {
                return Err(mismatch(ConsistencyField::Group, first, &first.group, definition, &definition.group).into());
            }
            if first.version != version.name {
                return Err(mismatch(ConsistencyField::Version, first, &first.version, definition, &version.name).into());
            }
        }

        let mut model = lower_schema(&mut registry, schema, definition.descriptor(&version.name));
        if options.pointer {
            crate::pointer::pointerize(&mut model);
        }
        first.get_or_insert_with(|| model.descriptor.clone());
        resources.push(model);
    }

    let batch = CompiledBatch {
        group: first.as_ref().map(|d| d.group.clone()).unwrap_or_default(),
        version: first.map(|d| d.version).unwrap_or_default(),
        resources,
    };
    for name in batch.dangling_refs() {
        warn!(name, "$ref target is not generated by this batch");
    }
    debug!(group = batch.group, version = batch.version, resources = batch.resources.len(), "compiled batch");
    Ok(batch)
}

fn reserve_imported_idents(registry: &mut NamingRegistry) {
    for name in External::ALL.iter().map(External::ident).chain(IMPORTED_IDENTS) {
        registry.reserve(name);
    }
}

fn mismatch(
    field: ConsistencyField,
    first: &ResourceDescriptor,
    first_value: &str,
    second: &ResourceDefinition,
    second_value: &str,
) -> ConsistencyError {
    ConsistencyError::Mismatch {
        field,
        first_kind: first.kind.clone(),
        first_value: first_value.to_string(),
        second_kind: second.kind.clone(),
        second_value: second_value.to_string(),
    }
}

/// Lower an already selected schema. The kind, the list kind and the
/// identifiers generated code imports are reserved in `registry` if nobody
/// holds them yet.
pub fn lower_schema(registry: &mut NamingRegistry, schema: &SchemaNode, descriptor: ResourceDescriptor) -> TypeModel {
    let _span = tracing::debug_span!("lower", kind = %descriptor.kind).entered();
    registry.reserve(&descriptor.kind);
    registry.reserve(&descriptor.list_kind);
    reserve_imported_idents(registry);

    let kind = descriptor.kind.clone();
    let root = StructDef {
        name: kind.clone(),
        path: String::new(),
        fields: Vec::new(),
        description: struct_description(&kind, &kind, schema),
        is_root: true,
    };
    let mut lowering = Lowering {
        registry,
        kind,
        model: TypeModel {
            descriptor,
            root,
            structs: BTreeMap::new(),
            enums: BTreeMap::new(),
            imports: BTreeSet::new(),
            refs: BTreeSet::new(),
        },
    };
    lowering.lower_root(schema);
    let mut model = lowering.model;
    model.imports = collect_imports(&model);
    model
}

// ————————————————————————————————————————————————————————————————————————————
// RECURSION
// ————————————————————————————————————————————————————————————————————————————

struct Lowering<'r> {
    registry: &'r mut NamingRegistry,
    kind: String,
    model: TypeModel,
}

/// Naming context of the node being lowered.
struct Site<'a> {
    /// Raw keys from the kind down to the parent struct.
    path: &'a [String],
    key: &'a str,
    field_name: &'a str,
    parent_is_root: bool,
}

/// A lowered node plus the enum it resolves to, if any.
struct Lowered {
    ty: TypeRef,
    enum_ref: Option<String>,
}

impl From<TypeRef> for Lowered {
    fn from(ty: TypeRef) -> Self {
        Lowered { ty, enum_ref: None }
    }
}

impl Lowering<'_> {
    fn lower_root(&mut self, schema: &SchemaNode) {
        let Some(obj) = schema.as_object() else {
            warn!(kind = self.kind, "root schema is not an object; root struct has no fields");
            return;
        };
        let path = vec![self.kind.clone()];
        let mut fields = Vec::new();
        for (key, prop) in &obj.properties {
            if !ROOT_KEYS.contains(&key.as_str()) {
                debug!(key, "skipping top-level property");
                continue;
            }
            fields.push(self.lower_field(&path, key, prop, true));
        }
        sort_fields(&mut fields);
        self.model.root.fields = fields;
    }

    fn lower_field(&mut self, path: &[String], key: &str, prop: &SchemaNode, parent_is_root: bool) -> FieldDef {
        let field_name = to_camel_case(key);
        let site = Site { path, key, field_name: &field_name, parent_is_root };
        let Lowered { ty, enum_ref } = self.lower_node(prop, &site);
        FieldDef {
            name: field_name.clone(),
            json_key: key.to_string(),
            ty,
            description: prop.description.clone(),
            enum_ref,
        }
    }

    fn lower_node(&mut self, node: &SchemaNode, site: &Site<'_>) -> Lowered {
        match &node.shape {
            Shape::Scalar { kind, format } => scalar_type(kind, format.as_deref()).into(),
            Shape::Enum { kind, format, literals } => {
                let name = self.lower_enum(kind, format.as_deref(), literals, site);
                Lowered { ty: TypeRef::Named(name.clone()), enum_ref: Some(name) }
            }
            Shape::Object(obj) => self.lower_object(obj, node, site),
            Shape::Array { items: Some(items) } => {
                let item = self.lower_node(items, site);
                Lowered { ty: TypeRef::seq(item.ty), enum_ref: item.enum_ref }
            }
            Shape::Array { items: None } => TypeRef::seq(TypeRef::Any).into(),
            Shape::Ref { pointer } => {
                let name = ref_type_name(pointer);
                self.model.refs.insert(name.clone());
                TypeRef::Named(name).into()
            }
            Shape::IntOrString => TypeRef::External(External::IntOrString).into(),
            Shape::Untyped => TypeRef::External(External::Json).into(),
        }
    }

    fn lower_object(&mut self, obj: &ObjectShape, node: &SchemaNode, site: &Site<'_>) -> Lowered {
        if is_condition(obj) {
            debug!(key = site.key, "condition shape");
            return TypeRef::External(External::Condition).into();
        }
        if obj.has_properties() {
            return TypeRef::Named(self.lower_struct(obj, node, site)).into();
        }
        if let Some(additional) = &obj.additional {
            let value = self.lower_node(additional, site);
            return Lowered { ty: TypeRef::map(value.ty), enum_ref: value.enum_ref };
        }
        if site.key == "metadata" {
            return TypeRef::External(External::ObjectMeta).into();
        }
        if obj.preserve_unknown {
            return TypeRef::External(External::RawExtension).into();
        }
        TypeRef::map(TypeRef::Any).into()
    }

    fn lower_struct(&mut self, obj: &ObjectShape, node: &SchemaNode, site: &Site<'_>) -> String {
        let signature = Signature::of_properties(&obj.properties);
        let candidates = NameCandidates {
            field_name: site.field_name,
            kind: &self.kind,
            path: site.path,
            allow_bare: !site.parent_is_root,
        };
        let (name, fresh) = self.registry.get_or_assign(signature, &candidates);
        if !fresh {
            debug!(key = site.key, name, "reusing structurally identical struct");
            return name;
        }
        debug!(key = site.key, name, "synthesizing struct");

        let mut path = site.path.to_vec();
        path.push(site.key.to_string());
        let mut fields: Vec<FieldDef> = obj.properties.iter()
            .map(|(key, prop)| self.lower_field(&path, key, prop, false))
            .collect();
        sort_fields(&mut fields);

        let def = StructDef {
            name: name.clone(),
            path: path[1..].join("."),
            fields,
            description: struct_description(&name, &path.join("."), node),
            is_root: false,
        };
        self.model.structs.insert(name.clone(), def);
        name
    }

    fn lower_enum(&mut self, kind: &ScalarKind, format: Option<&str>, literals: &[Value], site: &Site<'_>) -> String {
        let signature = Signature::of_literals(literals);
        let candidates = NameCandidates {
            field_name: site.field_name,
            kind: &self.kind,
            path: site.path,
            allow_bare: true,
        };
        let (name, fresh) = self.registry.get_or_assign(signature, &candidates);
        if !fresh {
            debug!(key = site.key, name, "reusing enum with identical literals");
            return name;
        }
        debug!(key = site.key, name, "synthesizing enum");

        let def = EnumDef {
            name: name.clone(),
            base: scalar_type(kind, format),
            description: format!("{name} enumerates the values of {}.{}", site.path.join("."), site.key),
            constants: enum_constants(&name, literals),
        };
        self.model.enums.insert(name.clone(), def);
        name
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Type table keyed by (kind, format).
pub fn scalar_type(kind: &ScalarKind, format: Option<&str>) -> TypeRef {
    match (kind, format) {
        (ScalarKind::String, Some("date-time")) => TypeRef::External(External::Time),
        (ScalarKind::String, Some("byte" | "binary")) => TypeRef::External(External::ByteString),
        (ScalarKind::String, _) => TypeRef::Str,
        (ScalarKind::Integer | ScalarKind::Number, Some("int32")) => TypeRef::I32,
        (ScalarKind::Integer | ScalarKind::Number, Some("int64")) => TypeRef::I64,
        (ScalarKind::Integer | ScalarKind::Number, Some("float")) => TypeRef::F32,
        (ScalarKind::Integer | ScalarKind::Number, Some("double")) => TypeRef::F64,
        (ScalarKind::Integer, _) => TypeRef::I64,
        (ScalarKind::Number, _) => TypeRef::F64,
        (ScalarKind::Boolean, _) => TypeRef::Bool,
        (ScalarKind::Other(_), _) => TypeRef::Any,
    }
}

/// The conventional status condition: five string fields, `status` limited
/// to True/False/Unknown, `lastTransitionTime` a timestamp. The only extra
/// key accepted is `observedGeneration`, which the shared type carries too.
fn is_condition(obj: &ObjectShape) -> bool {
    let string_prop = |key: &str, want_format: Option<&str>| {
        obj.properties.get(key)
            .and_then(SchemaNode::scalar)
            .is_some_and(|(kind, format)| {
                *kind == ScalarKind::String && (want_format.is_none() || format == want_format)
            })
    };
    let status_literals_ok = obj.properties.get("status").is_some_and(|status| {
        let literals = status.literals();
        literals.len() == CONDITION_STATUS.len()
            && CONDITION_STATUS.iter().all(|want| literals.iter().any(|l| l.as_str() == Some(*want)))
    });

    string_prop("type", None)
        && string_prop("status", None)
        && string_prop("reason", None)
        && string_prop("message", None)
        && string_prop("lastTransitionTime", Some("date-time"))
        && status_literals_ok
        && obj.properties.keys().all(|k| CONDITION_KEYS.contains(&k.as_str()))
}

/// `EnumName + PascalCase(literal)` per literal. `null` literals are dropped
/// and colliding names get a numeric suffix.
fn enum_constants(enum_name: &str, literals: &[Value]) -> Vec<EnumConst> {
    let mut seen_values = HashSet::new();
    let mut taken = HashSet::new();
    let mut out = Vec::new();
    for literal in literals.iter().filter(|v| !v.is_null()) {
        if !seen_values.insert(literal.to_string()) {
            continue;
        }
        let mut suffix = enum_constant_suffix(literal);
        if suffix.is_empty() {
            suffix = "Value".to_string();
        }
        let base = format!("{enum_name}{suffix}");
        let mut name = base.clone();
        let mut n = 2;
        while !taken.insert(name.clone()) {
            name = format!("{base}{n}");
            n += 1;
        }
        out.push(EnumConst { name, value: literal.clone() });
    }
    out
}

fn struct_description(name: &str, path: &str, node: &SchemaNode) -> String {
    node.description.clone().unwrap_or_else(|| format!("{name} represents a {path}"))
}

fn sort_fields(fields: &mut [FieldDef]) {
    fields.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.json_key.cmp(&b.json_key)));
}

fn collect_imports(model: &TypeModel) -> BTreeSet<External> {
    let mut out = BTreeSet::from([External::ObjectMeta, External::ListMeta]);
    let fields = std::iter::once(&model.root)
        .chain(model.structs.values())
        .flat_map(|s| s.fields.iter());
    for field in fields {
        field.ty.externals(&mut out);
    }
    for e in model.enums.values() {
        e.base.externals(&mut out);
    }
    out
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
