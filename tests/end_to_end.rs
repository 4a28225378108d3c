use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crd_typegen::codegen::render_batch;
use crd_typegen::ir::External;
use crd_typegen::{compile_batch, load_file, CompileError, CompileOptions, CompiledBatch, ConsistencyError, SchemaError, TypeRef};

fn testdata(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
}

fn compile(files: &[&str], options: &CompileOptions) -> Result<CompiledBatch, CompileError> {
    let mut definitions = Vec::new();
    for file in files {
        definitions.extend(load_file(&testdata(file))?);
    }
    compile_batch(&definitions, options)
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_crd-typegen"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to spawn crd-typegen")
}

fn field_type(batch: &CompiledBatch, kind: &str, owner: &str, key: &str) -> TypeRef {
    let model = batch.model(kind).unwrap();
    let def = if owner == kind { &model.root } else { &model.structs[owner] };
    def.fields.iter().find(|f| f.json_key == key).unwrap().ty.clone()
}

// ————————————————————————————————————————————————————————————————————————————
// LIBRARY
// ————————————————————————————————————————————————————————————————————————————

#[test]
fn same_group_resources_share_types() {
    let batch = compile(&["widgets.example.com.yaml", "gadgets.example.com.yaml"], &CompileOptions::default()).unwrap();
    assert_eq!((batch.group.as_str(), batch.version.as_str()), ("example.com", "v1"));

    let widget = batch.model("Widget").unwrap();
    let keys: Vec<_> = widget.root.fields.iter().map(|f| f.json_key.as_str()).collect();
    assert_eq!(keys, ["spec", "status"]);
    assert_eq!(field_type(&batch, "Widget", "WidgetSpec", "replicas"), TypeRef::I32);
    assert_eq!(field_type(&batch, "Widget", "Template", "metadata"), TypeRef::External(External::ObjectMeta));
    assert_eq!(
        field_type(&batch, "Widget", "WidgetStatus", "conditions"),
        TypeRef::seq(TypeRef::External(External::Condition)),
    );
    assert_eq!(
        field_type(&batch, "Gadget", "GadgetStatus", "conditions"),
        TypeRef::seq(TypeRef::External(External::Condition)),
    );

    // defined by the widget, reused by the gadget
    let gadget = batch.model("Gadget").unwrap();
    assert_eq!(field_type(&batch, "Gadget", "GadgetSpec", "selector"), TypeRef::Named("Selector".into()));
    assert_eq!(field_type(&batch, "Gadget", "GadgetSpec", "mode"), TypeRef::Named("Policy".into()));
    assert!(!gadget.structs.contains_key("Selector"));
    assert!(!gadget.enums.contains_key("Policy"));

    let constants: Vec<_> = widget.enums["Policy"].constants.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(constants, ["PolicyAll", "PolicyEmptyValue", "PolicySame"]);
}

#[test]
fn every_shape_maps_to_its_type() {
    let batch = compile(&["all-cases.example.com.yaml"], &CompileOptions::default()).unwrap();
    let spec = |key: &str| field_type(&batch, "AllCase", "AllCaseSpec", key);
    assert_eq!(spec("str"), TypeRef::Str);
    assert_eq!(spec("dateTime"), TypeRef::External(External::Time));
    assert_eq!(spec("bytes"), TypeRef::External(External::ByteString));
    assert_eq!(spec("int32"), TypeRef::I32);
    assert_eq!(spec("int64"), TypeRef::I64);
    assert_eq!(spec("float"), TypeRef::F32);
    assert_eq!(spec("double"), TypeRef::F64);
    assert_eq!(spec("bool"), TypeRef::Bool);
    assert_eq!(spec("intOrString"), TypeRef::External(External::IntOrString));
    assert_eq!(spec("anything"), TypeRef::External(External::Json));
    assert_eq!(spec("raw"), TypeRef::External(External::RawExtension));
    assert_eq!(spec("labels"), TypeRef::map(TypeRef::Str));
    assert_eq!(spec("free"), TypeRef::map(TypeRef::Any));
    assert_eq!(spec("list"), TypeRef::seq(TypeRef::I32));
    assert_eq!(spec("untypedList"), TypeRef::seq(TypeRef::Any));
    assert_eq!(spec("level"), TypeRef::Named("Level".into()));
    assert_eq!(spec("phase"), TypeRef::Named("Phase".into()));
    assert_eq!(spec("nested"), TypeRef::Named("Nested".into()));
    assert_eq!(spec("other"), TypeRef::Named("Other".into()));
    assert_eq!(field_type(&batch, "AllCase", "Nested", "config"), TypeRef::Named("Config".into()));
    assert_eq!(field_type(&batch, "AllCase", "Other", "config"), TypeRef::Named("AllCaseConfig".into()));
    // status.phase carries the same literal set as spec.phase
    assert_eq!(field_type(&batch, "AllCase", "AllCaseStatus", "phase"), TypeRef::Named("Phase".into()));
    assert_eq!(
        batch.dangling_refs().into_iter().collect::<Vec<_>>(),
        ["IoK8sApiCoreV1PodSpec"],
    );
}

#[test]
fn group_mismatch_fails_the_batch() {
    let err = compile(&["widgets.example.com.yaml", "tenants.other.io.yaml"], &CompileOptions::default()).unwrap_err();
    match err {
        CompileError::Consistency(ConsistencyError::Mismatch { first_kind, second_kind, .. }) => {
            assert_eq!((first_kind.as_str(), second_kind.as_str()), ("Widget", "Tenant"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn non_storage_version_is_rejected() {
    let options = CompileOptions { version: Some("v1beta1".into()), pointer: false };
    let err = compile(&["widgets.example.com.yaml"], &options).unwrap_err();
    assert!(matches!(err, CompileError::Schema(SchemaError::NoMatchingVersion { .. })), "{err}");
}

#[test]
fn file_without_crd_is_rejected() {
    let err = compile(&["a.yaml"], &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Schema(SchemaError::NoDefinition(_))), "{err}");
}

#[test]
fn rendering_is_stable() {
    let files = ["widgets.example.com.yaml", "gadgets.example.com.yaml", "all-cases.example.com.yaml"];
    let one = render_batch(&compile(&files, &CompileOptions::default()).unwrap());
    let two = render_batch(&compile(&files, &CompileOptions::default()).unwrap());
    assert_eq!(one, two);
}

// ————————————————————————————————————————————————————————————————————————————
// CLI
// ————————————————————————————————————————————————————————————————————————————

#[test]
fn cli_writes_one_module_per_version() {
    let target = tempfile::tempdir().unwrap();
    let widgets = testdata("widgets.example.com.yaml");
    let gadgets = testdata("gadgets.example.com.yaml");
    let output = run_cli(&[
        "rust",
        "--crd", widgets.to_str().unwrap(), gadgets.to_str().unwrap(),
        "--target", target.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let read = |p: &str| std::fs::read_to_string(target.path().join(p)).unwrap();
    let widget = read("v1/types_widget.rs");
    assert!(widget.contains("pub struct Widget {"));
    assert!(widget.contains("pub spec: WidgetSpec,"));
    assert!(widget.contains("pub struct WidgetList {"));
    assert!(widget.contains("pub conditions: Vec<Condition>,"));
    assert!(widget.contains("pub struct Selector {"));

    let gadget = read("v1/types_gadget.rs");
    assert!(gadget.contains("use super::*;"));
    assert!(gadget.contains("pub quota: i32,"));

    let info = read("v1/group_version_info.rs");
    assert!(info.contains("pub const GROUP: &str = \"example.com\";"));
    assert!(info.contains("(\"Gadget\", \"gadgets\"),"));
    assert!(read("v1/mod.rs").contains("pub use types_widget::*;"));
}

#[test]
fn cli_pointer_flag_makes_nested_fields_optional() {
    let target = tempfile::tempdir().unwrap();
    let gadgets = testdata("gadgets.example.com.yaml");
    let output = run_cli(&["rust", "--crd", gadgets.to_str().unwrap(), "--target", target.path().to_str().unwrap(), "--pointer"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let gadget = std::fs::read_to_string(target.path().join("v1/types_gadget.rs")).unwrap();
    assert!(gadget.contains("pub quota: Option<i32>,"), "{gadget}");
    assert!(gadget.contains("pub spec: GadgetSpec,"));
}

#[test]
fn cli_accepts_globs() {
    let target = tempfile::tempdir().unwrap();
    let pattern = testdata("*.example.com.yaml").to_string_lossy().into_owned();
    let output = run_cli(&["rust", "--crd", &pattern, "--target", target.path().to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    for file in ["types_allcase.rs", "types_gadget.rs", "types_widget.rs", "group_version_info.rs", "mod.rs"] {
        assert!(target.path().join("v1").join(file).exists(), "missing {file}");
    }
}

#[test]
fn cli_reports_failures() {
    let target = tempfile::tempdir().unwrap();
    let target = target.path().to_str().unwrap();
    let widgets = testdata("widgets.example.com.yaml");
    let tenants = testdata("tenants.other.io.yaml");
    let invalid = testdata("a.yaml");

    let cases: [(Vec<&str>, &str); 4] = [
        (vec!["rust", "--target", target], "--crd"),
        (vec!["rust", "--crd", widgets.to_str().unwrap(), tenants.to_str().unwrap(), "--target", target], "not all CRDs have the same group"),
        (vec!["rust", "--crd", widgets.to_str().unwrap(), "--version", "v1beta1", "--target", target], "could not find storage version"),
        (vec!["rust", "--crd", invalid.to_str().unwrap(), "--target", target], "no CustomResourceDefinition found"),
    ];
    for (args, message) in cases {
        let output = run_cli(&args);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(!output.status.success(), "{args:?} succeeded");
        assert!(stderr.contains(message), "{args:?}: {stderr}");
    }
}

#[test]
fn cli_dumps_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("model.json");
    let widgets = testdata("widgets.example.com.yaml");
    let output = run_cli(&["model", "--crd", widgets.to_str().unwrap(), "--out", out.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let model: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(model["group"], "example.com");
    assert_eq!(model["resources"][0]["descriptor"]["kind"], "Widget");
    assert_eq!(model["resources"][0]["descriptor"]["listKind"], "WidgetList");
}
