//! Runs every CRD fixture through load → compile → render and prints a
//! summary. Pass a directory to use fixtures other than `testdata/`.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use crd_typegen::{codegen, compile_batch, load_file, CompileOptions};

struct Summary {
    kinds: usize,
    structs: usize,
    enums: usize,
    files: usize,
}

fn run_fixture(path: &Path, pointer: bool) -> Result<Summary> {
    let definitions = load_file(path)?;
    let options = CompileOptions { version: None, pointer };
    let batch = compile_batch(&definitions, &options)?;
    let files = codegen::render_batch(&batch);
    Ok(Summary {
        kinds: batch.resources.len(),
        structs: batch.resources.iter().map(|m| m.structs.len()).sum(),
        enums: batch.resources.iter().map(|m| m.enums.len()).sum(),
        files: files.len(),
    })
}

fn main() -> Result<()> {
    let fixtures = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("testdata"));
    let pattern = fixtures.join("*.yaml");
    let pattern = pattern.to_str().context("fixture path is not valid UTF-8")?;

    let mut passed = 0;
    let mut failed = 0;
    for entry in glob::glob(pattern)? {
        let path = entry?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        for pointer in [false, true] {
            let label = if pointer { format!("{name} (pointer)") } else { name.clone() };
            match run_fixture(&path, pointer) {
                Ok(s) => {
                    passed += 1;
                    println!(
                        "{} {label}: {} kinds, {} structs, {} enums, {} files",
                        "ok".green().bold(),
                        s.kinds,
                        s.structs,
                        s.enums,
                        s.files,
                    );
                }
                Err(error) => {
                    failed += 1;
                    println!("{} {label}: {error:#}", "failed".red().bold());
                }
            }
        }
    }

    let summary = format!("{passed} passed, {failed} failed");
    if failed == 0 {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
    Ok(())
}
