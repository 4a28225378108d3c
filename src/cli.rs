//! CLI: CRDs → (rust | model)
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use tracing::info;

use crd_typegen::{codegen, compile_batch, load_file, CompileOptions, CompiledBatch, InputError, ResourceDefinition};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile CustomResourceDefinition schemas into Rust types or a JSON type model
#[derive(Parser, Debug)]
#[command(name = "crd-typegen")]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile and write one Rust module per version
    Rust(RustOut),
    /// compile and print the type model as JSON
    Model(ModelOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more CRD files. May be literal paths or quoted glob patterns
    #[arg(long, num_args = 1.., required = true)]
    crd: Vec<String>,

    /// generate types for this storage version (each CRD's storage version if omitted)
    #[arg(long)]
    version: Option<String>,

    /// make every field of nested structs optional
    #[arg(long, default_value_t = false)]
    pointer: bool,
}

#[derive(clap::Parser, Debug)]
struct RustOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output directory; files land in <target>/<version>/
    #[arg(short, long)]
    target: PathBuf,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct ModelOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn options(&self) -> CompileOptions {
        CompileOptions { version: self.version.clone(), pointer: self.pointer }
    }

    /// Files are parsed in parallel; definitions keep the order of the inputs.
    fn load(&self) -> Result<Vec<ResourceDefinition>> {
        let source_paths = resolve_file_path_patterns(&self.crd)
            .context("failed to resolve CRD paths")?;
        let loaded = source_paths.par_iter()
            .map(|path| load_file(path).with_context(|| format!("failed to load {}", path.display())))
            .collect::<Result<Vec<_>>>()?;
        Ok(loaded.into_iter().flatten().collect())
    }

    fn compile(&self) -> Result<CompiledBatch> {
        let definitions = self.load()?;
        info!(count = definitions.len(), "loaded CRDs");
        compile_batch(&definitions, &self.options()).context("failed to compile CRDs")
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Rust(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(())
                }
                let batch = target.input_settings.compile()?;
                for file in codegen::render_batch(&batch) {
                    let path = target.target.join(&file.path);
                    write_file(&path, &file.contents)?;
                    info!(path = %path.display(), "wrote");
                }
            }
            Command::Model(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(())
                }
                let batch = target.input_settings.compile()?;
                let model_src = serde_json::to_string_pretty(&batch)
                    .context("failed to serialize type model")?;
                match target.out.as_ref() {
                    Some(out) => {
                        write_file(out, &model_src)?;
                        info!(path = %out.display(), "wrote");
                    }
                    None => println!("{model_src}"),
                }
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>, InputError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let entries = glob::glob(pattern).map_err(|source| InputError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
            let before = out.len();
            for entry in entries {
                out.push(entry?);
            }
            if out.len() == before {
                // explicitly a glob but matched nothing
                return Err(InputError::NoMatch(pattern.to_string()));
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
