//! Compile CustomResourceDefinition schemas into a deduplicated type model
//! and render that model as Rust source.
//!
//! The pipeline is `crd` (load) → `lower` (compile, with naming and dedup
//! from `naming`) → optional `pointer` pass → `codegen` (render).
pub mod codegen;
pub mod crd;
pub mod error;
pub mod ir;
pub mod lower;
pub mod naming;
pub mod pointer;
pub mod schema;
mod path_de;

pub use crd::{load_file, parse_documents, ResourceDefinition, VersionDef};
pub use error::{CompileError, ConsistencyError, ConsistencyField, InputError, SchemaError};
pub use ir::{CompiledBatch, TypeModel, TypeRef};
pub use lower::{compile_batch, compile_resource, CompileOptions};
pub use naming::NamingRegistry;
