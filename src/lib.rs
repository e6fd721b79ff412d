//! Chaotic
//!
//! Generates typed C++ declarations, parsers and serializers from JSON Schema
//! documents extended with `x-usrv-cpp-*` annotations.
//!
//! ## Pipeline
//!
//! ```text
//! documents ─▶ front::parser ─▶ front::ref_resolver ─▶ back::translator
//!                                                            │
//!            artifacts ◀─ back::renderer ◀─ back::format_chooser
//! ```
//!
//! Every source document yields four artifacts: `include/<doc>_fwd.hpp`,
//! `include/<doc>.hpp`, `include/<doc>_parsers.ipp` and `src/<doc>.cpp`.

pub mod back;
pub mod config;
pub mod error;
pub mod front;
pub mod name_map;
pub mod orchestrator;

pub use back::{CppTypes, Generator, GeneratorConfig, Renderer, RendererConfig};
pub use config::ChaoticConfig;
pub use error::{Diagnostic, DiagnosticKind, Error, Result, SourceLocation};
pub use front::{ParsedSchemas, ResolvedSchemas, Schema, SchemaParser};
pub use name_map::{NameMap, NameMapItem};
pub use orchestrator::{run, Options, RunStats};
