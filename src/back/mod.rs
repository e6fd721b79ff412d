//! Back end: ordered schemas in, C++ artifacts out.

pub mod format_chooser;
pub mod renderer;
pub mod templates;
pub mod translator;
pub mod types;

pub use format_chooser::propagate_only_json;
pub use renderer::{Artifact, RenderedFile, Renderer, RendererConfig};
pub use templates::{CppTemplates, RenderContext, Template, Templates};
pub use translator::{Generator, GeneratorConfig};
pub use types::{CppName, CppType, CppTypeKind, CppTypes, TypeId};
