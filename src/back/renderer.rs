//! Renderer
//!
//! Groups the translated types by the document they came from and renders
//! the four artifacts of each document through a [`Templates`] engine.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::{Diagnostic, DiagnosticKind, Error, Result};

use super::templates::{CppTemplates, RenderContext, Template, Templates};
use super::types::{io_include_path, CppName, CppTypeKind, CppTypes, RefTarget, TypeId};

/// Renderer settings
#[derive(Debug, Clone, Default)]
pub struct RendererConfig {
    /// Emit YAML and YAML-config parsers for types that allow them
    pub parse_extra_formats: bool,
    pub generate_serializers: bool,
    /// Formatter binary run over every artifact
    pub clang_format: Option<PathBuf>,
    pub runtime: RuntimeConfig,
}

/// One rendered artifact, `path` relative to the output directory
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub content: String,
}

/// All artifacts of one source document
#[derive(Debug, Clone)]
pub struct RenderedFile {
    pub rel_path: String,
    pub artifacts: Vec<Artifact>,
}

/// Document path without its extension
pub fn strip_extension(vfilepath: &str) -> String {
    for extension in [".yaml", ".yml", ".json"] {
        if let Some(stripped) = vfilepath.strip_suffix(extension) {
            return stripped.to_string();
        }
    }
    vfilepath.to_string()
}

pub struct Renderer {
    config: RendererConfig,
    templates: Box<dyn Templates>,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self::with_templates(config, Box::new(CppTemplates))
    }

    pub fn with_templates(config: RendererConfig, templates: Box<dyn Templates>) -> Self {
        Self { config, templates }
    }

    /// Render every document that owns at least one type
    pub fn render(&self, types: &CppTypes) -> Result<Vec<RenderedFile>> {
        let groups = group_by_document(types)?;
        let mut rendered = Vec::with_capacity(groups.len());

        for (rel_path, group) in groups {
            let context = RenderContext {
                includes: document_includes(types, &group, &rel_path),
                user_includes: user_includes(types, &group, &self.config.runtime),
                rel_path: rel_path.clone(),
                types,
                group,
                parse_extra_formats: self.config.parse_extra_formats,
                generate_serializers: self.config.generate_serializers,
                runtime: &self.config.runtime,
            };

            let mut artifacts = Vec::with_capacity(Template::ALL.len());
            for template in Template::ALL {
                let mut content = self.templates.render(template, &context)?;
                let path = Path::new(template.subdir())
                    .join(format!("{}{}", rel_path, template.suffix()));
                if let Some(binary) = &self.config.clang_format {
                    content = run_formatter(binary, &path, &content)?;
                }
                artifacts.push(Artifact { path, content });
            }
            debug!("Rendered {} ({} types)", rel_path, context.group.len());
            rendered.push(RenderedFile { rel_path, artifacts });
        }

        info!("Rendered {} documents", rendered.len());
        Ok(rendered)
    }
}

/// Top-level types per document, documents in order of first appearance.
/// Two documents that differ only by extension would share artifacts.
fn group_by_document(types: &CppTypes) -> Result<IndexMap<String, Vec<(CppName, TypeId)>>> {
    let mut groups: IndexMap<String, Vec<(CppName, TypeId)>> = IndexMap::new();
    let mut owners: HashMap<String, &str> = HashMap::new();
    for (name, id) in &types.types {
        let vfilepath = types.get(*id).source.filepath.as_str();
        let rel_path = strip_extension(vfilepath);
        let owner = *owners.entry(rel_path.clone()).or_insert(vfilepath);
        if owner != vfilepath {
            let message = format!("{owner} and {vfilepath} both render as {rel_path}");
            let kind = DiagnosticKind::DuplicatePath(message);
            return Err(Diagnostic::at(vfilepath, "", kind).into());
        }
        groups
            .entry(rel_path)
            .or_default()
            .push((CppName::from_full(name), *id));
    }
    Ok(groups)
}

/// Documents the group refers to, sorted, without the group's own one
fn document_includes(types: &CppTypes, group: &[(CppName, TypeId)], rel_path: &str) -> Vec<String> {
    let mut includes = BTreeSet::new();
    for (_, top) in group {
        for id in types.subtree(*top) {
            let CppTypeKind::Ref { target: Some(target), .. } = &types.get(id).kind else {
                continue;
            };
            let filepath = match target {
                RefTarget::Local(target) => &types.get(*target).source.filepath,
                RefTarget::External(external) => &external.source.filepath,
            };
            let document = strip_extension(filepath);
            if document != rel_path {
                includes.insert(document);
            }
        }
    }
    includes.into_iter().collect()
}

/// Headers of `x-usrv-cpp-type` overrides; runtime wrappers need none
fn user_includes(
    types: &CppTypes,
    group: &[(CppName, TypeId)],
    runtime: &RuntimeConfig,
) -> Vec<String> {
    let mut includes = BTreeSet::new();
    for (_, top) in group {
        for id in types.subtree(*top) {
            let Some(user) = &types.get(id).user_cpp_type else {
                continue;
            };
            if user.starts_with(&runtime.strong_typedef)
                || user.starts_with(&runtime.default_dict)
            {
                continue;
            }
            includes.insert(io_include_path(user, runtime));
        }
    }
    includes.into_iter().collect()
}

/// Pipe `content` through a clang-format compatible binary
pub fn run_formatter(binary: &Path, artifact: &Path, content: &str) -> Result<String> {
    let formatter_error = |reason: String| Error::Formatter {
        binary: binary.to_path_buf(),
        reason,
    };

    let mut child = Command::new(binary)
        .arg(format!("--assume-filename={}", artifact.display()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| formatter_error(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(content.as_bytes())
            .map_err(|e| formatter_error(e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| formatter_error(e.to_string()))?;
    if !output.status.success() {
        return Err(formatter_error(String::from_utf8_lossy(&output.stderr).into_owned()));
    }
    String::from_utf8(output.stdout).map_err(|e| formatter_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::translator::{Generator, GeneratorConfig};
    use crate::front::{
        parser::ParserConfig, ref_resolver::sort_schemas, ParsedSchemas, SchemaParser,
    };
    use crate::name_map::NameMap;
    use serde_json::{json, Value};

    fn generate(files: &[(&str, &[(&str, Value)])]) -> CppTypes {
        let mut parts = Vec::new();
        for (file, defs) in files {
            let mut parser = SchemaParser::new(ParserConfig::default(), *file, *file);
            for (name, value) in defs.iter() {
                parser.parse_schema(&format!("/definitions/{name}"), value).unwrap();
            }
            parts.push(parser.into_parsed_schemas());
        }
        let parsed = ParsedSchemas::merge(parts).unwrap();
        let resolved = sort_schemas(parsed, None).unwrap();
        let mut namespaces = IndexMap::new();
        for (file, _) in files {
            namespaces.insert(file.to_string(), "ns".to_string());
        }
        Generator::new(GeneratorConfig {
            namespaces,
            infile_to_name: NameMap::from_rules(&["/definitions/([^/]*)={0}"]).unwrap(),
            ..Default::default()
        })
        .generate_types(&resolved, None)
        .unwrap()
    }

    fn artifact<'a>(file: &'a RenderedFile, suffix: &str) -> &'a str {
        file.artifacts
            .iter()
            .find(|a| a.path.to_string_lossy().ends_with(suffix))
            .map(|a| a.content.as_str())
            .unwrap()
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("dir/a.yaml"), "dir/a");
        assert_eq!(strip_extension("b.json"), "b");
        assert_eq!(strip_extension("c"), "c");
    }

    #[test]
    fn test_four_artifacts_per_document() {
        let types = generate(&[(
            "schemas/a.yaml",
            &[("T", json!({"type": "object", "properties": {"x": {"type": "integer"}}}))],
        )]);
        let rendered = Renderer::new(RendererConfig::default()).render(&types).unwrap();
        assert_eq!(rendered.len(), 1);
        let paths: Vec<String> = rendered[0]
            .artifacts
            .iter()
            .map(|a| a.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            paths,
            vec![
                "include/schemas/a_fwd.hpp",
                "include/schemas/a.hpp",
                "include/schemas/a_parsers.ipp",
                "src/schemas/a.cpp",
            ]
        );
        let header = artifact(&rendered[0], "a.hpp");
        assert!(header.contains("namespace ns {"));
        assert!(header.contains("struct T {"));
        assert!(header.contains("std::optional<int> x{};"));
        assert!(artifact(&rendered[0], "a_fwd.hpp").contains("struct T;"));
    }

    #[test]
    fn test_cross_document_include() {
        let types = generate(&[
            ("a.yaml", &[("A", json!({"type": "object", "properties": {}}))]),
            (
                "b.yaml",
                &[(
                    "B",
                    json!({
                        "type": "object",
                        "properties": {"a": {"$ref": "a.yaml#/definitions/A"}},
                        "required": ["a"]
                    }),
                )],
            ),
        ]);
        let rendered = Renderer::new(RendererConfig::default()).render(&types).unwrap();
        let b = rendered.iter().find(|f| f.rel_path == "b").unwrap();
        assert!(artifact(b, "b.hpp").contains("#include <a.hpp>"));
        assert!(artifact(b, "b.hpp").contains("::ns::A a{};"));
        let a = rendered.iter().find(|f| f.rel_path == "a").unwrap();
        assert!(!artifact(a, "a.hpp").contains("#include <b.hpp>"));
    }

    #[test]
    fn test_extra_formats_skip_json_only() {
        let types = generate(&[(
            "a.yaml",
            &[
                ("Free", json!({"type": "object", "properties": {}, "additionalProperties": true})),
                ("Plain", json!({"type": "object", "properties": {}})),
            ],
        )]);
        let mut types = types;
        crate::back::format_chooser::propagate_only_json(&mut types);
        let rendered = Renderer::new(RendererConfig {
            parse_extra_formats: true,
            ..Default::default()
        })
        .render(&types)
        .unwrap();
        let source = artifact(&rendered[0], "a.cpp");
        assert!(source.contains("::ns::Plain Parse(USERVER_NAMESPACE::formats::yaml::Value"));
        assert!(!source.contains("::ns::Free Parse(USERVER_NAMESPACE::formats::yaml::Value"));
        assert!(source.contains("::ns::Free Parse(USERVER_NAMESPACE::formats::json::Value"));
    }

    #[test]
    fn test_nested_patterns_get_distinct_constants() {
        let types = generate(&[(
            "a.yaml",
            &[(
                "T",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string", "pattern": "^a$"},
                        "inner": {
                            "type": "object",
                            "properties": {"id": {"type": "string", "pattern": "^b$"}}
                        }
                    }
                }),
            )],
        )]);
        let rendered = Renderer::new(RendererConfig::default()).render(&types).unwrap();
        let parsers = artifact(&rendered[0], "a_parsers.ipp");
        let declares = |name: &str, pattern: &str| {
            parsers.contains(&format!("inline constexpr std::string_view {name} = \"{pattern}\";"))
        };
        assert!(declares("kns_T_Id_Pattern", "^a$"));
        assert!(declares("kns_T_Inner_Id_Pattern", "^b$"));
        assert!(parsers.contains("USERVER_NAMESPACE::chaotic::Pattern<::kns_T_Id_Pattern>"));
        assert!(parsers.contains("USERVER_NAMESPACE::chaotic::Pattern<::kns_T_Inner_Id_Pattern>"));
        assert_eq!(parsers.matches("kns_T_Id_Pattern =").count(), 1);
    }

    #[test]
    fn test_documents_differing_by_extension_rejected() {
        let object = json!({"type": "object", "properties": {}});
        let types = generate(&[
            ("a.yaml", &[("A", object.clone())]),
            ("a.json", &[("B", object)]),
        ]);
        let err = Renderer::new(RendererConfig::default()).render(&types).unwrap_err();
        let Error::Diagnostic(diagnostic) = err else {
            panic!("expected a diagnostic, got {err:?}");
        };
        assert!(matches!(diagnostic.kind, DiagnosticKind::DuplicatePath(_)));
        assert_eq!(diagnostic.filepath, "a.json");
    }

    #[test]
    fn test_missing_formatter_is_reported() {
        let binary = Path::new("/nonexistent/clang-format");
        let err = run_formatter(binary, Path::new("a.hpp"), "x").unwrap_err();
        assert!(matches!(err, Error::Formatter { .. }));
    }
}
