//! Pipeline driver
//!
//! Reads the input documents, maps real paths to virtual ones, runs every
//! stage and writes the artifacts. Files whose content did not change are
//! left untouched.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::back::{
    propagate_only_json, Generator, GeneratorConfig, RenderedFile, Renderer, RendererConfig,
};
use crate::config::ChaoticConfig;
use crate::error::{Diagnostic, DiagnosticKind, Error, Result, SchemaDialect};
use crate::front::{
    extract_schemas_to_scan, sort_json_types, sort_schemas, ParsedSchemas, ParserConfig,
    SchemaParser,
};
use crate::name_map::NameMap;

const INPUT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Everything one generator run needs
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// In-file path -> type name
    pub name_map: NameMap,
    /// Real (relative) filepath -> virtual filepath
    pub file_map: NameMap,
    pub output_dir: PathBuf,
    /// Root the file map sees paths relative to
    pub relative_to: Option<PathBuf>,
    /// User-type header search path; empty skips the check
    pub include_dirs: Vec<PathBuf>,
    /// Erased from absolute refs
    pub erase_prefix: String,
    pub parse_extra_formats: bool,
    pub generate_serializers: bool,
    pub clang_format: Option<PathBuf>,
    /// Files or directories
    pub inputs: Vec<PathBuf>,
    pub config: ChaoticConfig,
}

/// What a run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub types_generated: usize,
    pub files_written: usize,
    pub files_unchanged: usize,
}

/// Run the whole pipeline
pub fn run(options: &Options) -> Result<RunStats> {
    let dialect = options.config.generator.dialect;

    let inputs = expand_inputs(&options.inputs)?;
    info!("Reading {} input documents", inputs.len());

    let parsed = parse_documents(options, &inputs, dialect)?;
    let resolved = sort_schemas(parsed, None).map_err(|d| d.with_dialect(dialect))?;

    let mut generator_config =
        GeneratorConfig::from_config(&options.config, options.name_map.clone());
    if !options.include_dirs.is_empty() {
        generator_config.include_dirs = Some(options.include_dirs.clone());
    }
    let mut types = Generator::new(generator_config)
        .generate_types(&resolved, None)
        .map_err(|d| d.with_dialect(dialect))?;
    propagate_only_json(&mut types);

    let renderer = Renderer::new(RendererConfig {
        parse_extra_formats: options.parse_extra_formats,
        generate_serializers: options.generate_serializers,
        clang_format: options.clang_format.clone(),
        runtime: options.config.runtime.clone(),
    });
    let rendered = renderer.render(&types)?;

    let mut stats = RunStats {
        types_generated: types.types.len(),
        ..Default::default()
    };
    write_rendered(&options.output_dir, &rendered, &mut stats)?;

    info!(
        "Generated {} types: {} files written, {} unchanged",
        stats.types_generated, stats.files_written, stats.files_unchanged
    );
    Ok(stats)
}

/// Files as given, directories walked for schema documents; sorted, deduplicated
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry.map_err(|e| Error::Io(e.into()))?;
                let is_schema = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| INPUT_EXTENSIONS.contains(&e))
                    .unwrap_or(false);
                if entry.file_type().is_file() && is_schema {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Read a YAML or JSON document
pub fn read_document(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|source| Error::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Virtual filepath of an input, through the file map
pub fn vfilepath_for(
    path: &Path,
    relative_to: Option<&Path>,
    file_map: &NameMap,
) -> std::result::Result<String, Diagnostic> {
    let relative = relative_to
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    let relative = relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
    file_map.apply(&relative).ok_or_else(|| {
        Diagnostic::at(&relative, "", DiagnosticKind::NameNotMapped(relative.clone()))
    })
}

fn parse_documents(
    options: &Options,
    inputs: &[PathBuf],
    dialect: SchemaDialect,
) -> Result<ParsedSchemas> {
    let mut parts = Vec::with_capacity(inputs.len());
    let mut seen_vfilepaths: Vec<String> = Vec::with_capacity(inputs.len());

    for path in inputs {
        let vfilepath = vfilepath_for(path, options.relative_to.as_deref(), &options.file_map)
            .map_err(|d| d.with_dialect(dialect))?;
        if seen_vfilepaths.contains(&vfilepath) {
            let kind = DiagnosticKind::DuplicatePath(vfilepath.clone());
            return Err(Diagnostic::at(&vfilepath, "", kind).with_dialect(dialect).into());
        }
        seen_vfilepaths.push(vfilepath.clone());

        let document = read_document(path)?;
        let raw = extract_schemas_to_scan(&document, &options.name_map);
        let order = sort_json_types(&raw);
        debug!("{}: {} schemas to parse", vfilepath, order.len());

        let mut parser = SchemaParser::new(
            ParserConfig {
                erase_prefix: options.erase_prefix.clone(),
                dialect,
            },
            path.display().to_string(),
            vfilepath,
        );
        for infile_path in &order {
            if let Some(value) = raw.get(infile_path) {
                parser.parse_schema(infile_path, value)?;
            }
        }
        parts.push(parser.into_parsed_schemas());
    }

    let parsed = ParsedSchemas::merge(parts).map_err(|d| d.with_dialect(dialect))?;
    info!("Parsed {} schemas", parsed.len());
    Ok(parsed)
}

/// Write every artifact whose content differs from what is on disk
fn write_rendered(
    output_dir: &Path,
    rendered: &[RenderedFile],
    stats: &mut RunStats,
) -> Result<()> {
    for file in rendered {
        for artifact in &file.artifacts {
            let target = output_dir.join(&artifact.path);
            if let Ok(existing) = fs::read(&target) {
                if existing == artifact.content.as_bytes() {
                    stats.files_unchanged += 1;
                    continue;
                }
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &artifact.content)?;
            debug!("Wrote {}", target.display());
            stats.files_written += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vfilepath_through_file_map() {
        let map = NameMap::from_rules(&["schemas/(.*)=api/{0}"]).unwrap();
        let root = Some(Path::new("/repo"));
        let vfile = vfilepath_for(Path::new("/repo/schemas/a.yaml"), root, &map).unwrap();
        assert_eq!(vfile, "api/a.yaml");

        let err = vfilepath_for(Path::new("/repo/other/b.yaml"), root, &map).unwrap_err();
        assert!(matches!(err.kind, DiagnosticKind::NameNotMapped(_)));
    }

    #[test]
    fn test_expand_inputs_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.yaml"), "{}").unwrap();
        fs::write(dir.path().join("nested/a.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = expand_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files, vec![dir.path().join("b.yaml"), dir.path().join("nested/a.json")]);
    }

    #[test]
    fn test_read_document_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("a.yaml");
        fs::write(&yaml, "definitions:\n  T:\n    type: integer\n").unwrap();
        let value = read_document(&yaml).unwrap();
        assert_eq!(value["definitions"]["T"]["type"], "integer");

        let broken = dir.path().join("b.yaml");
        fs::write(&broken, "a: [").unwrap();
        assert!(matches!(read_document(&broken), Err(Error::Yaml { .. })));
    }
}
