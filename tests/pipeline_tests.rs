//! End-to-end runs of the generator over the fixtures

use std::fs;
use std::path::{Path, PathBuf};

use chaotic::{run, ChaoticConfig, DiagnosticKind, Error, NameMap, Options};

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn options(inputs: Vec<PathBuf>, relative_to: &Path, output_dir: &Path) -> Options {
    let mut config = ChaoticConfig::default();
    config.generator.autodiscover_default_dict = true;
    Options {
        name_map: NameMap::from_rules(&["/definitions/([^/]*)=ns::{0}"]).unwrap(),
        file_map: NameMap::from_rules(&["(.*)={0}"]).unwrap(),
        output_dir: output_dir.to_path_buf(),
        relative_to: Some(relative_to.to_path_buf()),
        inputs,
        config,
        ..Default::default()
    }
}

fn fixture_options(output_dir: &Path) -> Options {
    options(vec![fixtures_dir()], &fixtures_dir(), output_dir)
}

fn read(output_dir: &Path, path: &str) -> String {
    fs::read_to_string(output_dir.join(path)).unwrap()
}

fn run_inline(documents: &[(&str, &str)]) -> Result<chaotic::RunStats, Error> {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for (name, content) in documents {
        fs::write(input.path().join(name), content).unwrap();
    }
    run(&options(vec![input.path().to_path_buf()], input.path(), output.path()))
}

fn expect_diagnostic(result: Result<chaotic::RunStats, Error>) -> chaotic::Diagnostic {
    match result {
        Err(Error::Diagnostic(diagnostic)) => diagnostic,
        other => panic!("expected a diagnostic, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_four_artifacts_per_document() {
    let output = tempfile::tempdir().unwrap();
    let stats = run(&fixture_options(output.path())).unwrap();

    assert_eq!(stats.files_written, 8);
    assert_eq!(stats.files_unchanged, 0);
    for document in ["types", "refs"] {
        for artifact in [
            format!("include/{document}_fwd.hpp"),
            format!("include/{document}.hpp"),
            format!("include/{document}_parsers.ipp"),
            format!("src/{document}.cpp"),
        ] {
            assert!(output.path().join(&artifact).is_file(), "{artifact} missing");
        }
    }
}

#[test]
fn test_second_run_writes_nothing() {
    let output = tempfile::tempdir().unwrap();
    let options = fixture_options(output.path());
    let first = run(&options).unwrap();
    let second = run(&options).unwrap();

    assert_eq!(second.files_written, 0);
    assert_eq!(second.files_unchanged, first.files_written);
    assert_eq!(second.types_generated, first.types_generated);
}

#[test]
fn test_changed_artifact_is_rewritten() {
    let output = tempfile::tempdir().unwrap();
    let options = fixture_options(output.path());
    run(&options).unwrap();

    fs::write(output.path().join("src/types.cpp"), "stale").unwrap();
    let stats = run(&options).unwrap();
    assert_eq!(stats.files_written, 1);
    assert_ne!(read(output.path(), "src/types.cpp"), "stale");
}

#[test]
fn test_generated_declarations() {
    let output = tempfile::tempdir().unwrap();
    run(&fixture_options(output.path())).unwrap();

    let header = read(output.path(), "include/types.hpp");
    assert!(header.contains("namespace ns {"));
    assert!(header.contains("using Bounded = int;"));
    assert!(header.contains("enum class Level {"));
    assert!(header.contains("k1 = 1,"));
    assert!(header.contains("std::unordered_map<std::string, int> extra;"));
    assert!(header.contains("// Tree node"));
    assert!(header.contains("std::optional<std::vector<::ns::Node>> children{};"));
    assert!(header.contains("using Shape = std::variant<::ns::Circle, ::ns::Square>;"));

    let forward = read(output.path(), "include/types_fwd.hpp");
    assert!(forward.contains("struct Node;"));
    assert!(forward.contains("enum class Level;"));
    assert!(!forward.contains("Shape"));
}

#[test]
fn test_cross_document_refs() {
    let output = tempfile::tempdir().unwrap();
    run(&fixture_options(output.path())).unwrap();

    let header = read(output.path(), "include/refs.hpp");
    assert!(header.contains("#include <types.hpp>"));
    assert!(header.contains("int bounded{};"));
    assert!(header.contains("userver::utils::DefaultDict<std::string>"));

    let parsers = read(output.path(), "include/refs_parsers.ipp");
    assert!(parsers.contains("#include <types_parsers.ipp>"));
    assert!(parsers.contains("USERVER_NAMESPACE::chaotic::Minimum<1>"));
    assert!(parsers.contains("USERVER_NAMESPACE::chaotic::Maximum<10>"));
}

#[test]
fn test_discriminator_settings_and_json_only() {
    let output = tempfile::tempdir().unwrap();
    let mut options = fixture_options(output.path());
    options.parse_extra_formats = true;
    run(&options).unwrap();

    let parsers = read(output.path(), "include/types_parsers.ipp");
    assert!(parsers.contains("kns_Shape_Settings"));
    assert!(parsers.contains("\"kind\""));

    let types_source = read(output.path(), "src/types.cpp");
    assert!(types_source.contains("::ns::Counters Parse(USERVER_NAMESPACE::formats::yaml::Value"));
    assert!(!types_source.contains("::ns::Free Parse(USERVER_NAMESPACE::formats::yaml::Value"));

    // Holder reaches the discriminated Shape through a ref
    let refs_source = read(output.path(), "src/refs.cpp");
    assert!(refs_source.contains("::ns::Holder Parse(USERVER_NAMESPACE::formats::json::Value"));
    assert!(!refs_source.contains("::ns::Holder Parse(USERVER_NAMESPACE::formats::yaml::Value"));
}

#[test]
fn test_serializers_emitted_on_request() {
    let output = tempfile::tempdir().unwrap();
    run(&fixture_options(output.path())).unwrap();
    assert!(!read(output.path(), "src/types.cpp").contains("Serialize("));

    let output = tempfile::tempdir().unwrap();
    let mut options = fixture_options(output.path());
    options.generate_serializers = true;
    run(&options).unwrap();
    assert!(read(output.path(), "src/types.cpp").contains("Serialize("));
    assert!(read(output.path(), "include/types.hpp").contains("Serialize("));
}

#[test]
fn test_enum_type_mismatch_reported() {
    let diagnostic = expect_diagnostic(run_inline(&[(
        "a.yaml",
        "definitions:\n  T:\n    type: integer\n    enum: ['1']\n",
    )]));
    assert!(matches!(diagnostic.kind, DiagnosticKind::EnumTypeMismatch(_)));
    assert_eq!(diagnostic.location, "/definitions/T/enum");
    assert_eq!(diagnostic.filepath, "a.yaml");
}

#[test]
fn test_direct_ref_cycle_reported() {
    let diagnostic = expect_diagnostic(run_inline(&[(
        "a.yaml",
        concat!(
            "definitions:\n  A:\n    type: object\n    properties:\n",
            "      p:\n        $ref: '#/definitions/A'\n",
        ),
    )]));
    let DiagnosticKind::RefCycle(members) = diagnostic.kind else {
        panic!("expected a cycle, got {:?}", diagnostic.kind);
    };
    assert!(members.iter().any(|m| m == "a.yaml#/definitions/A"));
}

#[test]
fn test_indirect_ref_cycle_allowed() {
    let stats = run_inline(&[(
        "a.yaml",
        concat!(
            "definitions:\n  A:\n    type: object\n    properties:\n",
            "      p:\n        $ref: '#/definitions/A'\n        x-usrv-cpp-indirect: true\n",
        ),
    )])
    .unwrap();
    assert_eq!(stats.types_generated, 1);
}

#[test]
fn test_unknown_field_reported() {
    let diagnostic = expect_diagnostic(run_inline(&[(
        "a.yaml",
        "definitions:\n  T:\n    type: string\n    minimum: 1\n",
    )]));
    assert!(matches!(diagnostic.kind, DiagnosticKind::UnknownField { .. }));
    assert_eq!(diagnostic.to_string().split(':').next(), Some("a.yaml"));
}

#[test]
fn test_unresolved_ref_reported() {
    let diagnostic = expect_diagnostic(run_inline(&[(
        "a.yaml",
        "definitions:\n  T:\n    $ref: 'missing.yaml#/definitions/X'\n",
    )]));
    assert!(matches!(diagnostic.kind, DiagnosticKind::RefUnresolved(_)));
}

#[test]
fn test_inputs_mapped_to_same_vfilepath_rejected() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for dir in ["x", "y"] {
        fs::create_dir_all(input.path().join(dir)).unwrap();
        fs::write(
            input.path().join(dir).join("a.yaml"),
            "definitions:\n  T:\n    type: boolean\n",
        )
        .unwrap();
    }
    let mut options = options(vec![input.path().to_path_buf()], input.path(), output.path());
    options.file_map = NameMap::from_rules(&["(?:x|y)/(.*)={0}"]).unwrap();

    let diagnostic = expect_diagnostic(run(&options));
    assert_eq!(diagnostic.kind, DiagnosticKind::DuplicatePath("a.yaml".to_string()));
    assert!(fs::read_dir(output.path()).unwrap().next().is_none());
}

#[test]
fn test_same_type_name_from_two_documents_rejected() {
    let diagnostic = expect_diagnostic(run_inline(&[
        ("a.yaml", "definitions:\n  T:\n    type: boolean\n"),
        ("b.yaml", "definitions:\n  T:\n    type: integer\n"),
    ]));
    assert_eq!(diagnostic.kind, DiagnosticKind::DuplicatePath("ns::T".to_string()));
    assert_eq!(diagnostic.filepath, "b.yaml");
}
