//! Chaotic code generator CLI
//!
//! Usage:
//!   chaotic-gen -n '/definitions/([^/]*)=ns::{0}' -f '(.*)={0}' -o out schemas/
//!   chaotic-gen --help

use std::path::PathBuf;

use anyhow::Context;
use chaotic::{ChaoticConfig, NameMap, NameMapItem, Options};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn parse_rule(rule: &str) -> Result<NameMapItem, String> {
    NameMapItem::parse(rule).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "chaotic-gen")]
#[command(about = "Generate C++ types and parsers from JSON Schema documents")]
struct Cli {
    /// In-file path to type name rule, PATTERN=TEMPLATE
    #[arg(short = 'n', long = "name-map", required = true, value_parser = parse_rule)]
    name_map: Vec<NameMapItem>,

    /// File path to virtual file path rule, PATTERN=TEMPLATE
    #[arg(short = 'f', long = "file-map", required = true, value_parser = parse_rule)]
    file_map: Vec<NameMapItem>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Root the file map sees input paths relative to
    #[arg(long)]
    relative_to: Option<PathBuf>,

    /// Search directory for user-type headers
    #[arg(short = 'I', long = "include-dir")]
    include_dirs: Vec<PathBuf>,

    /// Prefix erased from absolute refs
    #[arg(short = 'e', long, default_value = "")]
    erase_prefix: String,

    /// Also emit YAML and YAML-config parsers
    #[arg(long)]
    parse_extra_formats: bool,

    /// Also emit serializers
    #[arg(long)]
    generate_serializers: bool,

    /// Formatter binary; empty disables formatting
    #[arg(long)]
    clang_format: Option<PathBuf>,

    /// Configuration file layered over the default locations
    #[arg(long)]
    config: Option<String>,

    /// Input documents or directories
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ChaoticConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    let options = Options {
        name_map: NameMap::new(cli.name_map),
        file_map: NameMap::new(cli.file_map),
        output_dir: cli.output_dir,
        relative_to: cli.relative_to,
        include_dirs: cli.include_dirs,
        erase_prefix: cli.erase_prefix,
        parse_extra_formats: cli.parse_extra_formats,
        generate_serializers: cli.generate_serializers,
        clang_format: cli.clang_format.filter(|path| !path.as_os_str().is_empty()),
        inputs: cli.files,
        config,
    };

    let stats = chaotic::run(&options)?;
    println!(
        "✅ {} types, {} files written, {} unchanged",
        stats.types_generated, stats.files_written, stats.files_unchanged
    );
    Ok(())
}
