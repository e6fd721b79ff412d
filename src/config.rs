//! Configuration management for the generator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (chaotic.toml)
//! - Environment variables (CHAOTIC__*)
//!
//! ## Example config file (chaotic.toml):
//! ```toml
//! [generator]
//! strict_parsing = true
//! autodiscover_default_dict = false
//! dialect = "jsonschema"
//!
//! [runtime]
//! array_container = "std::vector"
//! extra_container = "std::unordered_map"
//! io_include_dir = "userver/chaotic/io"
//!
//! [[namespaces]]
//! file = "api/types.yaml"
//! namespace = "api::types"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::SchemaDialect;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChaoticConfig {
    /// Translator defaults
    #[serde(default)]
    pub generator: GeneratorSettings,

    /// Spellings of the target runtime library
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Virtual file to C++ namespace
    #[serde(default)]
    pub namespaces: Vec<NamespaceRule>,
}

/// Translator defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Reject unknown properties while parsing generated structs
    #[serde(default = "default_true")]
    pub strict_parsing: bool,

    /// Collapse `__default__` + typed extras into the default-dict wrapper
    #[serde(default)]
    pub autodiscover_default_dict: bool,

    /// Dialect tag printed with diagnostics
    #[serde(default)]
    pub dialect: SchemaDialect,
}

/// Type and include spellings of the runtime the generated code links against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub array_container: String,
    /// User types that are consumed as the array container
    pub set_like_containers: Vec<String>,
    pub extra_container: String,
    pub default_dict: String,
    pub strong_typedef: String,
    pub optional: String,
    pub box_type: String,
    pub json_value: String,
    pub variant: String,
    pub string: String,
    pub uuid: String,
    pub date: String,
    pub date_time: String,
    pub date_time_iso_basic: String,
    /// Directory of `<snake_case_type>.hpp` headers for user types
    pub io_include_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            array_container: "std::vector".to_string(),
            set_like_containers: vec!["std::set".to_string(), "std::unordered_set".to_string()],
            extra_container: "std::unordered_map".to_string(),
            default_dict: "userver::utils::DefaultDict".to_string(),
            strong_typedef: "userver::utils::StrongTypedef".to_string(),
            optional: "std::optional".to_string(),
            box_type: "userver::utils::Box".to_string(),
            json_value: "userver::formats::json::Value".to_string(),
            variant: "std::variant".to_string(),
            string: "std::string".to_string(),
            uuid: "boost::uuids::uuid".to_string(),
            date: "userver::utils::datetime::Date".to_string(),
            date_time: "userver::utils::datetime::TimePointTz".to_string(),
            date_time_iso_basic: "userver::utils::datetime::TimePointTzIsoBasic".to_string(),
            io_include_dir: "userver/chaotic/io".to_string(),
        }
    }
}

/// Maps one virtual file to a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceRule {
    pub file: String,
    pub namespace: String,
}

fn default_true() -> bool {
    true
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            strict_parsing: true,
            autodiscover_default_dict: false,
            dialect: SchemaDialect::default(),
        }
    }
}

impl ChaoticConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["chaotic.toml", ".chaotic.toml", "config/chaotic.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "chaotic", "chaotic") {
            let xdg_config = dirs.config_dir().join("chaotic.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // CHAOTIC__GENERATOR__STRICT_PARSING=false
        builder = builder.add_source(
            Environment::with_prefix("CHAOTIC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Namespace of a virtual file; the global namespace when no rule names it
    pub fn namespace_for(&self, vfilepath: &str) -> &str {
        self.namespaces
            .iter()
            .find(|rule| rule.file == vfilepath)
            .map(|rule| rule.namespace.as_str())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChaoticConfig::default();
        assert!(config.generator.strict_parsing);
        assert!(!config.generator.autodiscover_default_dict);
        assert_eq!(config.runtime.extra_container, "std::unordered_map");
        assert_eq!(config.namespace_for("a.yaml"), "");
    }

    #[test]
    fn test_serialize_config() {
        let mut config = ChaoticConfig::default();
        config.namespaces.push(NamespaceRule {
            file: "a.yaml".to_string(),
            namespace: "ns".to_string(),
        });
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[generator]"));
        assert!(toml_str.contains("[runtime]"));
        assert!(toml_str.contains("[[namespaces]]"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let path_str = path.to_str().unwrap();

        let mut config = ChaoticConfig::default();
        config.generator.autodiscover_default_dict = true;
        config.runtime.extra_container = "absl::flat_hash_map".to_string();
        config.namespaces.push(NamespaceRule {
            file: "api/a.yaml".to_string(),
            namespace: "api".to_string(),
        });
        config.save(path_str).unwrap();

        let loaded = ChaoticConfig::load_from(Some(path_str)).unwrap();
        assert!(loaded.generator.autodiscover_default_dict);
        assert_eq!(loaded.runtime.extra_container, "absl::flat_hash_map");
        assert_eq!(loaded.runtime.array_container, "std::vector");
        assert_eq!(loaded.namespace_for("api/a.yaml"), "api");
    }
}
