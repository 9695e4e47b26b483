//! Configuration for the schema compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (polyglot.toml)
//! - Environment variables (POLYGLOT__*)
//!
//! ## Example config file (polyglot.toml):
//! ```toml
//! [generate]
//! repo_root = "."
//! targets = ["cpp/types", "ts/types"]
//! post_write = true
//!
//! [cpp]
//! file_name_pattern = "types.gen.h"
//! json_file_name = "json.gen.h"
//! format_command = "clang-format"
//!
//! [[ts.package_mappings]]
//! prefix = "client/ts/src"
//! package = "@synnaxlabs/client"
//!
//! [pb]
//! default_go_module = "github.com/synnaxlabs/synnax/"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main compiler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub generate: GenerateConfig,

    #[serde(default)]
    pub cpp: CppConfig,

    #[serde(default)]
    pub ts: TsConfig,

    #[serde(default)]
    pub pb: PbConfig,
}

/// Run-wide generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Repository root that output paths are relative to
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,

    /// Plugins to run; empty runs every registered plugin
    #[serde(default)]
    pub targets: Vec<String>,

    /// Run formatters after writing
    #[serde(default = "default_true")]
    pub post_write: bool,
}

/// C++ backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CppConfig {
    #[serde(default = "default_cpp_file_name")]
    pub file_name_pattern: String,

    /// Header holding the `parse` / `to_json` definitions
    #[serde(default = "default_cpp_json_file_name")]
    pub json_file_name: String,

    #[serde(default = "default_clang_format")]
    pub format_command: String,
}

/// TypeScript backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsConfig {
    #[serde(default = "default_ts_file_name")]
    pub file_name_pattern: String,

    /// Output prefixes published as packages, checked in order
    #[serde(default = "default_package_mappings")]
    pub package_mappings: Vec<PackageMapping>,

    #[serde(default = "default_prettier")]
    pub format_command: String,
}

/// Maps a source directory to the package it is published as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMapping {
    pub prefix: String,
    pub package: String,
}

/// Protobuf backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbConfig {
    /// Module prefix for `option go_package`
    #[serde(default = "default_go_module")]
    pub default_go_module: String,

    #[serde(default = "default_buf")]
    pub format_command: String,
}

// Default value functions
fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_cpp_file_name() -> String {
    "types.gen.h".to_string()
}

fn default_cpp_json_file_name() -> String {
    "json.gen.h".to_string()
}

fn default_clang_format() -> String {
    "clang-format".to_string()
}

fn default_ts_file_name() -> String {
    "types.gen.ts".to_string()
}

fn default_prettier() -> String {
    "prettier".to_string()
}

fn default_go_module() -> String {
    "github.com/synnaxlabs/synnax/".to_string()
}

fn default_buf() -> String {
    "buf".to_string()
}

fn default_package_mappings() -> Vec<PackageMapping> {
    [
        ("client/ts/src", "@synnaxlabs/client"),
        ("x/ts/src", "@synnaxlabs/x"),
        ("pluto/src", "@synnaxlabs/pluto"),
        ("freighter/ts/src", "@synnaxlabs/freighter"),
        ("alamos/ts/src", "@synnaxlabs/alamos"),
        ("drift/src", "@synnaxlabs/drift"),
    ]
    .into_iter()
    .map(|(prefix, package)| PackageMapping { prefix: prefix.to_string(), package: package.to_string() })
    .collect()
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            repo_root: default_repo_root(),
            targets: Vec::new(),
            post_write: true,
        }
    }
}

impl Default for CppConfig {
    fn default() -> Self {
        Self {
            file_name_pattern: default_cpp_file_name(),
            json_file_name: default_cpp_json_file_name(),
            format_command: default_clang_format(),
        }
    }
}

impl Default for TsConfig {
    fn default() -> Self {
        Self {
            file_name_pattern: default_ts_file_name(),
            package_mappings: default_package_mappings(),
            format_command: default_prettier(),
        }
    }
}

impl Default for PbConfig {
    fn default() -> Self {
        Self {
            default_go_module: default_go_module(),
            format_command: default_buf(),
        }
    }
}

impl TsConfig {
    /// Package whose source prefix contains `path`
    pub fn package_for(&self, path: &str) -> Option<&PackageMapping> {
        self.package_mappings
            .iter()
            .find(|m| path == m.prefix || path.starts_with(&format!("{}/", m.prefix)))
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["polyglot.toml", ".polyglot.toml", "config/polyglot.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "polyglot", "polyglot") {
            let xdg_config = dirs.config_dir().join("polyglot.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // POLYGLOT__CPP__FILE_NAME_PATTERN=...
        builder = builder.add_source(
            Environment::with_prefix("POLYGLOT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Repository root, resolved against the working directory when relative
    pub fn repo_root(&self) -> PathBuf {
        if self.generate.repo_root.is_absolute() {
            self.generate.repo_root.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.generate.repo_root)
        }
    }
}
