//! Error types for resolution and code generation

use thiserror::Error;

/// Result type for code generation operations
pub type Result<T> = std::result::Result<T, CodegenError>;

/// Resolution and generation errors
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("duplicate type: {qualified_name}")]
    DuplicateType { qualified_name: String },

    #[error("type not found: {name}")]
    TypeNotFound { name: String },

    #[error("output path {path} for type {type_name} escapes the repository root")]
    PathTraversal { type_name: String, path: String },

    #[error(
        "type {type_name} references {referenced} which has no {target} output path and no {target} include"
    )]
    UnreachableCrossNamespace {
        type_name: String,
        referenced: String,
        target: String,
    },

    #[error("type {type_name} embeds itself by value through field {field} ({chain})")]
    UninhabitableType {
        type_name: String,
        field: String,
        chain: String,
    },

    #[error("plugin {plugin} requires {requires}, which is not selected")]
    MissingPrerequisite { plugin: String, requires: String },

    #[error("unknown plugin: {name}")]
    UnknownPlugin { name: String },

    #[error("plugin dependency cycle involving {plugins}")]
    DependencyCycle { plugins: String },

    #[error("invalid @{directive} on {type_name}: {reason}")]
    InvalidDirective {
        type_name: String,
        directive: String,
        reason: String,
    },

    #[error("{plugin} failed to generate {path}: {source}")]
    Generation {
        plugin: String,
        path: String,
        #[source]
        source: Box<CodegenError>,
    },

    #[error("generated file is stale: {path}")]
    Stale { path: String },

    #[error("post-write command {command} failed: {reason}")]
    PostWrite { command: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl CodegenError {
    /// Wrap an error with the plugin and output path it was raised for.
    pub fn in_file(self, plugin: &str, path: &str) -> Self {
        Self::Generation {
            plugin: plugin.to_string(),
            path: path.to_string(),
            source: Box::new(self),
        }
    }
}
