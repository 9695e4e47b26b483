//! Code Generation
//!
//! Multi-target generation over a frozen resolution table.
//!
//! Architecture:
//! - `Plugin`: one target backend (name, directive domains, prerequisites,
//!   pre-flight check, generate, post-write hook)
//! - `Registry`: explicit set of plugins, ordered by their prerequisites
//! - `Request` / `Response`: the table going in, `(path, content)` records and
//!   per-file errors coming out
//!
//! Generation never touches the filesystem. Callers write `Response::files`
//! and then invoke `Plugin::post_write`.

pub mod collector;
pub mod cpp;
pub mod cpp_json;
pub mod directives;
pub mod freshness;
pub mod names;
pub mod pb;
pub mod resolver;
pub mod ts;

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::CompilerConfig;
use crate::error::{CodegenError, Result};
use crate::resolution::{Table, Type};

/// First line of every generated file
pub const GENERATED_HEADER: &str = "// Code generated by polyglot. DO NOT EDIT.";

// =============================================================================
// Request / Response
// =============================================================================

/// Input to a generation pass
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub table: &'a Table,
    /// Repository root, used by post-write hooks and freshness checks
    pub repo_root: Option<PathBuf>,
}

impl<'a> Request<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self { table, repo_root: None }
    }

    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = Some(root.into());
        self
    }

    /// Declared types carrying any of `domains`
    pub fn participants(&self, domains: &[&str]) -> Vec<&'a Type> {
        self.table
            .declared()
            .filter(|t| domains.iter().any(|d| t.domains.contains_key(*d)))
            .collect()
    }
}

/// A generated file, path relative to the repository root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// Files produced by one plugin plus the per-file failures it hit
#[derive(Debug, Default)]
pub struct Response {
    pub files: Vec<GeneratedFile>,
    pub errors: Vec<CodegenError>,
}

impl Response {
    /// Record the outcome of rendering one file. Failures are attributed to
    /// the plugin and path and do not affect other files.
    pub fn record(&mut self, plugin: &str, path: String, rendered: Result<String>) {
        match rendered {
            Ok(content) => {
                info!(plugin, path = %path, "generated file");
                self.files.push(GeneratedFile { path, content });
            }
            Err(e) => {
                warn!(plugin, path = %path, error = %e, "file generation failed");
                self.errors.push(e.in_file(plugin, &path));
            }
        }
    }

    pub fn file(&self, path: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Join an output directory with a target file name
pub fn file_path(dir: &str, file_name: &str) -> String {
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", dir, file_name)
    }
}

// =============================================================================
// Plugin
// =============================================================================

/// A target backend
pub trait Plugin {
    /// Identifier, e.g. `cpp/types`
    fn name(&self) -> &str;

    /// Directive domains that make a type participate in this target
    fn domains(&self) -> &[&str];

    /// Plugins that must be selected alongside this one
    fn requires(&self) -> &[&str] {
        &[]
    }

    /// Pre-flight validation, run for every selected plugin before any generation
    fn check(&self, _request: &Request<'_>) -> Result<()> {
        Ok(())
    }

    fn generate(&self, request: &Request<'_>) -> Result<Response>;

    /// Runs after the caller has written this plugin's files
    fn post_write(&self, _files: &[PathBuf], _request: &Request<'_>) -> Result<()> {
        Ok(())
    }
}

/// Run an external tool, appending `files` to `args`
pub fn run_command(program: &str, args: &[&str], files: &[PathBuf], cwd: Option<&Path>) -> Result<()> {
    let mut command = Command::new(program);
    command.args(args).args(files);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    debug!(program, count = files.len(), "running post-write command");
    let output = command.output().map_err(|e| CodegenError::PostWrite {
        command: program.to_string(),
        reason: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(CodegenError::PostWrite {
            command: program.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Registry
// =============================================================================

/// Output of one plugin
#[derive(Debug)]
pub struct PluginOutput {
    pub plugin: String,
    pub response: Response,
}

/// Result of running several plugins
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub outputs: Vec<PluginOutput>,
    /// Plugins whose `generate` failed outright
    pub failures: Vec<(String, CodegenError)>,
}

impl GenerationReport {
    pub fn files(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.outputs.iter().flat_map(|o| o.response.files.iter())
    }

    pub fn error_count(&self) -> usize {
        self.failures.len() + self.outputs.iter().map(|o| o.response.errors.len()).sum::<usize>()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Every error, plugin failures first
    pub fn errors(&self) -> Vec<&CodegenError> {
        self.failures
            .iter()
            .map(|(_, e)| e)
            .chain(self.outputs.iter().flat_map(|o| o.response.errors.iter()))
            .collect()
    }
}

/// Explicit set of available plugins
#[derive(Default)]
pub struct Registry {
    plugins: IndexMap<String, Box<dyn Plugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the C++ (types and JSON), TypeScript and Protobuf backends
    pub fn with_defaults(config: &CompilerConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(cpp::CppPlugin::new(config.cpp.clone())));
        registry.register(Box::new(cpp_json::CppJsonPlugin::new(config.cpp.clone())));
        registry.register(Box::new(ts::TsPlugin::new(config.ts.clone())));
        registry.register(Box::new(pb::PbPlugin::new(config.pb.clone())));
        registry
    }

    /// Add a plugin, replacing any plugin with the same name
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.get(name).map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Selected plugins, prerequisites first. An empty selection means every
    /// registered plugin.
    pub fn ordered(&self, names: &[String]) -> Result<Vec<&dyn Plugin>> {
        let selected: Vec<&str> = if names.is_empty() {
            self.names()
        } else {
            names.iter().map(String::as_str).collect()
        };

        let mut graph: DiGraph<&dyn Plugin, ()> = DiGraph::new();
        let mut index = IndexMap::new();
        for name in &selected {
            let plugin = self.get(name).ok_or_else(|| CodegenError::UnknownPlugin { name: name.to_string() })?;
            if !index.contains_key(*name) {
                index.insert(name.to_string(), graph.add_node(plugin));
            }
        }

        for (name, node) in &index {
            let plugin = graph[*node];
            for required in plugin.requires() {
                let Some(dep) = index.get(*required) else {
                    return Err(CodegenError::MissingPrerequisite {
                        plugin: name.clone(),
                        requires: required.to_string(),
                    });
                };
                graph.add_edge(*dep, *node, ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| CodegenError::DependencyCycle {
            plugins: graph[cycle.node_id()].name().to_string(),
        })?;
        Ok(order.into_iter().map(|n| graph[n]).collect())
    }

    /// Check every selected plugin, then generate each one. A plugin whose
    /// `generate` fails is recorded and the rest still run; a failed check
    /// stops the pass before anything is generated.
    #[tracing::instrument(skip_all, fields(plugins = names.len()))]
    pub fn generate_all(&self, request: &Request<'_>, names: &[String]) -> Result<GenerationReport> {
        let plugins = self.ordered(names)?;
        for plugin in &plugins {
            plugin.check(request)?;
        }

        let mut report = GenerationReport::default();
        for plugin in plugins {
            if request.participants(plugin.domains()).is_empty() {
                debug!(plugin = plugin.name(), "no participating types");
            }
            match plugin.generate(request) {
                Ok(response) => report.outputs.push(PluginOutput {
                    plugin: plugin.name().to_string(),
                    response,
                }),
                Err(e) => {
                    warn!(plugin = plugin.name(), error = %e, "plugin failed");
                    report.failures.push((plugin.name().to_string(), e));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{Domain, Form, StructForm};

    struct Fake {
        name: &'static str,
        requires: &'static [&'static str],
        fail_check: bool,
        fail_generate: bool,
    }

    impl Fake {
        fn new(name: &'static str) -> Self {
            Self { name, requires: &[], fail_check: false, fail_generate: false }
        }
    }

    impl Plugin for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn domains(&self) -> &[&str] {
            &["fake"]
        }

        fn requires(&self) -> &[&str] {
            self.requires
        }

        fn check(&self, _request: &Request<'_>) -> Result<()> {
            if self.fail_check {
                return Err(CodegenError::TypeNotFound { name: self.name.into() });
            }
            Ok(())
        }

        fn generate(&self, _request: &Request<'_>) -> Result<Response> {
            if self.fail_generate {
                return Err(CodegenError::TypeNotFound { name: self.name.into() });
            }
            let mut response = Response::default();
            response.record(self.name, format!("{}/out.txt", self.name), Ok("ok".into()));
            Ok(response)
        }
    }

    fn names(plugins: &[&dyn Plugin]) -> Vec<String> {
        plugins.iter().map(|p| p.name().to_string()).collect()
    }

    #[test]
    fn test_ordered_puts_prerequisites_first() {
        let mut registry = Registry::new();
        registry.register(Box::new(Fake { requires: &["base"], ..Fake::new("derived") }));
        registry.register(Box::new(Fake::new("base")));
        let order = registry.ordered(&[]).unwrap();
        assert_eq!(names(&order), vec!["base", "derived"]);
    }

    #[test]
    fn test_missing_prerequisite() {
        let mut registry = Registry::new();
        registry.register(Box::new(Fake { requires: &["base"], ..Fake::new("derived") }));
        registry.register(Box::new(Fake::new("base")));
        match registry.ordered(&["derived".to_string()]) {
            Err(CodegenError::MissingPrerequisite { plugin, requires }) => {
                assert_eq!(plugin, "derived");
                assert_eq!(requires, "base");
            }
            Err(other) => panic!("Expected MissingPrerequisite, got {:?}", other),
            Ok(_) => panic!("Expected MissingPrerequisite"),
        }
    }

    #[test]
    fn test_unknown_and_cyclic_plugins() {
        let mut registry = Registry::new();
        registry.register(Box::new(Fake { requires: &["b"], ..Fake::new("a") }));
        registry.register(Box::new(Fake { requires: &["a"], ..Fake::new("b") }));
        assert!(matches!(registry.ordered(&["zzz".to_string()]), Err(CodegenError::UnknownPlugin { .. })));
        assert!(matches!(registry.ordered(&[]), Err(CodegenError::DependencyCycle { .. })));
    }

    #[test]
    fn test_failed_check_generates_nothing() {
        let mut registry = Registry::new();
        registry.register(Box::new(Fake::new("good")));
        registry.register(Box::new(Fake { fail_check: true, ..Fake::new("bad") }));
        let table = Table::new();
        assert!(registry.generate_all(&Request::new(&table), &[]).is_err());
    }

    #[test]
    fn test_generate_failure_does_not_stop_others() {
        let mut registry = Registry::new();
        registry.register(Box::new(Fake { fail_generate: true, ..Fake::new("bad") }));
        registry.register(Box::new(Fake::new("good")));
        let table = Table::new();
        let report = registry.generate_all(&Request::new(&table), &[]).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "bad");
        let paths: Vec<_> = report.files().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec!["good/out.txt"]);
        assert!(report.has_errors());
    }

    #[test]
    fn test_response_record_wraps_errors() {
        let mut response = Response::default();
        response.record("cpp/types", "a/types.gen.h".into(), Ok("x".into()));
        response.record(
            "cpp/types",
            "b/types.gen.h".into(),
            Err(CodegenError::TypeNotFound { name: "ns.B".into() }),
        );
        assert_eq!(response.files.len(), 1);
        assert!(response.file("a/types.gen.h").is_some());
        match &response.errors[0] {
            CodegenError::Generation { plugin, path, .. } => {
                assert_eq!(plugin, "cpp/types");
                assert_eq!(path, "b/types.gen.h");
            }
            other => panic!("Expected Generation, got {:?}", other),
        }
    }

    #[test]
    fn test_participants() {
        let mut table = Table::new();
        table
            .add(Type::new("ns", "A", Form::Struct(StructForm::default())).with_domain(Domain::new("fake")))
            .unwrap();
        table.add(Type::new("ns", "B", Form::Struct(StructForm::default()))).unwrap();
        let request = Request::new(&table);
        let found = request.participants(&["fake"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "A");
        assert_eq!(file_path("", "x.h"), "x.h");
        assert_eq!(file_path("a/b", "x.h"), "a/b/x.h");
    }
}
