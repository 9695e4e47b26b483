//! Polyglot Schemas
//!
//! Type-resolution graph and multi-target code generator. Data types declared
//! once in a neutral schema language are projected into C++, TypeScript (zod)
//! and Protocol Buffers so services in different languages share structurally
//! identical types.
//!
//! ## Features
//!
//! - **Resolution Table**: namespaced types with generics, defaults, inheritance
//!   and distinct types, loaded from the analyzer's JSON output
//! - **Dependency Ordering**: deterministic topological sort that tolerates cycles
//! - **Output Grouping**: per-target collection of types by output path
//! - **Plugin Backends**: shared reference lowering with per-language syntax
//!
//! ## Architecture
//!
//! ```text
//! Table (frozen) ──► Registry ──► Plugin::check ──► Plugin::generate ──► Response
//!                                                        │
//!                  Collector ◄── group by output path ───┤
//!                  Resolver  ◄── TypeRef → target syntax ┘
//! ```
//!
//! The library never writes files; the `polyglot-gen` binary does.

pub mod codegen;
pub mod config;
pub mod error;
pub mod resolution;

pub use codegen::{GeneratedFile, Plugin, Registry, Request, Response};
pub use config::CompilerConfig;
pub use error::{CodegenError, Result};
pub use resolution::{Table, Type};
