//! # cxgraph - Source Dependency Resolver for Embedded C/C++
//!
//! cxgraph works out which files an embedded C/C++ program actually needs and
//! rebuilds only what changed.
//!
//! ## Features
//!
//! - **Textual + Link-Time Graph**: `#include` edges, forced-source rules and
//!   declaration-to-definition edges, kept apart so every file has a reason
//! - **Minimal Build Sets**: only what the roots reach gets compiled
//! - **Incremental Builds**: content fingerprints of each unit and its headers
//! - **Parallel Builds**: bounded worker pool with fail-fast cancellation
//!
//! ## Quick Start
//!
//! ```bash
//! # Show what main.cpp pulls in, and why
//! cxg tree
//!
//! # Build whatever is stale
//! cxg build
//! ```
//!
//! ## Module Organization
//!
//! - [`index`] / [`parse`] - Source scanning and declaration extraction
//! - [`graph`] - Include, forced and symbol edges
//! - [`resolve`] - Build set computation and cycle checks
//! - [`schedule`] / [`fingerprint`] - Staleness and compile waves
//! - [`build`] - Executor, compile database, watch mode

/// Pipeline, executor and the `build`/`watch`/`clean` commands.
pub mod build;

/// Configuration file parsing (`cxgraph.toml`).
pub mod config;

/// Non-fatal findings and how they are reported.
pub mod diagnostics;

pub mod error;

/// Persistent per-unit fingerprints.
pub mod fingerprint;

/// Dependency graph over the source index.
pub mod graph;

/// Project scanning.
pub mod index;

/// Lightweight C/C++ declaration scanner.
pub mod parse;

pub mod resolve;

pub mod schedule;

/// Compiler adapters.
pub mod toolchain;

/// `cxg tree` rendering.
pub mod tree;

pub use error::{Error, Result};
