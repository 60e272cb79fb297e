//! Resolves which modified game assets must ship inside each content bundle.
//!
//! Bundles load each other in a fixed order described by call-stack trees. For
//! every root tree the [`compiler::ClosureCompiler`] walks the bundles in load
//! order and decides which edited assets, and which of their dependencies, each
//! bundle has to carry so that everything is resident when the game needs it.

pub mod asset_db;
pub mod cache;
pub mod call_graph;
pub mod call_stack;
pub mod compiler;
pub mod config;
pub mod handlers;
pub mod operator;
pub mod packaging;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
