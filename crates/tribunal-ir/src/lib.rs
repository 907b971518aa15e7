//! Language-neutral code representation for Tribunal.
//!
//! Files come in through a [`source::CodeSource`], are parsed by a
//! [`syntax::SyntaxFrontend`] (tree-sitter by default) into an arena
//! [`syntax::SyntaxTree`], and are lowered into [`block::CodeBlock`]s using the
//! per-language tables in [`languages`]. [`features`] summarises the whole
//! snapshot and [`selectors`] narrows blocks down per specialist.

pub mod block;
pub mod extractor;
pub mod features;
pub mod languages;
pub mod selectors;
pub mod source;
pub mod syntax;

use tribunal_core::{QualityConfig, TribunalError};

use crate::features::Codebase;
use crate::source::CodeSource;
use crate::syntax::TreeSitterFrontend;

/// Load every file from `source` and extract blocks and features with the
/// tree-sitter frontend.
///
/// # Errors
///
/// Returns [`TribunalError::Source`] if the source cannot be read and
/// [`TribunalError::Extraction`] if it holds no files.
///
/// # Examples
///
/// ```
/// use tribunal_core::QualityConfig;
/// use tribunal_ir::analyze_source;
/// use tribunal_ir::source::MemorySource;
///
/// let source = MemorySource::new("demo").with_file("main.go", "package main\nfunc main() {}\n");
/// let codebase = analyze_source(&source, &QualityConfig::default()).unwrap();
/// assert_eq!(codebase.features.function_count, 1);
/// ```
pub fn analyze_source(
    source: &dyn CodeSource,
    thresholds: &QualityConfig,
) -> Result<Codebase, TribunalError> {
    let files = source.load()?;
    tracing::info!(source = %source.describe(), files = files.len(), "loaded code source");
    features::analyze_codebase(files, &TreeSitterFrontend, thresholds)
}
