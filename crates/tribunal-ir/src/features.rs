//! Whole-codebase feature extraction.
//!
//! This is the only pass that reads every file. Everything downstream works
//! from the [`Codebase`] it produces.

use std::collections::BTreeMap;

use serde::Serialize;
use tribunal_core::{QualityConfig, TribunalError};

use crate::block::{BlockType, CodeBlock};
use crate::extractor::extract_blocks;
use crate::selectors::{round2, QualityMetrics, QualitySelector};
use crate::source::{Language, SourceFile};
use crate::syntax::SyntaxFrontend;

/// Columns a tab counts for when measuring indentation.
const TAB_WIDTH: usize = 4;

/// One file after parsing and block extraction.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub file: SourceFile,
    pub blocks: Vec<CodeBlock>,
    /// Whether the frontend produced a tree for this file.
    pub parsed: bool,
    /// Non-blank lines.
    pub loc: usize,
    pub max_nesting: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestingLocation {
    pub file: String,
    pub line: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongFile {
    pub file: String,
    pub loc: usize,
}

/// Union of block security flags across the codebase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SecuritySignals {
    pub has_eval: bool,
    pub has_exec: bool,
    pub has_sql_strings: bool,
    pub has_hardcoded_secrets: bool,
    pub has_reflection: bool,
    pub has_dynamic_function: bool,
}

/// Raw, uncurated codebase features. Specialists never see this directly.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawFeatures {
    pub total_loc: usize,
    pub file_count: usize,
    /// Files per detected language.
    pub languages: BTreeMap<Language, usize>,
    /// Files per lower-cased extension.
    pub file_extensions: BTreeMap<String, usize>,
    /// Mean file size in bytes.
    pub average_file_size: f64,
    pub max_nesting_depth: usize,
    pub high_nesting_locations: Vec<NestingLocation>,
    pub long_files: Vec<LongFile>,
    pub function_count: usize,
    pub class_count: usize,
    pub loop_count: usize,
    pub type_def_count: usize,
    pub infinite_loop_count: usize,
    pub recursive_function_count: usize,
    /// Files with a known language that failed to parse, plus files without a grammar.
    pub unparsed_files: usize,
    pub security_signals: SecuritySignals,
    pub quality: QualityMetrics,
}

/// The analysed snapshot.
#[derive(Debug, Clone)]
pub struct Codebase {
    pub files: Vec<FileAnalysis>,
    pub features: RawFeatures,
}

impl Codebase {
    pub fn blocks(&self) -> impl Iterator<Item = &CodeBlock> {
        self.files.iter().flat_map(|f| f.blocks.iter())
    }
}

/// Parse every file and compute [`RawFeatures`].
///
/// A file that fails to parse contributes text metrics but no blocks.
///
/// # Errors
///
/// Returns [`TribunalError::Extraction`] when there is nothing to analyse.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use tribunal_core::QualityConfig;
/// use tribunal_ir::features::analyze_codebase;
/// use tribunal_ir::syntax::TreeSitterFrontend;
///
/// let mut files = BTreeMap::new();
/// files.insert("app.py".to_string(), "def run():\n    return 1\n".to_string());
/// let codebase = analyze_codebase(files, &TreeSitterFrontend, &QualityConfig::default()).unwrap();
/// assert_eq!(codebase.features.function_count, 1);
/// assert_eq!(codebase.features.total_loc, 2);
/// ```
pub fn analyze_codebase(
    files: BTreeMap<String, String>,
    frontend: &dyn SyntaxFrontend,
    thresholds: &QualityConfig,
) -> Result<Codebase, TribunalError> {
    if files.is_empty() {
        return Err(TribunalError::Extraction("no files to analyze".into()));
    }

    let mut features = RawFeatures {
        file_count: files.len(),
        ..Default::default()
    };
    let mut analyses = Vec::with_capacity(files.len());
    let mut total_bytes = 0usize;

    for (path, content) in files {
        let file = SourceFile::new(path, content);
        total_bytes += file.content.len();
        *features.languages.entry(file.language).or_default() += 1;
        *features.file_extensions.entry(file.extension()).or_default() += 1;

        let (blocks, parsed) = match frontend.parse(file.language, &file.content) {
            Some(tree) => (extract_blocks(&tree, &file.content, file.language), true),
            None => (Vec::new(), false),
        };
        if !parsed {
            features.unparsed_files += 1;
        }

        let mut loc = 0;
        let mut max_nesting = 0;
        for (idx, line) in file.content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            loc += 1;
            let depth = indent_columns(line) / TAB_WIDTH;
            if depth > thresholds.high_nesting_depth {
                features.high_nesting_locations.push(NestingLocation {
                    file: file.path.clone(),
                    line: idx + 1,
                    depth,
                });
            }
            max_nesting = max_nesting.max(depth);
        }

        features.total_loc += loc;
        features.max_nesting_depth = features.max_nesting_depth.max(max_nesting);
        if loc > thresholds.long_file_loc {
            features.long_files.push(LongFile {
                file: file.path.clone(),
                loc,
            });
        }

        for block in &blocks {
            let meta = block.metadata();
            match block.block_type() {
                BlockType::Function => {
                    features.function_count += 1;
                    if meta.is_recursive {
                        features.recursive_function_count += 1;
                    }
                }
                BlockType::Class => features.class_count += 1,
                BlockType::TypeDef => features.type_def_count += 1,
                BlockType::Loop => {
                    features.loop_count += 1;
                    if meta.is_infinite {
                        features.infinite_loop_count += 1;
                    }
                }
            }
            let s = &mut features.security_signals;
            s.has_eval |= meta.uses_eval;
            s.has_exec |= meta.uses_exec;
            s.has_sql_strings |= meta.uses_sql_strings;
            s.has_hardcoded_secrets |= meta.uses_hardcoded_secrets;
            s.has_reflection |= meta.uses_reflection;
            s.has_dynamic_function |= meta.uses_dynamic_function;
        }

        analyses.push(FileAnalysis {
            file,
            blocks,
            parsed,
            loc,
            max_nesting,
        });
    }

    features.average_file_size = round2(total_bytes as f64 / features.file_count as f64);
    let all_blocks: Vec<CodeBlock> = analyses
        .iter()
        .flat_map(|a| a.blocks.iter().cloned())
        .collect();
    features.quality = QualitySelector::metrics(&all_blocks);

    tracing::debug!(
        files = features.file_count,
        loc = features.total_loc,
        functions = features.function_count,
        unparsed = features.unparsed_files,
        "features extracted"
    );

    Ok(Codebase {
        files: analyses,
        features,
    })
}

fn indent_columns(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::TreeSitterFrontend;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_snapshot_is_an_extraction_error() {
        let err =
            analyze_codebase(BTreeMap::new(), &TreeSitterFrontend, &QualityConfig::default())
                .unwrap_err();
        assert!(matches!(err, TribunalError::Extraction(_)));
    }

    #[test]
    fn counts_blocks_and_signals() {
        let snapshot = files(&[
            (
                "a.py",
                "class A:\n    def run(self, x):\n        return eval(x)\n\nwhile True:\n    pass\n",
            ),
            ("b.js", "function f(n) { return n ? f(n - 1) : 0; }\n"),
            ("README.md", "# notes\n\nsome text\n"),
        ]);
        let cb = analyze_codebase(snapshot, &TreeSitterFrontend, &QualityConfig::default()).unwrap();
        let f = &cb.features;
        assert_eq!(f.file_count, 3);
        assert_eq!(f.function_count, 2);
        assert_eq!(f.class_count, 1);
        assert_eq!(f.loop_count, 1);
        assert_eq!(f.infinite_loop_count, 1);
        assert_eq!(f.recursive_function_count, 1);
        assert_eq!(f.unparsed_files, 1);
        assert!(f.security_signals.has_eval);
        assert!(!f.security_signals.has_exec);
        assert_eq!(f.languages[&Language::Python], 1);
        assert_eq!(f.file_extensions["md"], 1);
        assert_eq!(f.quality.function_count, 2);
        assert_eq!(cb.blocks().count(), 4);
    }

    #[test]
    fn nesting_and_long_files() {
        let deep = format!("{}x = 1\n\tif y:\n", " ".repeat(24));
        let long: String = (0..210).map(|i| format!("v{i} = {i}\n")).collect();
        let snapshot = files(&[("deep.py", deep.as_str()), ("long.py", long.as_str())]);
        let cb = analyze_codebase(snapshot, &TreeSitterFrontend, &QualityConfig::default()).unwrap();
        let f = &cb.features;
        assert_eq!(f.max_nesting_depth, 6);
        assert_eq!(
            f.high_nesting_locations,
            vec![NestingLocation {
                file: "deep.py".into(),
                line: 1,
                depth: 6
            }]
        );
        assert_eq!(
            f.long_files,
            vec![LongFile {
                file: "long.py".into(),
                loc: 210
            }]
        );
        assert_eq!(f.total_loc, 212);
    }

    #[test]
    fn tabs_count_as_four_columns() {
        assert_eq!(indent_columns("\t\tx"), 8);
        assert_eq!(indent_columns("  \tx"), 6);
        assert_eq!(indent_columns("x"), 0);
    }
}
