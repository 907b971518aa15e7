use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tribunal_core::TribunalError;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// Programming language detected from file extension.
///
/// # Examples
///
/// ```
/// use tribunal_ir::source::Language;
///
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("py"), Language::Python);
/// assert_eq!(Language::from_extension("java"), Language::Java);
/// assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
/// assert_eq!(Language::from_extension("hpp"), Language::Cpp);
/// assert_eq!(Language::from_extension("txt"), Language::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Unknown,
}

impl Language {
    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" => Language::Python,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            _ => Language::Unknown,
        }
    }

    /// Detect language from a path-like filename.
    pub fn from_path(path: &str) -> Self {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Get the tree-sitter language grammar for this language.
    ///
    /// Returns `None` for `Language::Unknown`.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file of the snapshot under review.
///
/// # Examples
///
/// ```
/// use tribunal_ir::source::{Language, SourceFile};
///
/// let file = SourceFile::new("src/app.py", "def run():\n    pass\n");
/// assert_eq!(file.language, Language::Python);
/// assert_eq!(file.extension(), "py");
/// ```
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the snapshot root, `/`-separated.
    pub path: String,
    /// Detected programming language.
    pub language: Language,
    /// Full file content.
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            language: Language::from_path(&path),
            path,
            content: content.into(),
        }
    }

    /// Lower-cased extension, or `"unknown"` when the name has none.
    pub fn extension(&self) -> String {
        Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "unknown".into())
    }
}

/// A read-only snapshot of a codebase: `filename -> content`.
///
/// Implementations skip files they cannot or should not serve (binary,
/// oversized, unreadable) and only fail when the snapshot as a whole is
/// unreachable.
pub trait CodeSource: Send + Sync {
    /// Human-readable identity, used in logs.
    fn describe(&self) -> String;

    /// Load every file of the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Source`] when the snapshot cannot be read.
    fn load(&self) -> Result<BTreeMap<String, String>, TribunalError>;
}

/// A directory on the local filesystem, walked with `.gitignore` support.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use tribunal_ir::source::{CodeSource, FsSource};
///
/// let files = FsSource::new(Path::new("."), 10 * 1024 * 1024).load().unwrap();
/// for name in files.keys() {
///     println!("{name}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
    max_file_bytes: u64,
}

impl FsSource {
    pub fn new(root: &Path, max_file_bytes: u64) -> Self {
        Self {
            root: root.to_path_buf(),
            max_file_bytes,
        }
    }
}

impl CodeSource for FsSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn load(&self) -> Result<BTreeMap<String, String>, TribunalError> {
        if !self.root.is_dir() {
            return Err(TribunalError::Source(format!(
                "{} is not a readable directory",
                self.root.display()
            )));
        }

        let walker = ignore::WalkBuilder::new(&self.root).build();
        let mut files = BTreeMap::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();

            let metadata = match std::fs::metadata(path) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.len() > self.max_file_bytes {
                tracing::info!(
                    path = %path.display(),
                    bytes = metadata.len(),
                    limit = self.max_file_bytes,
                    "skipping oversized file"
                );
                continue;
            }

            // Non-UTF-8 content is treated like binary.
            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(_) => continue,
            };

            let check_len = content.len().min(BINARY_CHECK_SIZE);
            if content.as_bytes()[..check_len].contains(&0) {
                continue;
            }

            let relative = match path.strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => path,
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            files.insert(name, content);
        }

        Ok(files)
    }
}

/// An in-memory snapshot, for callers that already hold the files.
///
/// # Examples
///
/// ```
/// use tribunal_ir::source::{CodeSource, MemorySource};
///
/// let source = MemorySource::new("demo").with_file("a.py", "x = 1\n");
/// assert_eq!(source.load().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    files: BTreeMap<String, String>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl From<BTreeMap<String, String>> for MemorySource {
    fn from(files: BTreeMap<String, String>) -> Self {
        Self {
            name: "memory".into(),
            files,
        }
    }
}

impl CodeSource for MemorySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<BTreeMap<String, String>, TribunalError> {
        Ok(self.files.clone())
    }
}
