use serde::Serialize;
use tribunal_core::TribunalError;

use crate::source::Language;

/// Kind of structural unit a [`CodeBlock`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Function,
    Class,
    Loop,
    TypeDef,
}

/// A security-relevant behaviour detected inside a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityFlag {
    Eval,
    Exec,
    SqlStrings,
    HardcodedSecrets,
    Reflection,
    DynamicFunction,
}

/// Flags attached to a block during extraction.
///
/// Only functions carry security flags and `is_recursive`; only loops carry
/// `is_infinite`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockMetadata {
    pub uses_eval: bool,
    pub uses_exec: bool,
    pub uses_sql_strings: bool,
    pub uses_hardcoded_secrets: bool,
    pub uses_reflection: bool,
    pub uses_dynamic_function: bool,
    pub is_recursive: bool,
    pub is_infinite: bool,
}

impl BlockMetadata {
    pub fn set(&mut self, flag: SecurityFlag) {
        match flag {
            SecurityFlag::Eval => self.uses_eval = true,
            SecurityFlag::Exec => self.uses_exec = true,
            SecurityFlag::SqlStrings => self.uses_sql_strings = true,
            SecurityFlag::HardcodedSecrets => self.uses_hardcoded_secrets = true,
            SecurityFlag::Reflection => self.uses_reflection = true,
            SecurityFlag::DynamicFunction => self.uses_dynamic_function = true,
        }
    }

    /// eval, exec, dynamic function construction or reflection.
    pub fn dangerous_execution(&self) -> bool {
        self.uses_eval || self.uses_exec || self.uses_dynamic_function || self.uses_reflection
    }

    pub fn any_security_flag(&self) -> bool {
        self.dangerous_execution() || self.uses_sql_strings || self.uses_hardcoded_secrets
    }

    /// Names of the flags that are set, for logging and tags.
    pub fn active_flags(&self) -> Vec<&'static str> {
        [
            ("uses_eval", self.uses_eval),
            ("uses_exec", self.uses_exec),
            ("uses_sql_strings", self.uses_sql_strings),
            ("uses_hardcoded_secrets", self.uses_hardcoded_secrets),
            ("uses_reflection", self.uses_reflection),
            ("uses_dynamic_function", self.uses_dynamic_function),
            ("is_recursive", self.is_recursive),
            ("is_infinite", self.is_infinite),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

/// A normalized structural unit of one file.
///
/// # Examples
///
/// ```
/// use tribunal_ir::block::{BlockMetadata, BlockType, CodeBlock};
/// use tribunal_ir::source::Language;
///
/// let block = CodeBlock::new(BlockType::Function, "run", 3, 9, 2, Language::Python,
///     BlockMetadata::default()).unwrap();
/// assert_eq!(block.line_count(), 7);
/// assert!(CodeBlock::new(BlockType::Loop, "while_loop", 9, 3, 1, Language::Python,
///     BlockMetadata::default()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    #[serde(rename = "type")]
    block_type: BlockType,
    name: String,
    start_line: u32,
    end_line: u32,
    complexity: u32,
    language: Language,
    metadata: BlockMetadata,
}

impl CodeBlock {
    /// # Errors
    ///
    /// Returns [`TribunalError::Invariant`] if `end_line < start_line`,
    /// `start_line` is zero, or `complexity` is zero.
    pub fn new(
        block_type: BlockType,
        name: impl Into<String>,
        start_line: u32,
        end_line: u32,
        complexity: u32,
        language: Language,
        metadata: BlockMetadata,
    ) -> Result<Self, TribunalError> {
        if start_line == 0 || end_line < start_line {
            return Err(TribunalError::Invariant(format!(
                "block lines {start_line}..{end_line} are not a 1-indexed range"
            )));
        }
        if complexity == 0 {
            return Err(TribunalError::Invariant(
                "block complexity must be at least 1".into(),
            ));
        }
        Ok(Self {
            block_type,
            name: name.into(),
            start_line,
            end_line,
            complexity,
            language,
            metadata,
        })
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn complexity(&self) -> u32 {
        self.complexity
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn metadata(&self) -> &BlockMetadata {
        &self.metadata
    }

    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }

    pub fn contains_line(&self, line: u32) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_complexity_is_rejected() {
        let err = CodeBlock::new(
            BlockType::Function,
            "f",
            1,
            1,
            0,
            Language::Rust,
            BlockMetadata::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("complexity"));
    }

    #[test]
    fn zero_start_line_is_rejected() {
        assert!(CodeBlock::new(
            BlockType::Class,
            "C",
            0,
            4,
            1,
            Language::Java,
            BlockMetadata::default()
        )
        .is_err());
    }

    #[test]
    fn dangerous_execution_covers_reflection_and_dynamic_functions() {
        let mut meta = BlockMetadata::default();
        assert!(!meta.dangerous_execution());
        meta.set(SecurityFlag::Reflection);
        assert!(meta.dangerous_execution());

        let mut meta = BlockMetadata::default();
        meta.set(SecurityFlag::DynamicFunction);
        assert!(meta.dangerous_execution());

        let mut meta = BlockMetadata::default();
        meta.set(SecurityFlag::SqlStrings);
        assert!(!meta.dangerous_execution());
        assert!(meta.any_security_flag());
        assert_eq!(meta.active_flags(), vec!["uses_sql_strings"]);
    }

    #[test]
    fn serializes_with_type_key() {
        let block = CodeBlock::new(
            BlockType::TypeDef,
            "Point",
            1,
            3,
            1,
            Language::Go,
            BlockMetadata::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "type_def");
        assert_eq!(json["language"], "go");
        assert_eq!(json["metadata"]["is_infinite"], false);
    }
}
