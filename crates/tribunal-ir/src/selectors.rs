//! Deterministic filters over extracted blocks.
//!
//! The security and logic selectors hand back borrowed blocks, capped at
//! [`MAX_SELECTED_BLOCKS`]. The quality selector can only produce
//! [`QualityMetrics`]: it has no way to return a block or any source text.

use serde::Serialize;

use crate::block::{BlockType, CodeBlock};

/// Upper bound on blocks a selector returns for one file.
pub const MAX_SELECTED_BLOCKS: usize = 5;

/// Complexity at which a block is interesting to the logic specialist.
pub const LOGIC_COMPLEXITY_THRESHOLD: u32 = 4;

/// Why the security selector picked a block. Rules are tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityReason {
    DangerousExecution,
    SqlUsage,
    HardcodedSecret,
}

impl SecurityReason {
    /// Relevance assigned to snippets built from a block picked for this reason.
    pub fn relevance(self) -> f64 {
        match self {
            SecurityReason::DangerousExecution => 1.0,
            SecurityReason::SqlUsage => 0.9,
            SecurityReason::HardcodedSecret => 0.8,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            SecurityReason::DangerousExecution => "dangerous_execution",
            SecurityReason::SqlUsage => "sql",
            SecurityReason::HardcodedSecret => "secrets",
        }
    }
}

/// A block chosen by [`SecuritySelector`] together with the rule that fired.
#[derive(Debug, Clone, Copy)]
pub struct SecurityPick<'a> {
    pub block: &'a CodeBlock,
    pub reason: SecurityReason,
}

/// Picks blocks worth a security review.
///
/// # Examples
///
/// ```
/// use tribunal_ir::block::{BlockMetadata, BlockType, CodeBlock};
/// use tribunal_ir::selectors::{SecurityReason, SecuritySelector};
/// use tribunal_ir::source::Language;
///
/// let meta = BlockMetadata { uses_eval: true, ..Default::default() };
/// let block = CodeBlock::new(BlockType::Function, "run", 1, 2, 1, Language::Python, meta).unwrap();
/// let picks = SecuritySelector::select(std::slice::from_ref(&block));
/// assert_eq!(picks[0].reason, SecurityReason::DangerousExecution);
/// ```
pub struct SecuritySelector;

impl SecuritySelector {
    /// First matching rule, or `None` if the block is not security relevant.
    pub fn classify(block: &CodeBlock) -> Option<SecurityReason> {
        let meta = block.metadata();
        if meta.dangerous_execution() {
            Some(SecurityReason::DangerousExecution)
        } else if meta.uses_sql_strings && block.complexity() > 1 {
            // A lone SQL constant is not worth a review.
            Some(SecurityReason::SqlUsage)
        } else if meta.uses_hardcoded_secrets {
            Some(SecurityReason::HardcodedSecret)
        } else {
            None
        }
    }

    pub fn select(blocks: &[CodeBlock]) -> Vec<SecurityPick<'_>> {
        blocks
            .iter()
            .filter_map(|block| {
                Self::classify(block).map(|reason| SecurityPick { block, reason })
            })
            .take(MAX_SELECTED_BLOCKS)
            .collect()
    }
}

/// Picks complex, recursive, or non-terminating blocks, most complex first.
pub struct LogicSelector;

impl LogicSelector {
    pub fn qualifies(block: &CodeBlock) -> bool {
        let meta = block.metadata();
        block.complexity() >= LOGIC_COMPLEXITY_THRESHOLD
            || (block.block_type() == BlockType::Function && meta.is_recursive)
            || (block.block_type() == BlockType::Loop && meta.is_infinite)
    }

    pub fn select(blocks: &[CodeBlock]) -> Vec<&CodeBlock> {
        let mut selected: Vec<&CodeBlock> =
            blocks.iter().filter(|b| Self::qualifies(b)).collect();
        // Stable: equal complexity keeps source order.
        selected.sort_by(|a, b| b.complexity().cmp(&a.complexity()));
        selected.truncate(MAX_SELECTED_BLOCKS);
        selected
    }
}

/// Aggregate function metrics; the only thing the quality path ever sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub avg_function_length: f64,
    pub max_function_length: u32,
    pub avg_complexity: f64,
    pub max_complexity: u32,
    pub function_count: usize,
}

pub struct QualitySelector;

impl QualitySelector {
    /// # Examples
    ///
    /// ```
    /// use tribunal_ir::selectors::QualitySelector;
    ///
    /// let metrics = QualitySelector::metrics(&[]);
    /// assert_eq!(metrics.function_count, 0);
    /// assert_eq!(metrics.avg_complexity, 0.0);
    /// ```
    pub fn metrics(blocks: &[CodeBlock]) -> QualityMetrics {
        let functions: Vec<&CodeBlock> = blocks
            .iter()
            .filter(|b| b.block_type() == BlockType::Function)
            .collect();
        if functions.is_empty() {
            return QualityMetrics::default();
        }

        let count = functions.len();
        let total_len: u64 = functions.iter().map(|f| u64::from(f.line_count())).sum();
        let total_cx: u64 = functions.iter().map(|f| u64::from(f.complexity())).sum();

        QualityMetrics {
            avg_function_length: round2(total_len as f64 / count as f64),
            max_function_length: functions
                .iter()
                .map(|f| f.line_count())
                .max()
                .unwrap_or(0),
            avg_complexity: round2(total_cx as f64 / count as f64),
            max_complexity: functions.iter().map(|f| f.complexity()).max().unwrap_or(0),
            function_count: count,
        }
    }
}

/// Round to two decimal places.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
