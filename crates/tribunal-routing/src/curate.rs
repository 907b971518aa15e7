//! Per-specialist projections of [`RawFeatures`].
//!
//! Each projection carries only what its specialist is allowed to see. None of
//! them hold source text.

use serde::Serialize;
use tribunal_ir::features::{LongFile, NestingLocation, RawFeatures};
use tribunal_ir::selectors::{round2, QualityMetrics};
use tribunal_ir::source::Language;

/// Boolean risk signals plus size, for the security specialist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityFeatures {
    pub has_eval: bool,
    pub has_exec: bool,
    pub has_sql: bool,
    pub has_hardcoded_secrets: bool,
    pub has_reflection: bool,
    pub has_dynamic_function: bool,
    /// Coarse language-level indicators such as `dynamic_language`.
    pub risk_indicators: Vec<String>,
    pub total_loc: usize,
}

impl SecurityFeatures {
    pub fn from_raw(raw: &RawFeatures) -> Self {
        let s = raw.security_signals;
        let has = |lang: Language| raw.languages.contains_key(&lang);

        let mut risk_indicators = Vec::new();
        if has(Language::Python) || has(Language::JavaScript) || has(Language::TypeScript) {
            risk_indicators.push("dynamic_language".to_string());
        }
        if has(Language::C) || has(Language::Cpp) {
            risk_indicators.push("memory_unsafe_language".to_string());
        }
        if raw.unparsed_files > 0 {
            risk_indicators.push("unparsed_files".to_string());
        }

        Self {
            has_eval: s.has_eval,
            has_exec: s.has_exec,
            has_sql: s.has_sql_strings,
            has_hardcoded_secrets: s.has_hardcoded_secrets,
            has_reflection: s.has_reflection,
            has_dynamic_function: s.has_dynamic_function,
            risk_indicators,
            total_loc: raw.total_loc,
        }
    }

    pub fn any_signal(&self) -> bool {
        self.has_eval
            || self.has_exec
            || self.has_sql
            || self.has_hardcoded_secrets
            || self.has_reflection
            || self.has_dynamic_function
    }
}

/// Nesting and complexity aggregates for the logic specialist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicFeatures {
    pub max_nesting_depth: usize,
    pub high_nesting_count: usize,
    pub function_count: usize,
    pub class_count: usize,
    pub loop_count: usize,
    pub infinite_loop_count: usize,
    pub recursive_function_count: usize,
    pub avg_complexity: f64,
    pub max_complexity: u32,
    pub total_loc: usize,
}

impl LogicFeatures {
    pub fn from_raw(raw: &RawFeatures) -> Self {
        Self {
            max_nesting_depth: raw.max_nesting_depth,
            high_nesting_count: raw.high_nesting_locations.len(),
            function_count: raw.function_count,
            class_count: raw.class_count,
            loop_count: raw.loop_count,
            infinite_loop_count: raw.infinite_loop_count,
            recursive_function_count: raw.recursive_function_count,
            avg_complexity: raw.quality.avg_complexity,
            max_complexity: raw.quality.max_complexity,
            total_loc: raw.total_loc,
        }
    }
}

/// Length and complexity aggregates for the quality specialist. Paths appear
/// only as labels on numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityFeatures {
    pub metrics: QualityMetrics,
    pub total_loc: usize,
    pub file_count: usize,
    pub average_file_size: f64,
    pub max_nesting_depth: usize,
    pub class_count: usize,
    pub long_files: Vec<LongFile>,
    pub high_nesting_locations: Vec<NestingLocation>,
    /// 0..=100, higher is easier to maintain.
    pub maintainability_index: f64,
}

impl QualityFeatures {
    pub fn from_raw(raw: &RawFeatures) -> Self {
        let maintainability = if raw.total_loc == 0 {
            100.0
        } else {
            (100.0 - raw.total_loc as f64 / 100.0 - raw.max_nesting_depth as f64 * 5.0)
                .clamp(0.0, 100.0)
        };
        Self {
            metrics: raw.quality,
            total_loc: raw.total_loc,
            file_count: raw.file_count,
            average_file_size: raw.average_file_size,
            max_nesting_depth: raw.max_nesting_depth,
            class_count: raw.class_count,
            long_files: raw.long_files.clone(),
            high_nesting_locations: raw.high_nesting_locations.clone(),
            maintainability_index: round2(maintainability),
        }
    }
}
