//! The specialist agents.
//!
//! Security and logic assess each routed snippet through a
//! [`SpecialistLlm`]; quality and feature extraction are deterministic and
//! never see code.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tribunal_core::{
    AgentKind, AgentOutput, CodeSnippet, Finding, FindingSeverity, QualityConfig, RiskLevel,
    SpecialistConfig, TribunalError,
};
use tribunal_ir::features::RawFeatures;
use tribunal_routing::{LogicInput, QualityInput, SecurityInput};

use crate::assessor::{AssessmentRequest, AssessmentSource, Focus, SpecialistLlm};

/// Tags that must never reach the logic specialist.
const SECURITY_ONLY_TAGS: [&str; 3] = ["sql", "auth", "crypto"];

/// Deep-nesting locations reported individually before summarising.
const MAX_NESTING_FINDINGS: usize = 20;

/// Highest risk implied by `findings`, `None` when empty.
pub fn risk_from_findings(findings: &[Finding]) -> RiskLevel {
    findings
        .iter()
        .map(|f| f.severity.risk())
        .max()
        .unwrap_or_default()
}

/// Assess every snippet concurrently and fold the answers into one output.
async fn assess_snippets(
    focus: Focus,
    llm: &dyn SpecialistLlm,
    features: Value,
    snippets: &[CodeSnippet],
    max_snippets: usize,
    empty_confidence: f64,
) -> Result<AgentOutput, TribunalError> {
    let kind = focus.agent_kind();
    let mut snippets = snippets;
    if snippets.len() > max_snippets {
        tracing::warn!(
            agent = %kind,
            received = snippets.len(),
            max = max_snippets,
            "too many snippets; truncating"
        );
        snippets = &snippets[..max_snippets];
    }

    let requests: Vec<AssessmentRequest> = snippets
        .iter()
        .map(|snippet| AssessmentRequest {
            focus,
            snippet: snippet.clone(),
            features: features.clone(),
        })
        .collect();
    let assessments = join_all(requests.iter().map(|r| llm.assess(r))).await;

    let mut findings = Vec::new();
    let mut confidences = Vec::with_capacity(assessments.len());
    let mut fallbacks = 0usize;
    for (snippet, assessment) in snippets.iter().zip(assessments) {
        if assessment.source == AssessmentSource::Fallback {
            fallbacks += 1;
        }
        confidences.push(assessment.confidence.clamp(0.0, 1.0));
        findings.extend(assessment.findings.into_iter().map(|mut f| {
            f.location.get_or_insert_with(|| snippet.location());
            f.filename.get_or_insert_with(|| snippet.filename().to_string());
            f.line_number.get_or_insert(snippet.start_line());
            f
        }));
    }

    let confidence = if confidences.is_empty() {
        empty_confidence
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };
    let risk = risk_from_findings(&findings);
    let locations: Vec<String> = snippets.iter().map(CodeSnippet::location).collect();

    tracing::debug!(
        agent = %kind,
        snippets = snippets.len(),
        findings = findings.len(),
        confidence,
        %risk,
        fallbacks,
        "specialist finished"
    );

    Ok(AgentOutput::new(kind, confidence, findings, risk)?
        .with_meta("snippets_analyzed", snippets.len())
        .with_meta("snippet_locations", locations)
        .with_meta("features_used", features)
        .with_meta("fallback_assessments", fallbacks))
}

/// Security review over routed snippets.
#[derive(Clone)]
pub struct SecuritySpecialist {
    llm: Arc<dyn SpecialistLlm>,
    config: SpecialistConfig,
    max_snippets: usize,
}

impl SecuritySpecialist {
    pub fn new(llm: Arc<dyn SpecialistLlm>, config: SpecialistConfig, max_snippets: usize) -> Self {
        Self {
            llm,
            config,
            max_snippets,
        }
    }

    /// # Errors
    ///
    /// Returns [`TribunalError::Serialization`] if the curated features cannot
    /// be serialized.
    pub async fn analyze(&self, input: &SecurityInput) -> Result<AgentOutput, TribunalError> {
        let features = serde_json::to_value(input.features())?;
        assess_snippets(
            Focus::Security,
            self.llm.as_ref(),
            features,
            input.snippets(),
            self.max_snippets,
            self.config.empty_security_confidence,
        )
        .await
    }
}

/// Logic review over routed, non-security snippets.
#[derive(Clone)]
pub struct LogicSpecialist {
    llm: Arc<dyn SpecialistLlm>,
    config: SpecialistConfig,
    max_snippets: usize,
}

impl LogicSpecialist {
    pub fn new(llm: Arc<dyn SpecialistLlm>, config: SpecialistConfig, max_snippets: usize) -> Self {
        Self {
            llm,
            config,
            max_snippets,
        }
    }

    /// # Errors
    ///
    /// Returns [`TribunalError::Serialization`] if the curated features cannot
    /// be serialized.
    pub async fn analyze(&self, input: &LogicInput) -> Result<AgentOutput, TribunalError> {
        for snippet in input.snippets() {
            if let Some(tag) = SECURITY_ONLY_TAGS.iter().find(|t| snippet.has_tag(t)) {
                tracing::error!(
                    location = %snippet.location(),
                    tag,
                    "isolation breach: security-tagged snippet routed to logic"
                );
            }
        }
        let features = serde_json::to_value(input.features())?;
        assess_snippets(
            Focus::Logic,
            self.llm.as_ref(),
            features,
            input.snippets(),
            self.max_snippets,
            self.config.empty_logic_confidence,
        )
        .await
    }
}

/// Advisory, metrics-only quality review.
#[derive(Debug, Clone)]
pub struct QualitySpecialist {
    config: QualityConfig,
}

impl QualitySpecialist {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// Returns [`TribunalError::Invariant`] if the configured confidence is
    /// outside `[0, 1]`, or a serialization error for the metrics.
    pub fn analyze(&self, input: &QualityInput) -> Result<AgentOutput, TribunalError> {
        let features = input.features();
        let metrics = &features.metrics;
        let mut findings = Vec::new();

        if f64::from(metrics.max_function_length) > self.config.max_function_length {
            findings.push(
                Finding::new(
                    "long_function",
                    FindingSeverity::Low,
                    format!(
                        "Longest function spans {} lines (limit {})",
                        metrics.max_function_length, self.config.max_function_length
                    ),
                )
                .with_evidence(format!(
                    "average function length {:.1}",
                    metrics.avg_function_length
                )),
            );
        }
        if metrics.max_complexity > self.config.max_complexity {
            findings.push(
                Finding::new(
                    "high_complexity",
                    FindingSeverity::Medium,
                    format!(
                        "Maximum cyclomatic complexity {} exceeds {}",
                        metrics.max_complexity, self.config.max_complexity
                    ),
                )
                .with_evidence(format!("average complexity {:.2}", metrics.avg_complexity)),
            );
        }
        for long in &features.long_files {
            findings.push(
                Finding::new(
                    "long_file",
                    FindingSeverity::Info,
                    format!(
                        "File exceeds {} lines ({} lines)",
                        self.config.long_file_loc, long.loc
                    ),
                )
                .at(long.file.clone(), 1),
            );
        }
        for loc in features
            .high_nesting_locations
            .iter()
            .take(MAX_NESTING_FINDINGS)
        {
            findings.push(
                Finding::new(
                    "deep_nesting",
                    FindingSeverity::Medium,
                    format!("Deep nesting detected (depth {})", loc.depth),
                )
                .at(loc.file.clone(), loc.line as u32),
            );
        }
        let hidden = features
            .high_nesting_locations
            .len()
            .saturating_sub(MAX_NESTING_FINDINGS);
        if hidden > 0 {
            findings.push(Finding::new(
                "deep_nesting",
                FindingSeverity::Info,
                format!("{hidden} more deeply nested locations not listed"),
            ));
        }

        let risk = if findings.iter().any(|f| f.severity != FindingSeverity::Info) {
            RiskLevel::Low
        } else {
            RiskLevel::None
        };
        if findings.is_empty() {
            findings.push(Finding::new(
                "structure",
                FindingSeverity::Info,
                format!(
                    "Overall codebase size: {} lines. Structure appears clean.",
                    features.total_loc
                ),
            ));
        }

        Ok(
            AgentOutput::new(AgentKind::Quality, self.config.confidence, findings, risk)?
                .with_meta("quality_metrics", serde_json::to_value(features)?)
                .with_meta("advisory", true)
                .with_meta("blocking", false),
        )
    }
}

/// Record feature extraction as an agent output: informational findings
/// only, full confidence, no risk.
///
/// # Errors
///
/// Returns a serialization error if the features cannot be serialized.
pub fn feature_output(raw: &RawFeatures) -> Result<AgentOutput, TribunalError> {
    let mut findings: Vec<Finding> = raw
        .file_extensions
        .iter()
        .map(|(ext, count)| {
            let mut f = Finding::new(
                "language_detection",
                FindingSeverity::Info,
                format!(
                    "Identified core logic in {} ({count} files)",
                    ext.to_uppercase()
                ),
            );
            f.filename = Some("Global Scan".to_string());
            f
        })
        .collect();
    if raw.total_loc > 500 {
        let mut f = Finding::new(
            "codebase_size",
            FindingSeverity::Info,
            format!(
                "Overall codebase contains {} lines of active code.",
                raw.total_loc
            ),
        );
        f.filename = Some("Global Scan".to_string());
        findings.push(f);
    }

    Ok(
        AgentOutput::new(AgentKind::FeatureExtraction, 1.0, findings, RiskLevel::None)?
            .with_meta("features", serde_json::to_value(raw)?)
            .with_meta("file_count", json!(raw.file_count)),
    )
}
