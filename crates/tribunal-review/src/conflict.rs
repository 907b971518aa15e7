//! Disagreement detection between specialist outputs.
//!
//! Two independent detectors run over every specialist output, failed ones
//! included: risk levels that differ by at least `risk_gap` ranks between
//! security and logic, and antonym pairs split across the findings of two
//! different agents. A failed output reports no risk, so a specialist that
//! crashed or timed out still disagrees with one that found critical issues.
//! Conflicts are never resolved automatically; they only feed the safety gate
//! and the audit trail.

use serde::Serialize;
use tribunal_core::{AgentKind, AgentOutput, ConflictConfig, Finding, RiskLevel, TribunalError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    RiskDisagreement,
    FindingContradiction,
}

/// One side of a conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictEvidence {
    pub agent: AgentKind,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    /// The finding whose wording clashed, for contradictions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding: Option<Finding>,
}

impl ConflictEvidence {
    fn of(output: &AgentOutput) -> Self {
        Self {
            agent: output.agent_type(),
            risk_level: output.risk_level(),
            confidence: output.confidence(),
            finding: None,
        }
    }
}

/// A detected disagreement between two agents.
///
/// # Examples
///
/// ```
/// use tribunal_core::AgentKind;
/// use tribunal_review::conflict::{ConflictInfo, ConflictKind};
///
/// let c = ConflictInfo::new(
///     ConflictKind::RiskDisagreement,
///     vec![AgentKind::Security, AgentKind::Logic],
///     0.5,
///     vec![],
///     "security_analysis says high, logic_analysis says low",
/// )
/// .unwrap();
/// assert_eq!(c.disagreement_level(), 0.5);
/// assert!(ConflictInfo::new(ConflictKind::RiskDisagreement, vec![], 1.5, vec![], "").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictInfo {
    conflict_type: ConflictKind,
    agents_involved: Vec<AgentKind>,
    disagreement_level: f64,
    conflicting_findings: Vec<ConflictEvidence>,
    description: String,
}

impl ConflictInfo {
    /// # Errors
    ///
    /// Returns [`TribunalError::Invariant`] if `disagreement_level` is outside
    /// `[0, 1]`.
    pub fn new(
        conflict_type: ConflictKind,
        agents_involved: Vec<AgentKind>,
        disagreement_level: f64,
        conflicting_findings: Vec<ConflictEvidence>,
        description: impl Into<String>,
    ) -> Result<Self, TribunalError> {
        if !(0.0..=1.0).contains(&disagreement_level) {
            return Err(TribunalError::Invariant(format!(
                "disagreement_level must be within [0, 1], got {disagreement_level}"
            )));
        }
        Ok(Self {
            conflict_type,
            agents_involved,
            disagreement_level,
            conflicting_findings,
            description: description.into(),
        })
    }

    pub fn conflict_type(&self) -> ConflictKind {
        self.conflict_type
    }

    pub fn agents_involved(&self) -> &[AgentKind] {
        &self.agents_involved
    }

    pub fn disagreement_level(&self) -> f64 {
        self.disagreement_level
    }

    pub fn conflicting_findings(&self) -> &[ConflictEvidence] {
        &self.conflicting_findings
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Detects risk disagreement and contradicting findings.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    config: ConflictConfig,
}

impl ConflictResolver {
    pub fn new(config: ConflictConfig) -> Self {
        Self { config }
    }

    /// All conflicts among `outputs`, risk disagreements first.
    ///
    /// # Examples
    ///
    /// ```
    /// use tribunal_core::{AgentKind, AgentOutput, ConflictConfig, RiskLevel};
    /// use tribunal_review::conflict::ConflictResolver;
    ///
    /// let outputs = vec![
    ///     AgentOutput::new(AgentKind::Security, 0.9, vec![], RiskLevel::Critical).unwrap(),
    ///     AgentOutput::new(AgentKind::Logic, 0.9, vec![], RiskLevel::None).unwrap(),
    /// ];
    /// let conflicts = ConflictResolver::new(ConflictConfig::default()).detect(&outputs);
    /// assert_eq!(conflicts.len(), 1);
    /// assert_eq!(conflicts[0].disagreement_level(), 1.0);
    /// ```
    pub fn detect(&self, outputs: &[AgentOutput]) -> Vec<ConflictInfo> {
        let all: Vec<&AgentOutput> = outputs.iter().collect();
        let mut conflicts = self.risk_disagreements(&all);
        conflicts.extend(self.contradictions(&all));
        for c in &conflicts {
            tracing::info!(
                kind = ?c.conflict_type(),
                agents = ?c.agents_involved(),
                level = c.disagreement_level(),
                "conflict detected: {}",
                c.description()
            );
        }
        conflicts
    }

    fn risk_disagreements(&self, outputs: &[&AgentOutput]) -> Vec<ConflictInfo> {
        let of_kind = |kind: AgentKind| {
            outputs
                .iter()
                .copied()
                .filter(move |o| o.agent_type() == kind)
        };

        let mut conflicts = Vec::new();
        for sec in of_kind(AgentKind::Security) {
            for logic in of_kind(AgentKind::Logic) {
                let gap = sec.risk_level().rank().abs_diff(logic.risk_level().rank());
                if gap < self.config.risk_gap {
                    continue;
                }
                let level = (f64::from(gap) / 4.0).min(1.0);
                let description = format!(
                    "{} reports {} risk but {} reports {}",
                    sec.agent_type(),
                    sec.risk_level(),
                    logic.agent_type(),
                    logic.risk_level()
                );
                if let Ok(c) = ConflictInfo::new(
                    ConflictKind::RiskDisagreement,
                    vec![sec.agent_type(), logic.agent_type()],
                    level,
                    vec![ConflictEvidence::of(sec), ConflictEvidence::of(logic)],
                    description,
                ) {
                    conflicts.push(c);
                }
            }
        }
        conflicts
    }

    fn contradictions(&self, outputs: &[&AgentOutput]) -> Vec<ConflictInfo> {
        let level = self.config.contradiction_level.clamp(0.0, 1.0);
        let mut conflicts = Vec::new();
        for (i, a) in outputs.iter().enumerate() {
            for b in &outputs[i + 1..] {
                if a.agent_type() == b.agent_type() {
                    continue;
                }
                let Some((fa, fb, wa, wb)) = self.first_contradiction(a, b) else {
                    continue;
                };
                let description = format!(
                    "{} says '{wa}' where {} says '{wb}'",
                    a.agent_type(),
                    b.agent_type()
                );
                let evidence = vec![
                    ConflictEvidence {
                        finding: Some(fa.clone()),
                        ..ConflictEvidence::of(a)
                    },
                    ConflictEvidence {
                        finding: Some(fb.clone()),
                        ..ConflictEvidence::of(b)
                    },
                ];
                if let Ok(c) = ConflictInfo::new(
                    ConflictKind::FindingContradiction,
                    vec![a.agent_type(), b.agent_type()],
                    level,
                    evidence,
                    description,
                ) {
                    conflicts.push(c);
                }
            }
        }
        conflicts
    }

    /// First antonym split across `a` and `b`. Findings are compared in
    /// order, and each finding pair is tried against every antonym pair in
    /// both directions. Matching is a case-insensitive substring test, so
    /// "unsafe" carries "safe" and "invalid" carries "valid".
    fn first_contradiction<'o>(
        &self,
        a: &'o AgentOutput,
        b: &'o AgentOutput,
    ) -> Option<(&'o Finding, &'o Finding, String, String)> {
        let pairs: Vec<(String, String)> = self
            .config
            .antonym_pairs
            .iter()
            .map(|(x, y)| (x.to_lowercase(), y.to_lowercase()))
            .collect();

        for fa in a.findings() {
            let da = fa.description.to_lowercase();
            for fb in b.findings() {
                let db = fb.description.to_lowercase();
                for (x, y) in &pairs {
                    if da.contains(x.as_str()) && db.contains(y.as_str()) {
                        return Some((fa, fb, x.clone(), y.clone()));
                    }
                    if da.contains(y.as_str()) && db.contains(x.as_str()) {
                        return Some((fa, fb, y.clone(), x.clone()));
                    }
                }
            }
        }
        None
    }
}

/// Sort conflicts by disagreement level, highest first. Ties keep detection
/// order.
pub fn prioritize(conflicts: &mut [ConflictInfo]) {
    conflicts.sort_by(|a, b| b.disagreement_level.total_cmp(&a.disagreement_level));
}

#[cfg(test)]
mod tests {
    use tribunal_core::FindingSeverity;

    use super::*;

    fn output(kind: AgentKind, risk: RiskLevel, descriptions: &[&str]) -> AgentOutput {
        let findings = descriptions
            .iter()
            .map(|d| Finding::new("note", FindingSeverity::Info, *d))
            .collect();
        AgentOutput::new(kind, 0.9, findings, risk).unwrap()
    }

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(ConflictConfig::default())
    }

    #[test]
    fn small_risk_gap_is_not_a_conflict() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::High, &[]),
            output(AgentKind::Logic, RiskLevel::Medium, &[]),
        ];
        assert!(resolver().detect(&outputs).is_empty());
    }

    #[test]
    fn risk_gap_level_is_rank_difference_over_four() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::Low, &[]),
            output(AgentKind::Logic, RiskLevel::High, &[]),
        ];
        let conflicts = resolver().detect(&outputs);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type(), ConflictKind::RiskDisagreement);
        assert_eq!(conflicts[0].disagreement_level(), 0.5);
        assert_eq!(
            conflicts[0].agents_involved(),
            &[AgentKind::Security, AgentKind::Logic]
        );
        assert_eq!(
            conflicts[0].description(),
            "security_analysis reports low risk but logic_analysis reports high"
        );
    }

    #[test]
    fn quality_risk_never_counts_as_disagreement() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::Critical, &[]),
            output(AgentKind::Quality, RiskLevel::None, &[]),
        ];
        assert!(resolver().detect(&outputs).is_empty());
    }

    #[test]
    fn failed_logic_disagrees_with_critical_security() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::Critical, &[]),
            AgentOutput::failed(AgentKind::Logic, "timed out"),
        ];
        let conflicts = resolver().detect(&outputs);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type(), ConflictKind::RiskDisagreement);
        assert_eq!(conflicts[0].disagreement_level(), 1.0);
        assert_eq!(conflicts[0].conflicting_findings()[1].confidence, 0.0);
    }

    #[test]
    fn antonyms_across_agents_contradict() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::None, &["input handling is safe"]),
            output(
                AgentKind::Quality,
                RiskLevel::None,
                &["parser looks vulnerable to deep input", "config is invalid"],
            ),
        ];
        let conflicts = resolver().detect(&outputs);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.conflict_type(), ConflictKind::FindingContradiction);
        assert_eq!(c.disagreement_level(), 0.8);
        assert_eq!(
            c.description(),
            "security_analysis says 'safe' where code_quality says 'vulnerable'"
        );
        let evidence = c.conflicting_findings();
        assert_eq!(
            evidence[1].finding.as_ref().unwrap().description,
            "parser looks vulnerable to deep input"
        );
    }

    #[test]
    fn antonyms_match_inside_longer_words() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::None, &["unsafe deserialization of input"]),
            output(AgentKind::Logic, RiskLevel::None, &["loop index is vulnerable to overflow"]),
        ];
        let conflicts = resolver().detect(&outputs);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].description(),
            "security_analysis says 'safe' where logic_analysis says 'vulnerable'"
        );

        // "invalid" on both sides holds "valid" on one of them.
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::None, &["token is invalid"]),
            output(AgentKind::Logic, RiskLevel::None, &["branch is invalid"]),
        ];
        assert_eq!(resolver().detect(&outputs).len(), 1);
    }

    #[test]
    fn findings_are_scanned_before_antonym_pairs() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::None, &["hash is correct", "cookie is safe"]),
            output(AgentKind::Logic, RiskLevel::None, &["api is vulnerable", "sum is incorrect"]),
        ];
        let conflicts = resolver().detect(&outputs);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].description(),
            "security_analysis says 'correct' where logic_analysis says 'incorrect'"
        );
        let evidence = conflicts[0].conflicting_findings();
        assert_eq!(evidence[0].finding.as_ref().unwrap().description, "hash is correct");
        assert_eq!(evidence[1].finding.as_ref().unwrap().description, "sum is incorrect");
    }

    #[test]
    fn reversed_pair_order_is_found() {
        let outputs = vec![
            output(AgentKind::Logic, RiskLevel::None, &["Result is INCORRECT"]),
            output(AgentKind::Quality, RiskLevel::None, &["Metrics are correct"]),
        ];
        let conflicts = resolver().detect(&outputs);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].description(),
            "logic_analysis says 'incorrect' where code_quality says 'correct'"
        );
    }

    #[test]
    fn both_detectors_append() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::Critical, &["endpoint is vulnerable"]),
            output(AgentKind::Logic, RiskLevel::None, &["loop bounds are safe"]),
        ];
        let mut conflicts = resolver().detect(&outputs);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].conflict_type(), ConflictKind::RiskDisagreement);
        assert_eq!(conflicts[1].conflict_type(), ConflictKind::FindingContradiction);

        prioritize(&mut conflicts);
        assert_eq!(conflicts[0].disagreement_level(), 1.0);
        assert_eq!(conflicts[1].disagreement_level(), 0.8);
    }

    #[test]
    fn conflict_serializes_with_report_field_names() {
        let outputs = vec![
            output(AgentKind::Security, RiskLevel::Critical, &[]),
            output(AgentKind::Logic, RiskLevel::None, &[]),
        ];
        let json = serde_json::to_value(&resolver().detect(&outputs)[0]).unwrap();
        assert_eq!(json["conflict_type"], "risk_disagreement");
        assert_eq!(json["agents_involved"][0], "security_analysis");
        assert_eq!(json["disagreement_level"], 1.0);
        assert_eq!(json["conflicting_findings"][1]["risk_level"], "none");
    }
}
