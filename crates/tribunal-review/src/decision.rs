//! Maps risk, confidence and conflicts to a recommended action.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tribunal_core::{AgentKind, AgentOutput, Finding, FindingSeverity, RiskLevel, TribunalError};

use crate::conflict::ConflictInfo;

/// Penalty per unit of disagreement level.
const CONFLICT_PENALTY_RATE: f64 = 0.2;
/// Upper bound on the total conflict penalty.
const MAX_CONFLICT_PENALTY: f64 = 0.5;
/// Below this, analytic confidence is called out as moderate.
const MODERATE_CONFIDENCE: f64 = 0.8;

/// The recommended next step for a change.
///
/// # Examples
///
/// ```
/// use tribunal_core::RiskLevel;
/// use tribunal_review::decision::Action;
///
/// assert_eq!(Action::for_risk(RiskLevel::Critical), Action::ManualReviewRequired);
/// assert_eq!(Action::for_risk(RiskLevel::Low), Action::Acceptable);
/// assert_eq!(Action::ProceedWithCaution.to_string(), "proceed_with_caution");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ManualReviewRequired,
    ReviewRequired,
    ProceedWithCaution,
    Acceptable,
    /// The safety gate withheld an automated verdict.
    Defer,
}

impl Action {
    /// Action implied by the highest successful risk.
    pub fn for_risk(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Critical => Action::ManualReviewRequired,
            RiskLevel::High => Action::ReviewRequired,
            RiskLevel::Medium => Action::ProceedWithCaution,
            RiskLevel::Low | RiskLevel::None => Action::Acceptable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ManualReviewRequired => "manual_review_required",
            Action::ReviewRequired => "review_required",
            Action::ProceedWithCaution => "proceed_with_caution",
            Action::Acceptable => "acceptable",
            Action::Defer => "defer",
        }
    }

    /// One-line justification for the action.
    pub fn reasoning(self) -> &'static str {
        match self {
            Action::ManualReviewRequired => "Critical security or logic issues detected",
            Action::ReviewRequired => "High-severity issues found",
            Action::ProceedWithCaution => "Medium-severity issues detected, proceed with awareness",
            Action::Acceptable => "No significant issues detected",
            Action::Defer => "Automated verdict withheld; human review required",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual_review_required" => Ok(Action::ManualReviewRequired),
            "review_required" => Ok(Action::ReviewRequired),
            "proceed_with_caution" => Ok(Action::ProceedWithCaution),
            "acceptable" => Ok(Action::Acceptable),
            "defer" => Ok(Action::Defer),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// What one agent contributed, enough to reconstruct the decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentTrace {
    pub agent: AgentKind,
    pub success: bool,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub snippet_locations: Vec<String>,
    pub finding_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentTrace {
    pub fn of(output: &AgentOutput) -> Self {
        let snippet_locations = output
            .metadata()
            .get("snippet_locations")
            .and_then(|v| v.as_array())
            .map(|locations| {
                locations
                    .iter()
                    .filter_map(|l| l.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            agent: output.agent_type(),
            success: output.success(),
            confidence: output.confidence(),
            risk_level: output.risk_level(),
            snippet_locations,
            finding_count: output.findings().len(),
            error: output.error_message().map(String::from),
        }
    }
}

/// The synthesized verdict before the safety gate is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub highest_risk: RiskLevel,
    /// Aggregated specialist confidence the decision started from.
    pub analytic_confidence: f64,
    pub conflict_penalty: f64,
    pub decision_confidence: f64,
    pub trace: Vec<AgentTrace>,
    pub reasoning: String,
}

impl Decision {
    /// Record the decision as an agent output of kind
    /// [`AgentKind::Decision`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the trace cannot be serialized.
    pub fn to_output(&self) -> Result<AgentOutput, TribunalError> {
        let finding = Finding::new(
            self.action.as_str(),
            FindingSeverity::Info,
            self.reasoning.clone(),
        );
        Ok(AgentOutput::new(
            AgentKind::Decision,
            self.decision_confidence,
            vec![finding],
            self.highest_risk,
        )?
        .with_meta("action", self.action.as_str())
        .with_meta("analytic_confidence", self.analytic_confidence)
        .with_meta("conflict_penalty", self.conflict_penalty)
        .with_meta("trace", serde_json::to_value(&self.trace)?))
    }
}

/// Stateless decision synthesis.
pub struct DecisionSynthesizer;

impl DecisionSynthesizer {
    /// Derive the action from the highest successful risk and discount the
    /// aggregated confidence by `min(0.5, Σ 0.2 · disagreement_level)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tribunal_core::{AgentKind, AgentOutput, RiskLevel};
    /// use tribunal_review::decision::{Action, DecisionSynthesizer};
    ///
    /// let outputs = vec![
    ///     AgentOutput::new(AgentKind::Security, 0.9, vec![], RiskLevel::High).unwrap(),
    ///     AgentOutput::failed(AgentKind::Logic, "timed out"),
    /// ];
    /// let d = DecisionSynthesizer::synthesize(&outputs, 0.9, &[]);
    /// assert_eq!(d.action, Action::ReviewRequired);
    /// assert_eq!(d.decision_confidence, 0.9);
    /// assert_eq!(d.trace.len(), 2);
    /// ```
    pub fn synthesize(
        outputs: &[AgentOutput],
        aggregated_confidence: f64,
        conflicts: &[ConflictInfo],
    ) -> Decision {
        let highest_risk = outputs
            .iter()
            .filter(|o| o.success())
            .map(AgentOutput::risk_level)
            .max()
            .unwrap_or_default();
        let action = Action::for_risk(highest_risk);

        let conflict_penalty = conflicts
            .iter()
            .map(|c| CONFLICT_PENALTY_RATE * c.disagreement_level())
            .sum::<f64>()
            .min(MAX_CONFLICT_PENALTY);
        let decision_confidence = (aggregated_confidence - conflict_penalty).clamp(0.0, 1.0);

        let failed = outputs.iter().filter(|o| !o.success()).count();
        let reasoning = format!(
            "{}. {}",
            action.reasoning(),
            Self::explain(
                failed,
                conflicts.len(),
                aggregated_confidence,
                decision_confidence
            )
        );

        tracing::debug!(
            %action,
            %highest_risk,
            aggregated_confidence,
            conflict_penalty,
            decision_confidence,
            "decision synthesized"
        );

        Decision {
            action,
            highest_risk,
            analytic_confidence: aggregated_confidence,
            conflict_penalty,
            decision_confidence,
            trace: outputs.iter().map(AgentTrace::of).collect(),
            reasoning,
        }
    }

    /// Plain-English account of what moved the confidence.
    ///
    /// # Examples
    ///
    /// ```
    /// use tribunal_review::decision::DecisionSynthesizer;
    ///
    /// assert_eq!(
    ///     DecisionSynthesizer::explain(0, 0, 1.0, 1.0),
    ///     "High confidence achieved with no agent failures or conflicts."
    /// );
    /// assert_eq!(
    ///     DecisionSynthesizer::explain(2, 1, 0.6, 0.4),
    ///     "Overall confidence reduced due to 2 agent failures; decision confidence \
    ///      penalized due to disagreement between agents; analytic certainty is moderate."
    /// );
    /// ```
    pub fn explain(
        failed: usize,
        conflicts: usize,
        analytic_confidence: f64,
        decision_confidence: f64,
    ) -> String {
        if analytic_confidence >= 1.0 && failed == 0 && conflicts == 0 {
            return "High confidence achieved with no agent failures or conflicts.".to_string();
        }

        let mut points = Vec::new();
        if failed > 0 {
            let plural = if failed > 1 { "s" } else { "" };
            points.push(format!(
                "overall confidence reduced due to {failed} agent failure{plural}"
            ));
        }
        if conflicts > 0 && decision_confidence < analytic_confidence {
            points.push("decision confidence penalized due to disagreement between agents".into());
        }
        if analytic_confidence < MODERATE_CONFIDENCE {
            points.push("analytic certainty is moderate".into());
        }
        if points.is_empty() {
            return "Analysis complete with nominal confidence.".to_string();
        }

        let joined = points.join("; ");
        let mut chars = joined.chars();
        match chars.next() {
            Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tribunal_core::ConflictConfig;

    use super::*;
    use crate::conflict::{ConflictInfo, ConflictKind, ConflictResolver};

    fn ok(kind: AgentKind, risk: RiskLevel) -> AgentOutput {
        AgentOutput::new(kind, 0.9, vec![], risk).unwrap()
    }

    fn conflict(level: f64) -> ConflictInfo {
        ConflictInfo::new(
            ConflictKind::RiskDisagreement,
            vec![AgentKind::Security, AgentKind::Logic],
            level,
            vec![],
            "test",
        )
        .unwrap()
    }

    #[test]
    fn action_follows_highest_successful_risk() {
        let outputs = vec![
            ok(AgentKind::Security, RiskLevel::Medium),
            ok(AgentKind::Logic, RiskLevel::Low),
            AgentOutput::failed(AgentKind::Quality, "x"),
        ];
        let d = DecisionSynthesizer::synthesize(&outputs, 0.8, &[]);
        assert_eq!(d.action, Action::ProceedWithCaution);
        assert_eq!(d.highest_risk, RiskLevel::Medium);
        assert!(d
            .reasoning
            .starts_with("Medium-severity issues detected, proceed with awareness."));
    }

    #[test]
    fn nothing_successful_is_acceptable_risk_none() {
        let d = DecisionSynthesizer::synthesize(
            &[AgentOutput::failed(AgentKind::Security, "x")],
            0.0,
            &[],
        );
        assert_eq!(d.action, Action::Acceptable);
        assert_eq!(d.decision_confidence, 0.0);
    }

    #[test]
    fn conflict_penalty_scales_with_level() {
        let d = DecisionSynthesizer::synthesize(&[], 0.9, &[conflict(0.5)]);
        assert!((d.conflict_penalty - 0.1).abs() < 1e-12);
        assert!((d.decision_confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn conflict_penalty_is_capped_and_floored() {
        let conflicts: Vec<_> = (0..5).map(|_| conflict(1.0)).collect();
        let d = DecisionSynthesizer::synthesize(&[], 0.9, &conflicts);
        assert_eq!(d.conflict_penalty, 0.5);
        assert!((d.decision_confidence - 0.4).abs() < 1e-12);

        let d = DecisionSynthesizer::synthesize(&[], 0.3, &conflicts);
        assert_eq!(d.decision_confidence, 0.0);
    }

    #[test]
    fn trace_reconstructs_every_agent() {
        let sec = ok(AgentKind::Security, RiskLevel::Critical)
            .with_meta("snippet_locations", vec!["a.py:1-4".to_string()]);
        let logic = ok(AgentKind::Logic, RiskLevel::None);
        let outputs = vec![sec, logic];
        let conflicts = ConflictResolver::new(ConflictConfig::default()).detect(&outputs);
        let d = DecisionSynthesizer::synthesize(&outputs, 0.9, &conflicts);

        assert_eq!(d.trace.len(), 2);
        assert_eq!(d.trace[0].snippet_locations, vec!["a.py:1-4"]);
        assert_eq!(d.trace[0].risk_level, RiskLevel::Critical);
        assert!(d.trace[1].snippet_locations.is_empty());
        assert_eq!(d.action, Action::ManualReviewRequired);
        assert!((d.decision_confidence - 0.7).abs() < 1e-12);
        assert!(d.reasoning.contains("penalized due to disagreement"));
    }

    #[test]
    fn decision_output_carries_action_and_trace() {
        let outputs = vec![ok(AgentKind::Security, RiskLevel::High)];
        let d = DecisionSynthesizer::synthesize(&outputs, 0.9, &[]);
        let out = d.to_output().unwrap();
        assert_eq!(out.agent_type(), AgentKind::Decision);
        assert_eq!(out.risk_level(), RiskLevel::High);
        assert_eq!(out.metadata()["action"], "review_required");
        assert_eq!(out.metadata()["trace"][0]["agent"], "security_analysis");
        assert_eq!(out.findings()[0].kind, "review_required");
    }

    #[test]
    fn explanation_variants() {
        assert_eq!(
            DecisionSynthesizer::explain(0, 0, 0.9, 0.9),
            "Analysis complete with nominal confidence."
        );
        assert_eq!(
            DecisionSynthesizer::explain(1, 0, 0.85, 0.85),
            "Overall confidence reduced due to 1 agent failure."
        );
        assert_eq!(
            DecisionSynthesizer::explain(0, 0, 0.5, 0.5),
            "Analytic certainty is moderate."
        );
    }

    #[test]
    fn action_round_trips_through_str() {
        for a in [
            Action::ManualReviewRequired,
            Action::ReviewRequired,
            Action::ProceedWithCaution,
            Action::Acceptable,
            Action::Defer,
        ] {
            assert_eq!(a.as_str().parse::<Action>().unwrap(), a);
            assert_eq!(serde_json::to_value(a).unwrap(), a.as_str());
        }
        assert!("ship_it".parse::<Action>().is_err());
    }
}
