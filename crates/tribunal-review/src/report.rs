//! The final, serializable outcome of one analysis run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tribunal_core::{AgentKind, AgentOutput, FindingSeverity, RiskLevel, TribunalError};

use crate::conflict::ConflictInfo;
use crate::decision::Action;

/// Everything a caller needs to act on, or to audit, a verdict.
///
/// `deferred` is true exactly when `action_recommended` is
/// [`Action::Defer`], and `deferral_reason` is present exactly when
/// `deferred` is true.
///
/// # Examples
///
/// ```
/// use tribunal_core::TribunalError;
/// use tribunal_review::decision::Action;
/// use tribunal_review::report::FinalReport;
///
/// let report = FinalReport::failed("demo", &TribunalError::Extraction("no files".into()));
/// assert!(report.deferred);
/// assert_eq!(report.action_recommended, Action::Defer);
/// assert_eq!(report.overall_confidence, 0.0);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub repository_url: String,
    pub timestamp: DateTime<Utc>,
    /// Weighted specialist confidence the safety gate judged. The
    /// conflict-penalized figure is on the decision output.
    pub overall_confidence: f64,
    pub overall_risk_level: RiskLevel,
    pub agent_outputs: Vec<AgentOutput>,
    pub conflicts: Vec<ConflictInfo>,
    pub recommendation: String,
    pub action_recommended: Action,
    pub deferred: bool,
    pub deferral_reason: Option<String>,
    /// Run diagnostics: system health, pipeline states, timings.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl FinalReport {
    /// A deferred report for a run that could not produce a verdict.
    pub fn failed(repository_url: impl Into<String>, error: &TribunalError) -> Self {
        Self {
            repository_url: repository_url.into(),
            timestamp: Utc::now(),
            overall_confidence: 0.0,
            overall_risk_level: RiskLevel::None,
            agent_outputs: Vec::new(),
            conflicts: Vec::new(),
            recommendation: "Analysis failed".to_string(),
            action_recommended: Action::Defer,
            deferred: true,
            deferral_reason: Some(error.to_string()),
            metadata: BTreeMap::new(),
        }
    }

    /// Output of the given agent, if it ran.
    pub fn output(&self, kind: AgentKind) -> Option<&AgentOutput> {
        self.agent_outputs.iter().find(|o| o.agent_type() == kind)
    }

    /// Findings of the specialists, highest severity first.
    fn ranked_findings(&self) -> Vec<(AgentKind, &tribunal_core::Finding)> {
        let mut findings: Vec<_> = self
            .agent_outputs
            .iter()
            .filter(|o| o.agent_type().is_specialist())
            .flat_map(|o| o.findings().iter().map(move |f| (o.agent_type(), f)))
            .filter(|(_, f)| f.severity != FindingSeverity::Info)
            .collect();
        findings.sort_by_key(|(_, f)| std::cmp::Reverse(f.severity.risk()));
        findings
    }

    /// Render the report as markdown.
    ///
    /// # Examples
    ///
    /// ```
    /// use tribunal_core::TribunalError;
    /// use tribunal_review::report::FinalReport;
    ///
    /// let md = FinalReport::failed("demo", &TribunalError::Cancelled).to_markdown();
    /// assert!(md.contains("# Tribunal Report"));
    /// assert!(md.contains("**Deferred:**"));
    /// ```
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Tribunal Report\n\n");
        out.push_str(&format!(
            "**Repository:** {} | **Action:** `{}` | **Risk:** {} | **Confidence:** {:.0}%\n\n",
            self.repository_url,
            self.action_recommended,
            self.overall_risk_level,
            self.overall_confidence * 100.0,
        ));
        if let Some(reason) = &self.deferral_reason {
            out.push_str(&format!("> **Deferred:** {reason}\n\n"));
        }
        out.push_str(&format!("{}\n\n", self.recommendation));

        out.push_str("## Agents\n\n");
        out.push_str("| Agent | Status | Confidence | Risk | Findings |\n");
        out.push_str("|-------|--------|------------|------|----------|\n");
        for o in &self.agent_outputs {
            let status = if o.success() { "ok" } else { "failed" };
            out.push_str(&format!(
                "| {} | {} | {:.2} | {} | {} |\n",
                o.agent_type(),
                status,
                o.confidence(),
                o.risk_level(),
                o.findings().len(),
            ));
        }
        out.push('\n');

        if !self.conflicts.is_empty() {
            out.push_str("## Conflicts\n\n");
            for c in &self.conflicts {
                out.push_str(&format!(
                    "- **{:.2}** {}\n",
                    c.disagreement_level(),
                    c.description()
                ));
            }
            out.push('\n');
        }

        let findings = self.ranked_findings();
        if findings.is_empty() {
            out.push_str("No issues found.\n");
        } else {
            out.push_str("## Findings\n\n");
            for (agent, f) in findings {
                let location = f.location.as_deref().unwrap_or("unknown");
                out.push_str(&format!(
                    "- **{}** `{}` {} ({agent})\n",
                    f.severity, location, f.description
                ));
            }
        }
        out
    }
}

impl fmt::Display for FinalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tribunal Report")?;
        writeln!(f, "===============")?;
        writeln!(
            f,
            "Repository: {} | Action: {} | Risk: {} | Confidence: {:.2}\n",
            self.repository_url,
            self.action_recommended,
            self.overall_risk_level,
            self.overall_confidence,
        )?;
        if let Some(reason) = &self.deferral_reason {
            writeln!(f, "DEFERRED: {reason}")?;
        }
        writeln!(f, "{}\n", self.recommendation)?;

        for o in &self.agent_outputs {
            match o.error_message() {
                Some(err) => writeln!(f, "  {:<20} FAILED  {err}", o.agent_type().to_string())?,
                None => writeln!(
                    f,
                    "  {:<20} {:.2}  {:<8} {} finding(s)",
                    o.agent_type().to_string(),
                    o.confidence(),
                    o.risk_level().to_string(),
                    o.findings().len(),
                )?,
            }
        }
        writeln!(f)?;

        for c in &self.conflicts {
            writeln!(f, "[CONFLICT {:.2}] {}", c.disagreement_level(), c.description())?;
        }

        let findings = self.ranked_findings();
        if findings.is_empty() {
            writeln!(f, "No issues found.")?;
        } else {
            for (agent, finding) in findings {
                writeln!(
                    f,
                    "[{}] {} ({agent})",
                    finding.severity.to_string().to_uppercase(),
                    finding.location.as_deref().unwrap_or("unknown"),
                )?;
                writeln!(f, "  {}", finding.description)?;
            }
        }
        Ok(())
    }
}
