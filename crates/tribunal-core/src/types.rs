use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TribunalError;

/// Ordinal risk level assigned by a specialist or to a whole report.
///
/// Ordering follows severity, so `max()` over a set of levels yields the
/// highest observed risk.
///
/// # Examples
///
/// ```
/// use tribunal_core::RiskLevel;
///
/// assert!(RiskLevel::Critical > RiskLevel::High);
/// assert_eq!(RiskLevel::Medium.rank(), 2);
/// let r: RiskLevel = serde_json::from_str("\"critical\"").unwrap();
/// assert_eq!(r, RiskLevel::Critical);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Numeric rank: `None = 0` through `Critical = 4`.
    pub fn rank(self) -> u8 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
            RiskLevel::Critical => 4,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::None => write!(f, "none"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(RiskLevel::None),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// The closed set of analysis units a run can produce output for.
///
/// # Examples
///
/// ```
/// use tribunal_core::AgentKind;
///
/// assert_eq!(AgentKind::Security.to_string(), "security_analysis");
/// assert_eq!("code_quality".parse::<AgentKind>().unwrap(), AgentKind::Quality);
/// assert!(AgentKind::Logic.is_specialist());
/// assert!(!AgentKind::Decision.is_specialist());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "security_analysis")]
    Security,
    #[serde(rename = "logic_analysis")]
    Logic,
    #[serde(rename = "code_quality")]
    Quality,
    #[serde(rename = "feature_extraction")]
    FeatureExtraction,
    #[serde(rename = "decision")]
    Decision,
}

impl AgentKind {
    /// Every kind, in pipeline order.
    pub const ALL: [AgentKind; 5] = [
        AgentKind::FeatureExtraction,
        AgentKind::Security,
        AgentKind::Logic,
        AgentKind::Quality,
        AgentKind::Decision,
    ];

    /// The specialists whose confidence feeds aggregation.
    pub const SPECIALISTS: [AgentKind; 3] =
        [AgentKind::Security, AgentKind::Logic, AgentKind::Quality];

    pub fn is_specialist(self) -> bool {
        Self::SPECIALISTS.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Security => "security_analysis",
            AgentKind::Logic => "logic_analysis",
            AgentKind::Quality => "code_quality",
            AgentKind::FeatureExtraction => "feature_extraction",
            AgentKind::Decision => "decision",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        AgentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown agent kind: {s}"))
    }
}

/// Severity attached to an individual finding.
///
/// LLM responses are lenient about vocabulary, so parsing also accepts
/// `"error"` (high) and `"warning"` (medium).
///
/// # Examples
///
/// ```
/// use tribunal_core::{FindingSeverity, RiskLevel};
///
/// let s: FindingSeverity = "warning".parse().unwrap();
/// assert_eq!(s, FindingSeverity::Medium);
/// assert_eq!(FindingSeverity::Info.risk(), RiskLevel::None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl FindingSeverity {
    /// The risk level a finding of this severity implies.
    pub fn risk(self) -> RiskLevel {
        match self {
            FindingSeverity::Critical => RiskLevel::Critical,
            FindingSeverity::High => RiskLevel::High,
            FindingSeverity::Medium => RiskLevel::Medium,
            FindingSeverity::Low => RiskLevel::Low,
            FindingSeverity::Info => RiskLevel::None,
        }
    }
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingSeverity::Critical => write!(f, "critical"),
            FindingSeverity::High => write!(f, "high"),
            FindingSeverity::Medium => write!(f, "medium"),
            FindingSeverity::Low => write!(f, "low"),
            FindingSeverity::Info => write!(f, "info"),
        }
    }
}

impl FromStr for FindingSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(FindingSeverity::Critical),
            "high" | "error" => Ok(FindingSeverity::High),
            "medium" | "warning" => Ok(FindingSeverity::Medium),
            "low" => Ok(FindingSeverity::Low),
            "info" | "none" => Ok(FindingSeverity::Info),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// One structured observation reported by an agent.
///
/// # Examples
///
/// ```
/// use tribunal_core::{Finding, FindingSeverity};
///
/// let f = Finding::new("sql_injection", FindingSeverity::Critical, "query built by concatenation")
///     .at("app.py", 12);
/// assert_eq!(f.line_number, Some(12));
/// assert_eq!(f.filename.as_deref(), Some("app.py"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Short machine-friendly category, e.g. `sql_injection`.
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: FindingSeverity,
    pub description: String,
    /// Free-form location label, e.g. `app.py:10-24`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    /// Matched text or metric value backing the finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Finding {
    pub fn new(
        kind: impl Into<String>,
        severity: FindingSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            severity,
            description: description.into(),
            location: None,
            filename: None,
            line_number: None,
            evidence: None,
        }
    }

    /// Attach a file and line.
    pub fn at(mut self, filename: impl Into<String>, line: u32) -> Self {
        self.filename = Some(filename.into());
        self.line_number = Some(line);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

fn check_unit_interval(what: &str, value: f64) -> Result<(), TribunalError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TribunalError::Invariant(format!(
            "{what} must be within [0, 1], got {value}"
        )))
    }
}

/// The result one agent produced for one run.
///
/// Fields are private: an output can only be built through [`AgentOutput::new`]
/// (which rejects confidence outside `[0, 1]`) or [`AgentOutput::failed`], and
/// is read-only afterwards.
///
/// # Examples
///
/// ```
/// use tribunal_core::{AgentKind, AgentOutput, RiskLevel};
///
/// let out = AgentOutput::new(AgentKind::Logic, 0.8, vec![], RiskLevel::Low).unwrap();
/// assert!(out.success());
/// assert!(AgentOutput::new(AgentKind::Logic, 1.2, vec![], RiskLevel::Low).is_err());
///
/// let failed = AgentOutput::failed(AgentKind::Security, "timed out");
/// assert!(!failed.success());
/// assert_eq!(failed.error_message(), Some("timed out"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutput {
    agent_type: AgentKind,
    confidence: f64,
    findings: Vec<Finding>,
    risk_level: RiskLevel,
    metadata: BTreeMap<String, Value>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl AgentOutput {
    /// Build a successful output.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Invariant`] if `confidence` is outside `[0, 1]`
    /// (NaN included).
    pub fn new(
        agent_type: AgentKind,
        confidence: f64,
        findings: Vec<Finding>,
        risk_level: RiskLevel,
    ) -> Result<Self, TribunalError> {
        check_unit_interval("confidence", confidence)?;
        Ok(Self {
            agent_type,
            confidence,
            findings,
            risk_level,
            metadata: BTreeMap::new(),
            success: true,
            error_message: None,
        })
    }

    /// Build the record of an agent that did not produce a result.
    pub fn failed(agent_type: AgentKind, error: impl Into<String>) -> Self {
        Self {
            agent_type,
            confidence: 0.0,
            findings: Vec::new(),
            risk_level: RiskLevel::None,
            metadata: BTreeMap::new(),
            success: false,
            error_message: Some(error.into()),
        }
    }

    /// Attach a metadata entry while the output is still being assembled.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn agent_type(&self) -> AgentKind {
        self.agent_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// A bounded excerpt of source handed to a specialist.
///
/// # Examples
///
/// ```
/// use tribunal_core::CodeSnippet;
///
/// let s = CodeSnippet::new("app.py", 3, 5, "eval(x)", "function run", 1.0, ["eval"]).unwrap();
/// assert_eq!(s.location(), "app.py:3-5");
/// assert!(CodeSnippet::new("app.py", 5, 3, "", "", 0.5, ["x"]).is_err());
/// assert!(CodeSnippet::new("app.py", 1, 1, "", "", 1.5, ["x"]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeSnippet {
    filename: String,
    start_line: u32,
    end_line: u32,
    content: String,
    context: String,
    relevance_score: f64,
    tags: BTreeSet<String>,
}

impl CodeSnippet {
    /// Build a snippet.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Invariant`] when `relevance_score` is outside
    /// `[0, 1]`, `start_line` is zero, or `end_line < start_line`.
    pub fn new<I, T>(
        filename: impl Into<String>,
        start_line: u32,
        end_line: u32,
        content: impl Into<String>,
        context: impl Into<String>,
        relevance_score: f64,
        tags: I,
    ) -> Result<Self, TribunalError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        check_unit_interval("relevance_score", relevance_score)?;
        if start_line < 1 {
            return Err(TribunalError::Invariant(
                "snippet start_line must be >= 1".into(),
            ));
        }
        if end_line < start_line {
            return Err(TribunalError::Invariant(format!(
                "snippet end_line {end_line} precedes start_line {start_line}"
            )));
        }
        Ok(Self {
            filename: filename.into(),
            start_line,
            end_line,
            content: content.into(),
            context: context.into(),
            relevance_score,
            tags: tags.into_iter().map(Into::into).collect(),
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn relevance_score(&self) -> f64 {
        self.relevance_score
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// `file:start-end`, the form used in traces and findings.
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.filename, self.start_line, self.end_line)
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use tribunal_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// The report as JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_levels_order_by_severity() {
        let mut levels = vec![
            RiskLevel::High,
            RiskLevel::None,
            RiskLevel::Critical,
            RiskLevel::Low,
            RiskLevel::Medium,
        ];
        levels.sort();
        assert_eq!(
            levels,
            vec![
                RiskLevel::None,
                RiskLevel::Low,
                RiskLevel::Medium,
                RiskLevel::High,
                RiskLevel::Critical,
            ]
        );
        assert_eq!(RiskLevel::Critical.rank() - RiskLevel::None.rank(), 4);
    }

    #[test]
    fn risk_level_serializes_lowercase() {
        let json = serde_json::to_string(&RiskLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        assert_eq!("MEDIUM".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn agent_kind_names_match_serde() {
        for kind in AgentKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(kind.as_str().parse::<AgentKind>().unwrap(), kind);
        }
        assert!("style_police".parse::<AgentKind>().is_err());
    }

    #[test]
    fn finding_severity_aliases() {
        assert_eq!(
            "error".parse::<FindingSeverity>().unwrap(),
            FindingSeverity::High
        );
        assert_eq!(
            " Critical ".parse::<FindingSeverity>().unwrap(),
            FindingSeverity::Critical
        );
        assert!("bogus".parse::<FindingSeverity>().is_err());
    }

    #[test]
    fn finding_serializes_kind_as_type() {
        let f = Finding::new("eval_usage", FindingSeverity::High, "eval on input");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["type"], "eval_usage");
        assert!(json.get("kind").is_none());
        assert!(json.get("line_number").is_none());
    }

    #[test]
    fn agent_output_rejects_out_of_range_confidence() {
        assert!(AgentOutput::new(AgentKind::Security, -0.01, vec![], RiskLevel::None).is_err());
        assert!(AgentOutput::new(AgentKind::Security, f64::NAN, vec![], RiskLevel::None).is_err());
        assert!(AgentOutput::new(AgentKind::Security, 0.0, vec![], RiskLevel::None).is_ok());
        assert!(AgentOutput::new(AgentKind::Security, 1.0, vec![], RiskLevel::None).is_ok());
    }

    #[test]
    fn failed_output_has_zero_confidence() {
        let out = AgentOutput::failed(AgentKind::Quality, "boom");
        assert_eq!(out.confidence(), 0.0);
        assert_eq!(out.risk_level(), RiskLevel::None);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_message"], "boom");
        assert_eq!(json["agent_type"], "code_quality");
    }

    #[test]
    fn agent_output_metadata_builder() {
        let out = AgentOutput::new(AgentKind::Logic, 0.6, vec![], RiskLevel::None)
            .unwrap()
            .with_meta("snippets_analyzed", 3);
        assert_eq!(out.metadata()["snippets_analyzed"], 3);
    }

    #[test]
    fn snippet_requires_one_indexed_lines() {
        assert!(CodeSnippet::new("a.py", 0, 1, "", "", 0.5, ["x"]).is_err());
        let s = CodeSnippet::new("a.py", 2, 2, "x = 1", "global scope", 0.0, ["a", "b"]).unwrap();
        assert!(s.has_tag("a"));
        assert_eq!(s.tags().len(), 2);
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "md".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
