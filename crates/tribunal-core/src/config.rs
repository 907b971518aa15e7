use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TribunalError;
use crate::types::AgentKind;

/// Top-level configuration loaded from `.tribunal.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use tribunal_core::TribunalConfig;
///
/// let config = TribunalConfig::default();
/// assert_eq!(config.routing.max_snippets_per_agent, 5);
/// assert_eq!(config.reliability.min_confidence, 0.70);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TribunalConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// What each specialist is allowed to see.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Aggregation weights and safety-gate thresholds.
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    /// Disagreement detection.
    #[serde(default)]
    pub conflicts: ConflictConfig,
    /// Thresholds for the deterministic quality specialist.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Specialist timeouts and default confidences.
    #[serde(default)]
    pub specialists: SpecialistConfig,
    /// Code source limits.
    #[serde(default)]
    pub source: SourceConfig,
}

impl TribunalConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Io`] if the file cannot be read, or
    /// [`TribunalError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tribunal_core::TribunalConfig;
    /// use std::path::Path;
    ///
    /// let config = TribunalConfig::from_file(Path::new(".tribunal.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, TribunalError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use tribunal_core::TribunalConfig;
    ///
    /// let toml = r#"
    /// [reliability]
    /// min_confidence = 0.75
    /// "#;
    /// let config = TribunalConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.reliability.min_confidence, 0.75);
    /// assert_eq!(config.reliability.critical_confidence, 0.80);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, TribunalError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject configurations no run could honour.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<(), TribunalError> {
        let unit = |key: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(TribunalError::Config(format!(
                    "{key} must be within [0, 1], got {v}"
                )))
            }
        };
        unit("reliability.min_confidence", self.reliability.min_confidence)?;
        unit(
            "reliability.critical_confidence",
            self.reliability.critical_confidence,
        )?;
        unit(
            "conflicts.contradiction_level",
            self.conflicts.contradiction_level,
        )?;
        unit("quality.confidence", self.quality.confidence)?;
        unit(
            "specialists.empty_security_confidence",
            self.specialists.empty_security_confidence,
        )?;
        unit(
            "specialists.empty_logic_confidence",
            self.specialists.empty_logic_confidence,
        )?;
        unit(
            "specialists.default_security_confidence",
            self.specialists.default_security_confidence,
        )?;
        unit(
            "specialists.default_logic_confidence",
            self.specialists.default_logic_confidence,
        )?;

        if self.routing.max_snippets_per_agent == 0 {
            return Err(TribunalError::Config(
                "routing.max_snippets_per_agent must be at least 1".into(),
            ));
        }
        if self.routing.max_snippet_chars == 0 {
            return Err(TribunalError::Config(
                "routing.max_snippet_chars must be at least 1".into(),
            ));
        }
        if self.specialists.timeout_secs == 0 {
            return Err(TribunalError::Config(
                "specialists.timeout_secs must be at least 1".into(),
            ));
        }
        self.reliability.parsed_weights().map(|_| ())
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use tribunal_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o-mini");
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (e.g. `"openai"`, `"ollama"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// When false, every assessment comes from the deterministic fallback.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout(),
            enabled: true,
        }
    }
}

/// Routing limits and the security-content isolation filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Maximum snippets handed to one specialist (default: 5).
    #[serde(default = "default_max_snippets")]
    pub max_snippets_per_agent: usize,
    /// Maximum characters in one snippet (default: 500).
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
    /// Lines scanned upward for the enclosing scope (default: 20).
    #[serde(default = "default_context_lookback")]
    pub context_lookback_lines: usize,
    /// Files containing any of these are withheld from the logic specialist.
    #[serde(default = "default_security_keywords")]
    pub security_file_keywords: Vec<String>,
}

fn default_max_snippets() -> usize {
    5
}

fn default_max_snippet_chars() -> usize {
    500
}

fn default_context_lookback() -> usize {
    20
}

fn default_security_keywords() -> Vec<String> {
    ["password", "token", "auth", "sql", "exec", "eval", "crypto"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_snippets_per_agent: default_max_snippets(),
            max_snippet_chars: default_max_snippet_chars(),
            context_lookback_lines: default_context_lookback(),
            security_file_keywords: default_security_keywords(),
        }
    }
}

/// Confidence aggregation and safety-gate thresholds.
///
/// # Examples
///
/// ```
/// use tribunal_core::{AgentKind, ReliabilityConfig};
///
/// let toml = r#"
/// [weights]
/// security_analysis = 2.0
/// "#;
/// let config: ReliabilityConfig = toml::from_str(toml).unwrap();
/// let weights = config.parsed_weights().unwrap();
/// assert_eq!(weights[&AgentKind::Security], 2.0);
/// assert_eq!(config.history_capacity, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Aggregated confidence below this defers (default: 0.70).
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Required confidence when any specialist reports critical risk (default: 0.80).
    #[serde(default = "default_critical_confidence")]
    pub critical_confidence: f64,
    /// Samples kept per agent kind in the rolling history (default: 100).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Per-agent reliability weight keyed by agent kind name (default: 1.0 each).
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

fn default_min_confidence() -> f64 {
    0.70
}

fn default_critical_confidence() -> f64 {
    0.80
}

fn default_history_capacity() -> usize {
    100
}

impl ReliabilityConfig {
    /// Resolve `weights` keys into agent kinds.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Config`] for an unknown agent kind or a
    /// negative or non-finite weight.
    pub fn parsed_weights(&self) -> Result<BTreeMap<AgentKind, f64>, TribunalError> {
        let mut out = BTreeMap::new();
        for (key, &weight) in &self.weights {
            let kind: AgentKind = key
                .parse()
                .map_err(|e| TribunalError::Config(format!("reliability.weights: {e}")))?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(TribunalError::Config(format!(
                    "reliability.weights.{key} must be a non-negative number, got {weight}"
                )));
            }
            out.insert(kind, weight);
        }
        Ok(out)
    }
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            critical_confidence: default_critical_confidence(),
            history_capacity: default_history_capacity(),
            weights: BTreeMap::new(),
        }
    }
}

/// Conflict detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Minimum risk-rank gap between security and logic that counts (default: 2).
    #[serde(default = "default_risk_gap")]
    pub risk_gap: u8,
    /// Disagreement level assigned to contradicting findings (default: 0.8).
    #[serde(default = "default_contradiction_level")]
    pub contradiction_level: f64,
    /// Word pairs whose split across two agents signals a contradiction.
    #[serde(default = "default_antonym_pairs")]
    pub antonym_pairs: Vec<(String, String)>,
}

fn default_risk_gap() -> u8 {
    2
}

fn default_contradiction_level() -> f64 {
    0.8
}

fn default_antonym_pairs() -> Vec<(String, String)> {
    [("safe", "vulnerable"), ("correct", "incorrect"), ("valid", "invalid")]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            risk_gap: default_risk_gap(),
            contradiction_level: default_contradiction_level(),
            antonym_pairs: default_antonym_pairs(),
        }
    }
}

/// Thresholds for the metrics-only quality specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_max_function_length")]
    pub max_function_length: f64,
    #[serde(default = "default_max_complexity")]
    pub max_complexity: u32,
    /// Non-blank lines above which a file counts as long.
    #[serde(default = "default_long_file_loc")]
    pub long_file_loc: usize,
    /// Nesting depth above which a location is reported.
    #[serde(default = "default_high_nesting")]
    pub high_nesting_depth: usize,
    /// Confidence the quality specialist reports (default: 0.9).
    #[serde(default = "default_quality_confidence")]
    pub confidence: f64,
}

fn default_max_function_length() -> f64 {
    50.0
}

fn default_max_complexity() -> u32 {
    10
}

fn default_long_file_loc() -> usize {
    200
}

fn default_high_nesting() -> usize {
    4
}

fn default_quality_confidence() -> f64 {
    0.9
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_function_length: default_max_function_length(),
            max_complexity: default_max_complexity(),
            long_file_loc: default_long_file_loc(),
            high_nesting_depth: default_high_nesting(),
            confidence: default_quality_confidence(),
        }
    }
}

/// Specialist execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    /// Wall-clock budget per specialist (default: 90).
    #[serde(default = "default_specialist_timeout")]
    pub timeout_secs: u64,
    /// Security confidence when routing selected nothing (default: 0.5).
    #[serde(default = "default_empty_security")]
    pub empty_security_confidence: f64,
    /// Logic confidence when routing selected nothing (default: 0.6).
    #[serde(default = "default_empty_logic")]
    pub empty_logic_confidence: f64,
    /// Assumed when a security assessment omits its confidence (default: 0.7).
    #[serde(default = "default_security_confidence")]
    pub default_security_confidence: f64,
    /// Assumed when a logic assessment omits its confidence (default: 0.6).
    #[serde(default = "default_empty_logic")]
    pub default_logic_confidence: f64,
}

fn default_specialist_timeout() -> u64 {
    90
}

fn default_empty_security() -> f64 {
    0.5
}

fn default_empty_logic() -> f64 {
    0.6
}

fn default_security_confidence() -> f64 {
    0.7
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_specialist_timeout(),
            empty_security_confidence: default_empty_security(),
            empty_logic_confidence: default_empty_logic(),
            default_security_confidence: default_security_confidence(),
            default_logic_confidence: default_empty_logic(),
        }
    }
}

/// Limits applied while reading a code source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Files larger than this are skipped (default: 10 MiB).
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = TribunalConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.routing.max_snippets_per_agent, 5);
        assert_eq!(config.routing.max_snippet_chars, 500);
        assert_eq!(config.routing.context_lookback_lines, 20);
        assert_eq!(config.routing.security_file_keywords.len(), 7);
        assert_eq!(config.reliability.min_confidence, 0.70);
        assert_eq!(config.reliability.critical_confidence, 0.80);
        assert_eq!(config.reliability.history_capacity, 100);
        assert!(config.reliability.weights.is_empty());
        assert_eq!(config.conflicts.risk_gap, 2);
        assert_eq!(config.conflicts.antonym_pairs.len(), 3);
        assert_eq!(config.quality.max_complexity, 10);
        assert_eq!(config.specialists.timeout_secs, 90);
        assert_eq!(config.source.max_file_bytes, 10_485_760);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = TribunalConfig::from_toml("").unwrap();
        assert_eq!(config.routing.max_snippet_chars, 500);
        assert_eq!(config.specialists.empty_security_confidence, 0.5);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[llm]
provider = "ollama"
model = "llama3"
base_url = "http://localhost:11434"
enabled = false

[routing]
max_snippets_per_agent = 3
max_snippet_chars = 300
security_file_keywords = ["secret"]

[reliability]
min_confidence = 0.6
critical_confidence = 0.9

[reliability.weights]
security_analysis = 1.5
code_quality = 0.5

[conflicts]
antonym_pairs = [["safe", "unsafe"]]

[specialists]
timeout_secs = 10
"#;
        let config = TribunalConfig::from_toml(toml).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert!(!config.llm.enabled);
        assert_eq!(config.routing.max_snippets_per_agent, 3);
        assert_eq!(config.routing.security_file_keywords, vec!["secret"]);
        assert_eq!(config.reliability.critical_confidence, 0.9);
        assert_eq!(
            config.conflicts.antonym_pairs,
            vec![("safe".to_string(), "unsafe".to_string())]
        );
        let weights = config.reliability.parsed_weights().unwrap();
        assert_eq!(weights[&AgentKind::Security], 1.5);
        assert_eq!(weights[&AgentKind::Quality], 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_weight_key_is_rejected() {
        let toml = r#"
[reliability.weights]
style_police = 1.0
"#;
        let config = TribunalConfig::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("style_police"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let toml = r#"
[reliability]
min_confidence = 1.5
"#;
        let config = TribunalConfig::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reliability.min_confidence"));
    }

    #[test]
    fn zero_snippet_budget_is_rejected() {
        let mut config = TribunalConfig::default();
        config.routing.max_snippets_per_agent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = TribunalConfig::from_toml("this is not valid toml [[[");
        assert!(result.is_err());
    }
}
