//! The seam between specialists and the language model.
//!
//! Specialists only ever talk to a [`SpecialistLlm`]. Its contract is
//! infallible: whatever happens on the wire, an [`Assessment`] with the same
//! schema comes back. [`ResilientLlm`] honours that by degrading to
//! [`PatternFallback`].

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tribunal_core::{AgentKind, CodeSnippet, Finding, LlmConfig, SpecialistConfig, TribunalError};

use crate::fallback::PatternFallback;
use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::{build_assessment_prompt, parse_assessment, system_prompt};

/// What a single assessment looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    Security,
    Logic,
}

impl Focus {
    pub fn agent_kind(self) -> AgentKind {
        match self {
            Focus::Security => AgentKind::Security,
            Focus::Logic => AgentKind::Logic,
        }
    }
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Focus::Security => write!(f, "security"),
            Focus::Logic => write!(f, "logic"),
        }
    }
}

/// One snippet plus the curated features its specialist may see.
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub focus: Focus,
    pub snippet: CodeSnippet,
    /// Serialized curated features, or `Null`.
    pub features: Value,
}

/// Where an assessment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentSource {
    Llm,
    Fallback,
}

/// Structured answer for one snippet.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub findings: Vec<Finding>,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub source: AssessmentSource,
}

/// A collaborator that turns a snippet into findings.
///
/// Implementations must not fail: transport errors, quota exhaustion and
/// malformed output are answered with a deterministic result instead.
#[async_trait]
pub trait SpecialistLlm: Send + Sync {
    async fn assess(&self, request: &AssessmentRequest) -> Assessment;
}

/// An optional HTTP client backed by the pattern fallback.
///
/// # Examples
///
/// ```
/// use tribunal_core::{LlmConfig, SpecialistConfig};
/// use tribunal_review::assessor::ResilientLlm;
///
/// // No key and no base URL: every assessment is answered offline.
/// let llm = ResilientLlm::from_config(&LlmConfig::default(), &SpecialistConfig::default()).unwrap();
/// assert!(!llm.is_online());
/// ```
pub struct ResilientLlm {
    client: Option<LlmClient>,
    fallback: PatternFallback,
    defaults: SpecialistConfig,
}

impl ResilientLlm {
    /// Build from configuration. The client is only created when the LLM is
    /// enabled and either an API key or a custom base URL (for local
    /// providers) is configured.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Llm`] if the HTTP client cannot be built.
    pub fn from_config(
        llm: &LlmConfig,
        specialists: &SpecialistConfig,
    ) -> Result<Self, TribunalError> {
        let client = if llm.enabled && (llm.api_key.is_some() || llm.base_url.is_some()) {
            let client = LlmClient::new(llm)?;
            tracing::info!(model = client.model(), "specialists use LLM assessment");
            Some(client)
        } else {
            tracing::info!(
                enabled = llm.enabled,
                "no LLM endpoint configured; specialists use pattern analysis"
            );
            None
        };
        Ok(Self {
            client,
            fallback: PatternFallback,
            defaults: specialists.clone(),
        })
    }

    /// Pattern analysis only.
    pub fn offline(specialists: &SpecialistConfig) -> Self {
        Self {
            client: None,
            fallback: PatternFallback,
            defaults: specialists.clone(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.client.is_some()
    }

    fn default_confidence(&self, focus: Focus) -> f64 {
        match focus {
            Focus::Security => self.defaults.default_security_confidence,
            Focus::Logic => self.defaults.default_logic_confidence,
        }
    }

    async fn ask(
        &self,
        client: &LlmClient,
        request: &AssessmentRequest,
    ) -> Result<(Vec<Finding>, f64), TribunalError> {
        let messages = vec![
            ChatMessage::system(system_prompt(request.focus)),
            ChatMessage::user(build_assessment_prompt(request)),
        ];
        let response = client.chat(messages).await?;
        parse_assessment(
            &response,
            &request.snippet,
            self.default_confidence(request.focus),
        )
    }
}

#[async_trait]
impl SpecialistLlm for ResilientLlm {
    async fn assess(&self, request: &AssessmentRequest) -> Assessment {
        if let Some(client) = &self.client {
            match self.ask(client, request).await {
                Ok((findings, confidence)) => {
                    return Assessment {
                        findings,
                        confidence,
                        source: AssessmentSource::Llm,
                    }
                }
                Err(e) => tracing::warn!(
                    focus = %request.focus,
                    location = %request.snippet.location(),
                    error = %e,
                    "LLM assessment failed; using pattern analysis"
                ),
            }
        }
        self.fallback.assess(request).await
    }
}
