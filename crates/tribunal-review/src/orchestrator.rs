//! Sequences one analysis run from code source to [`FinalReport`].
//!
//! The pipeline is strictly forward:
//!
//! ```text
//! INIT -> FEATURES_EXTRACTED -> ROUTED -> SPECIALISTS_RUN
//!      -> CONFLICTS_CHECKED -> DECIDED -> REPORTED
//! ```
//!
//! with `FAILED` reachable from any state. Only a fatal configuration or
//! source error, or cancellation, is returned as `Err`; every other failure
//! becomes a deferred report.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tribunal_core::{AgentKind, AgentOutput, TribunalConfig, TribunalError};
use tribunal_ir::features::{analyze_codebase, Codebase};
use tribunal_ir::source::CodeSource;
use tribunal_ir::syntax::TreeSitterFrontend;
use tribunal_routing::{RoutedInputs, RoutingPolicy};

use crate::assessor::{ResilientLlm, SpecialistLlm};
use crate::conflict::{prioritize, ConflictResolver};
use crate::decision::{Action, DecisionSynthesizer};
use crate::reliability::{ReliabilityEngine, ReliabilityHistory};
use crate::report::FinalReport;
use crate::specialists::{feature_output, LogicSpecialist, QualitySpecialist, SecuritySpecialist};

/// Stages of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    FeaturesExtracted,
    Routed,
    SpecialistsRun,
    ConflictsChecked,
    Decided,
    Reported,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Init => "INIT",
            PipelineState::FeaturesExtracted => "FEATURES_EXTRACTED",
            PipelineState::Routed => "ROUTED",
            PipelineState::SpecialistsRun => "SPECIALISTS_RUN",
            PipelineState::ConflictsChecked => "CONFLICTS_CHECKED",
            PipelineState::Decided => "DECIDED",
            PipelineState::Reported => "REPORTED",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Ordered record of visited states.
#[derive(Debug)]
struct StateTrail(Vec<PipelineState>);

impl StateTrail {
    fn new() -> Self {
        tracing::info!(state = %PipelineState::Init, "pipeline state");
        Self(vec![PipelineState::Init])
    }

    fn enter(&mut self, state: PipelineState) {
        let from = self.current();
        tracing::info!(%from, to = %state, "pipeline state");
        self.0.push(state);
    }

    fn current(&self) -> PipelineState {
        self.0.last().copied().unwrap_or(PipelineState::Init)
    }

    fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|s| serde_json::Value::String(s.to_string()))
                .collect(),
        )
    }
}

/// Errors that must reach the caller instead of becoming a deferred report.
fn is_fatal(error: &TribunalError) -> bool {
    matches!(
        error,
        TribunalError::Config(_) | TribunalError::Source(_) | TribunalError::Cancelled
    )
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), TribunalError> {
    if cancel.is_cancelled() {
        Err(TribunalError::Cancelled)
    } else {
        Ok(())
    }
}

/// Drives a full analysis run.
///
/// The reliability history is shared across runs; clone the `Arc` from
/// [`Orchestrator::history`] to inspect it.
///
/// # Examples
///
/// ```
/// use tribunal_core::TribunalConfig;
/// use tribunal_ir::source::MemorySource;
/// use tribunal_review::orchestrator::Orchestrator;
///
/// # #[tokio::main]
/// # async fn main() {
/// let orchestrator = Orchestrator::from_config(TribunalConfig::default()).unwrap();
/// let source = MemorySource::new("demo").with_file("add.py", "def add(a, b):\n    return a + b\n");
/// let report = orchestrator.analyze("demo", &source).await.unwrap();
/// assert_eq!(report.repository_url, "demo");
/// # }
/// ```
pub struct Orchestrator {
    config: TribunalConfig,
    llm: Arc<dyn SpecialistLlm>,
    history: Arc<ReliabilityHistory>,
}

impl Orchestrator {
    /// Build with the configured LLM (or pattern analysis when none is
    /// configured).
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Config`] if the configuration is invalid, or
    /// [`TribunalError::Llm`] if the HTTP client cannot be built.
    pub fn from_config(config: TribunalConfig) -> Result<Self, TribunalError> {
        config.validate()?;
        let llm = ResilientLlm::from_config(&config.llm, &config.specialists)?;
        Self::with_llm(config, Arc::new(llm))
    }

    /// Build with an explicit assessment collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Config`] if the configuration is invalid.
    pub fn with_llm(
        config: TribunalConfig,
        llm: Arc<dyn SpecialistLlm>,
    ) -> Result<Self, TribunalError> {
        config.validate()?;
        let history = Arc::new(ReliabilityHistory::new(config.reliability.history_capacity));
        Ok(Self {
            config,
            llm,
            history,
        })
    }

    /// Share an existing history store, e.g. between orchestrators.
    pub fn with_history(mut self, history: Arc<ReliabilityHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &Arc<ReliabilityHistory> {
        &self.history
    }

    pub fn config(&self) -> &TribunalConfig {
        &self.config
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Source`] if the code source is unreachable.
    pub async fn analyze(
        &self,
        repo_id: &str,
        source: &dyn CodeSource,
    ) -> Result<FinalReport, TribunalError> {
        self.analyze_with_cancellation(repo_id, source, &CancellationToken::new())
            .await
    }

    /// Run the whole pipeline, checking `cancel` between stages.
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Cancelled`] if `cancel` fires before the
    /// report is produced, and [`TribunalError::Source`] if the code source
    /// is unreachable.
    pub async fn analyze_with_cancellation(
        &self,
        repo_id: &str,
        source: &dyn CodeSource,
        cancel: &CancellationToken,
    ) -> Result<FinalReport, TribunalError> {
        let span = tracing::info_span!("analysis", repo = %repo_id);
        async {
            let started = Instant::now();
            let mut trail = StateTrail::new();
            match self.run(repo_id, source, cancel, &mut trail, started).await {
                Ok(report) => Ok(report),
                Err(e) if is_fatal(&e) => {
                    trail.enter(PipelineState::Failed);
                    tracing::warn!(error = %e, "analysis aborted");
                    Err(e)
                }
                Err(e) => {
                    trail.enter(PipelineState::Failed);
                    tracing::error!(error = %e, "analysis failed; deferring to human review");
                    let mut report = FinalReport::failed(repo_id, &e);
                    report
                        .metadata
                        .insert("pipeline_states".into(), trail.to_value());
                    report
                        .metadata
                        .insert("duration_ms".into(), elapsed_ms(started).into());
                    Ok(report)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        repo_id: &str,
        source: &dyn CodeSource,
        cancel: &CancellationToken,
        trail: &mut StateTrail,
        started: Instant,
    ) -> Result<FinalReport, TribunalError> {
        check_cancelled(cancel)?;
        let files = source.load()?;
        tracing::info!(source = %source.describe(), files = files.len(), "loaded code source");

        let codebase = self.extract(files).await?;
        let features = feature_output(&codebase.features)?;
        trail.enter(PipelineState::FeaturesExtracted);
        check_cancelled(cancel)?;

        let routed = RoutingPolicy::new(self.config.routing.clone()).route(&codebase);
        tracing::info!(
            security = ?routed.snippet_locations(AgentKind::Security),
            logic = ?routed.snippet_locations(AgentKind::Logic),
            "routed specialist inputs"
        );
        trail.enter(PipelineState::Routed);
        check_cancelled(cancel)?;

        let specialists = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TribunalError::Cancelled),
            outputs = self.run_specialists(routed) => outputs,
        };
        trail.enter(PipelineState::SpecialistsRun);
        check_cancelled(cancel)?;

        let mut conflicts = ConflictResolver::new(self.config.conflicts.clone()).detect(&specialists);
        prioritize(&mut conflicts);
        trail.enter(PipelineState::ConflictsChecked);
        check_cancelled(cancel)?;

        let engine = ReliabilityEngine::new(self.config.reliability.clone(), self.history.clone())?;
        let aggregated = engine.aggregate(&specialists);
        let verdict = engine.evaluate(&specialists, aggregated, &conflicts);
        let decision = DecisionSynthesizer::synthesize(&specialists, aggregated, &conflicts);
        let decision_output = decision.to_output()?;
        trail.enter(PipelineState::Decided);
        check_cancelled(cancel)?;

        engine.record(&specialists);
        let health = engine.system_health(&specialists);

        let (action, recommendation, deferral_reason) = match verdict.reason() {
            Some(reason) => (
                Action::Defer,
                format!("Deferred to human review: {reason}. {}", decision.reasoning),
                Some(reason.to_string()),
            ),
            None => (decision.action, decision.reasoning.clone(), None),
        };

        let mut agent_outputs = Vec::with_capacity(specialists.len() + 2);
        agent_outputs.push(features);
        agent_outputs.extend(specialists);
        agent_outputs.push(decision_output);

        trail.enter(PipelineState::Reported);
        let mut report = FinalReport {
            repository_url: repo_id.to_string(),
            timestamp: chrono::Utc::now(),
            overall_confidence: aggregated,
            overall_risk_level: decision.highest_risk,
            agent_outputs,
            conflicts,
            recommendation,
            action_recommended: action,
            deferred: deferral_reason.is_some(),
            deferral_reason,
            metadata: Default::default(),
        };
        report
            .metadata
            .insert("system_health".into(), serde_json::to_value(&health)?);
        report
            .metadata
            .insert("pipeline_states".into(), trail.to_value());
        report
            .metadata
            .insert("files_analyzed".into(), codebase.features.file_count.into());
        report
            .metadata
            .insert("duration_ms".into(), elapsed_ms(started).into());

        tracing::info!(
            action = %report.action_recommended,
            risk = %report.overall_risk_level,
            confidence = report.overall_confidence,
            deferred = report.deferred,
            "analysis complete"
        );
        Ok(report)
    }

    /// Parse and measure the snapshot off the async runtime. A panic in
    /// extraction is reported like any other extraction failure.
    async fn extract(
        &self,
        files: std::collections::BTreeMap<String, String>,
    ) -> Result<Codebase, TribunalError> {
        let thresholds = self.config.quality.clone();
        tokio::task::spawn_blocking(move || {
            analyze_codebase(files, &TreeSitterFrontend, &thresholds)
        })
        .await
        .map_err(|e| TribunalError::Extraction(format!("extraction task failed: {e}")))?
    }

    /// Fan out to the three specialists and join them. Every specialist
    /// yields exactly one output, in `security, logic, quality` order.
    async fn run_specialists(&self, routed: RoutedInputs) -> Vec<AgentOutput> {
        let RoutedInputs {
            security,
            logic,
            quality,
        } = routed;
        let max_snippets = self.config.routing.max_snippets_per_agent;
        let timeout = Duration::from_secs(self.config.specialists.timeout_secs);

        let security_agent = SecuritySpecialist::new(
            self.llm.clone(),
            self.config.specialists.clone(),
            max_snippets,
        );
        let logic_agent = LogicSpecialist::new(
            self.llm.clone(),
            self.config.specialists.clone(),
            max_snippets,
        );
        let quality_agent = QualitySpecialist::new(self.config.quality.clone());

        let security_task = tokio::spawn(async move { security_agent.analyze(&security).await });
        let logic_task = tokio::spawn(async move { logic_agent.analyze(&logic).await });
        let quality_task = tokio::spawn(async move { quality_agent.analyze(&quality) });

        let (security, logic, quality) = tokio::join!(
            settle(AgentKind::Security, security_task, timeout),
            settle(AgentKind::Logic, logic_task, timeout),
            settle(AgentKind::Quality, quality_task, timeout),
        );
        vec![security, logic, quality]
    }
}

/// Aborts the task when the waiting side goes away, on timeout or when the
/// whole run is cancelled. A no-op for finished tasks.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Wait for one specialist task, turning timeout, panic and error into a
/// failed output.
async fn settle(
    kind: AgentKind,
    task: JoinHandle<Result<AgentOutput, TribunalError>>,
    timeout: Duration,
) -> AgentOutput {
    let _abort = AbortOnDrop(task.abort_handle());
    let error = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(output))) => {
            tracing::debug!(
                agent = %kind,
                confidence = output.confidence(),
                risk = %output.risk_level(),
                findings = output.findings().len(),
                "specialist finished"
            );
            return output;
        }
        Ok(Ok(Err(e))) => e.to_string(),
        Ok(Err(join)) if join.is_panic() => format!("specialist panicked: {join}"),
        Ok(Err(join)) => format!("specialist task aborted: {join}"),
        Err(_) => TribunalError::SpecialistTimeout {
            agent: kind.to_string(),
            secs: timeout.as_secs(),
        }
        .to_string(),
    };
    tracing::warn!(agent = %kind, error = %error, "specialist failed");
    AgentOutput::failed(kind, error)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_are_screaming_snake() {
        assert_eq!(PipelineState::FeaturesExtracted.to_string(), "FEATURES_EXTRACTED");
        assert_eq!(
            serde_json::to_value(PipelineState::ConflictsChecked).unwrap(),
            "CONFLICTS_CHECKED"
        );
    }

    #[test]
    fn trail_records_in_order() {
        let mut trail = StateTrail::new();
        trail.enter(PipelineState::FeaturesExtracted);
        trail.enter(PipelineState::Failed);
        assert_eq!(trail.current(), PipelineState::Failed);
        assert_eq!(
            trail.to_value(),
            serde_json::json!(["INIT", "FEATURES_EXTRACTED", "FAILED"])
        );
    }

    #[test]
    fn only_config_source_and_cancellation_are_fatal() {
        assert!(is_fatal(&TribunalError::Cancelled));
        assert!(is_fatal(&TribunalError::Source("gone".into())));
        assert!(is_fatal(&TribunalError::Config("bad".into())));
        assert!(!is_fatal(&TribunalError::Extraction("empty".into())));
        assert!(!is_fatal(&TribunalError::Llm("429".into())));
    }

    #[tokio::test]
    async fn settle_maps_errors_to_failed_outputs() {
        let task = tokio::spawn(async { Err(TribunalError::Llm("boom".into())) });
        let out = settle(AgentKind::Logic, task, Duration::from_secs(5)).await;
        assert!(!out.success());
        assert_eq!(out.error_message(), Some("LLM error: boom"));
    }

    #[tokio::test]
    async fn settle_times_out() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(TribunalError::Cancelled)
        });
        let out = settle(AgentKind::Security, task, Duration::from_millis(20)).await;
        assert!(!out.success());
        assert!(out.error_message().unwrap_or_default().contains("timed out"));
    }
}
