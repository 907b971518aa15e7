//! Confidence aggregation and the safety gate.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tribunal_core::{AgentKind, AgentOutput, ReliabilityConfig, RiskLevel, TribunalError};

use crate::conflict::ConflictInfo;

/// Rolling per-agent confidence samples.
///
/// Each agent kind has its own lock, so concurrent runs recording different
/// kinds never contend. Shared between runs through an `Arc`.
///
/// # Examples
///
/// ```
/// use tribunal_core::AgentKind;
/// use tribunal_review::reliability::ReliabilityHistory;
///
/// let history = ReliabilityHistory::new(2);
/// history.record(AgentKind::Logic, 0.2);
/// history.record(AgentKind::Logic, 0.4);
/// history.record(AgentKind::Logic, 0.6);
/// assert_eq!(history.samples(AgentKind::Logic), vec![0.4, 0.6]);
/// assert_eq!(history.mean(AgentKind::Security), None);
/// ```
#[derive(Debug)]
pub struct ReliabilityHistory {
    capacity: usize,
    samples: BTreeMap<AgentKind, Mutex<VecDeque<f64>>>,
}

impl ReliabilityHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: AgentKind::ALL
                .into_iter()
                .map(|kind| (kind, Mutex::new(VecDeque::with_capacity(capacity))))
                .collect(),
        }
    }

    /// Append a sample, dropping the oldest beyond capacity.
    pub fn record(&self, kind: AgentKind, confidence: f64) {
        if self.capacity == 0 {
            return;
        }
        if let Some(slot) = self.samples.get(&kind) {
            let mut samples = slot.lock().unwrap_or_else(PoisonError::into_inner);
            samples.push_back(confidence);
            while samples.len() > self.capacity {
                samples.pop_front();
            }
        }
    }

    /// Oldest first.
    pub fn samples(&self, kind: AgentKind) -> Vec<f64> {
        self.samples
            .get(&kind)
            .map(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn mean(&self, kind: AgentKind) -> Option<f64> {
        let samples = self.samples(kind);
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }
}

/// Why the gate refused an automated verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferReason {
    NoSuccessfulOutputs,
    LowConfidence { confidence: f64, threshold: f64 },
    UnresolvedConflicts(usize),
    SecurityFailed,
    CriticalRiskLowConfidence { confidence: f64, threshold: f64 },
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::NoSuccessfulOutputs => write!(f, "No successful agent outputs received"),
            DeferReason::LowConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "Overall confidence {confidence:.2} below threshold {threshold:.2}"
            ),
            DeferReason::UnresolvedConflicts(n) => {
                write!(f, "{n} unresolved conflicts between agents")
            }
            DeferReason::SecurityFailed => write!(f, "Security analysis agent failed to complete"),
            DeferReason::CriticalRiskLowConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "Critical risk detected but overall confidence {confidence:.2} is below safety threshold {threshold:.2}"
            ),
        }
    }
}

/// Outcome of the safety gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Proceed,
    Defer(DeferReason),
}

impl GateVerdict {
    pub fn is_deferred(&self) -> bool {
        matches!(self, GateVerdict::Defer(_))
    }

    pub fn reason(&self) -> Option<&DeferReason> {
        match self {
            GateVerdict::Proceed => None,
            GateVerdict::Defer(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Agent success counts for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub total_agents: usize,
    pub successful_agents: usize,
    pub failed_agents: usize,
    /// Mean confidence of the successful agents, 0 when none succeeded.
    pub average_confidence: f64,
    pub health_status: HealthStatus,
}

/// Weighted confidence aggregation and the ordered safety gate.
#[derive(Debug, Clone)]
pub struct ReliabilityEngine {
    config: ReliabilityConfig,
    weights: BTreeMap<AgentKind, f64>,
    history: Arc<ReliabilityHistory>,
}

impl ReliabilityEngine {
    /// # Errors
    ///
    /// Returns [`TribunalError::Config`] for unknown or negative weights.
    pub fn new(
        config: ReliabilityConfig,
        history: Arc<ReliabilityHistory>,
    ) -> Result<Self, TribunalError> {
        let weights = config.parsed_weights()?;
        Ok(Self {
            config,
            weights,
            history,
        })
    }

    /// Static reliability weight for `kind`, 1.0 unless configured.
    pub fn weight(&self, kind: AgentKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(1.0)
    }

    pub fn history(&self) -> &ReliabilityHistory {
        &self.history
    }

    /// `Σ(confidence · weight) / Σ(weight)` over successful outputs. Failed
    /// outputs are left out entirely; with nothing to weigh the result is 0.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tribunal_core::{AgentKind, AgentOutput, ReliabilityConfig, RiskLevel};
    /// use tribunal_review::reliability::{ReliabilityEngine, ReliabilityHistory};
    ///
    /// let engine = ReliabilityEngine::new(
    ///     ReliabilityConfig::default(),
    ///     Arc::new(ReliabilityHistory::new(100)),
    /// )
    /// .unwrap();
    /// let outputs = vec![
    ///     AgentOutput::new(AgentKind::Security, 0.9, vec![], RiskLevel::None).unwrap(),
    ///     AgentOutput::new(AgentKind::Logic, 0.7, vec![], RiskLevel::None).unwrap(),
    ///     AgentOutput::failed(AgentKind::Quality, "timed out"),
    /// ];
    /// assert!((engine.aggregate(&outputs) - 0.8).abs() < 1e-9);
    /// ```
    pub fn aggregate(&self, outputs: &[AgentOutput]) -> f64 {
        let (weighted, total) = outputs
            .iter()
            .filter(|o| o.success())
            .map(|o| (o.confidence(), self.weight(o.agent_type())))
            .fold((0.0, 0.0), |(sum, total), (c, w)| (sum + c * w, total + w));
        if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Apply the ordered gate. The first rule that fires is the only reason
    /// given:
    ///
    /// 1. no successful output
    /// 2. aggregated confidence below `min_confidence`
    /// 3. any conflict
    /// 4. the security specialist failed or is missing
    /// 5. critical risk with confidence below `critical_confidence`
    pub fn evaluate(
        &self,
        outputs: &[AgentOutput],
        confidence: f64,
        conflicts: &[ConflictInfo],
    ) -> GateVerdict {
        let verdict = self.first_defer_rule(outputs, confidence, conflicts);
        match &verdict {
            GateVerdict::Proceed => tracing::info!(confidence, "safety gate: proceed"),
            GateVerdict::Defer(reason) => {
                tracing::warn!(confidence, reason = %reason, "safety gate: defer")
            }
        }
        verdict
    }

    fn first_defer_rule(
        &self,
        outputs: &[AgentOutput],
        confidence: f64,
        conflicts: &[ConflictInfo],
    ) -> GateVerdict {
        if !outputs.iter().any(AgentOutput::success) {
            return GateVerdict::Defer(DeferReason::NoSuccessfulOutputs);
        }
        if confidence < self.config.min_confidence {
            return GateVerdict::Defer(DeferReason::LowConfidence {
                confidence,
                threshold: self.config.min_confidence,
            });
        }
        if !conflicts.is_empty() {
            return GateVerdict::Defer(DeferReason::UnresolvedConflicts(conflicts.len()));
        }
        let security_ok = outputs
            .iter()
            .any(|o| o.agent_type() == AgentKind::Security && o.success());
        if !security_ok {
            return GateVerdict::Defer(DeferReason::SecurityFailed);
        }
        let max_risk = outputs
            .iter()
            .filter(|o| o.success())
            .map(AgentOutput::risk_level)
            .max()
            .unwrap_or_default();
        if max_risk == RiskLevel::Critical && confidence < self.config.critical_confidence {
            return GateVerdict::Defer(DeferReason::CriticalRiskLowConfidence {
                confidence,
                threshold: self.config.critical_confidence,
            });
        }
        GateVerdict::Proceed
    }

    /// Append the confidence of every successful output to the history.
    pub fn record(&self, outputs: &[AgentOutput]) {
        for o in outputs.iter().filter(|o| o.success()) {
            self.history.record(o.agent_type(), o.confidence());
        }
    }

    pub fn system_health(&self, outputs: &[AgentOutput]) -> SystemHealth {
        let successful: Vec<&AgentOutput> = outputs.iter().filter(|o| o.success()).collect();
        let failed = outputs.len() - successful.len();
        let average_confidence = if successful.is_empty() {
            0.0
        } else {
            successful.iter().map(|o| o.confidence()).sum::<f64>() / successful.len() as f64
        };
        let health_status = if failed == 0
            && !successful.is_empty()
            && average_confidence >= self.config.min_confidence
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        SystemHealth {
            total_agents: outputs.len(),
            successful_agents: successful.len(),
            failed_agents: failed,
            average_confidence,
            health_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tribunal_core::ConflictConfig;

    use super::*;
    use crate::conflict::ConflictResolver;

    fn engine() -> ReliabilityEngine {
        ReliabilityEngine::new(
            ReliabilityConfig::default(),
            Arc::new(ReliabilityHistory::new(100)),
        )
        .unwrap()
    }

    fn ok(kind: AgentKind, confidence: f64, risk: RiskLevel) -> AgentOutput {
        AgentOutput::new(kind, confidence, vec![], risk).unwrap()
    }

    #[test]
    fn aggregate_of_all_failed_is_zero() {
        let outputs = vec![
            AgentOutput::failed(AgentKind::Security, "x"),
            AgentOutput::failed(AgentKind::Logic, "y"),
        ];
        assert_eq!(engine().aggregate(&outputs), 0.0);
        assert_eq!(engine().aggregate(&[]), 0.0);
    }

    #[test]
    fn aggregate_of_single_success_is_its_confidence() {
        let outputs = vec![ok(AgentKind::Logic, 0.83, RiskLevel::Low)];
        assert!((engine().aggregate(&outputs) - 0.83).abs() < 1e-12);
    }

    #[test]
    fn weights_shift_the_mean() {
        let config: ReliabilityConfig = toml::from_str(
            "[weights]\nsecurity_analysis = 3.0\nlogic_analysis = 1.0\n",
        )
        .unwrap();
        let engine =
            ReliabilityEngine::new(config, Arc::new(ReliabilityHistory::new(10))).unwrap();
        let outputs = vec![
            ok(AgentKind::Security, 1.0, RiskLevel::None),
            ok(AgentKind::Logic, 0.6, RiskLevel::None),
        ];
        assert!((engine.aggregate(&outputs) - 0.9).abs() < 1e-9);
        assert_eq!(engine.weight(AgentKind::Quality), 1.0);
    }

    #[test]
    fn zero_weights_aggregate_to_zero() {
        let config: ReliabilityConfig =
            toml::from_str("[weights]\nlogic_analysis = 0.0\n").unwrap();
        let engine =
            ReliabilityEngine::new(config, Arc::new(ReliabilityHistory::new(10))).unwrap();
        assert_eq!(engine.aggregate(&[ok(AgentKind::Logic, 0.9, RiskLevel::None)]), 0.0);
    }

    #[test]
    fn no_success_defers_first() {
        let outputs = vec![AgentOutput::failed(AgentKind::Security, "x")];
        let verdict = engine().evaluate(&outputs, 0.0, &[]);
        assert_eq!(verdict, GateVerdict::Defer(DeferReason::NoSuccessfulOutputs));
    }

    #[test]
    fn low_confidence_reason_cites_numbers() {
        let outputs = vec![ok(AgentKind::Security, 0.65, RiskLevel::None)];
        let verdict = engine().evaluate(&outputs, 0.65, &[]);
        let reason = verdict.reason().unwrap().to_string();
        assert!(reason.contains("0.65"));
        assert!(reason.contains("0.70"));
    }

    #[test]
    fn conflicts_defer_regardless_of_confidence() {
        let outputs = vec![
            ok(AgentKind::Security, 1.0, RiskLevel::Critical),
            ok(AgentKind::Logic, 1.0, RiskLevel::None),
        ];
        let conflicts = ConflictResolver::new(ConflictConfig::default()).detect(&outputs);
        let verdict = engine().evaluate(&outputs, 1.0, &conflicts);
        assert_eq!(verdict, GateVerdict::Defer(DeferReason::UnresolvedConflicts(1)));
        assert_eq!(
            verdict.reason().unwrap().to_string(),
            "1 unresolved conflicts between agents"
        );
    }

    #[test]
    fn security_failure_always_defers() {
        let outputs = vec![
            AgentOutput::failed(AgentKind::Security, "quota"),
            ok(AgentKind::Logic, 1.0, RiskLevel::None),
            ok(AgentKind::Quality, 1.0, RiskLevel::None),
        ];
        let verdict = engine().evaluate(&outputs, 1.0, &[]);
        assert_eq!(verdict, GateVerdict::Defer(DeferReason::SecurityFailed));

        let outputs = vec![
            AgentOutput::failed(AgentKind::Security, "quota"),
            ok(AgentKind::Logic, 0.95, RiskLevel::None),
        ];
        let e = engine();
        let verdict = e.evaluate(&outputs, e.aggregate(&outputs), &[]);
        assert_eq!(
            verdict.reason().unwrap().to_string(),
            "Security analysis agent failed to complete"
        );
    }

    #[test]
    fn critical_risk_needs_stricter_confidence() {
        let outputs = vec![
            ok(AgentKind::Security, 0.75, RiskLevel::Critical),
            ok(AgentKind::Logic, 0.75, RiskLevel::High),
        ];
        let verdict = engine().evaluate(&outputs, 0.75, &[]);
        assert!(matches!(
            verdict,
            GateVerdict::Defer(DeferReason::CriticalRiskLowConfidence { .. })
        ));
        assert!(verdict.reason().unwrap().to_string().contains("0.80"));

        assert_eq!(engine().evaluate(&outputs, 0.85, &[]), GateVerdict::Proceed);
    }

    #[test]
    fn proceed_when_nothing_fires() {
        let outputs = vec![
            ok(AgentKind::Security, 0.9, RiskLevel::Low),
            ok(AgentKind::Logic, 0.8, RiskLevel::None),
        ];
        let verdict = engine().evaluate(&outputs, 0.85, &[]);
        assert!(!verdict.is_deferred());
        assert!(verdict.reason().is_none());
    }

    #[test]
    fn health_reports_failures() {
        let outputs = vec![
            ok(AgentKind::Security, 0.9, RiskLevel::Low),
            AgentOutput::failed(AgentKind::Logic, "x"),
        ];
        let health = engine().system_health(&outputs);
        assert_eq!(health.total_agents, 2);
        assert_eq!(health.successful_agents, 1);
        assert_eq!(health.failed_agents, 1);
        assert_eq!(health.health_status, HealthStatus::Degraded);
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["health_status"], "degraded");

        let healthy = engine().system_health(&outputs[..1]);
        assert_eq!(healthy.health_status, HealthStatus::Healthy);
    }

    #[test]
    fn record_only_keeps_successes() {
        let e = engine();
        e.record(&[
            ok(AgentKind::Security, 0.9, RiskLevel::Low),
            AgentOutput::failed(AgentKind::Logic, "x"),
        ]);
        assert_eq!(e.history().samples(AgentKind::Security), vec![0.9]);
        assert!(e.history().samples(AgentKind::Logic).is_empty());
    }

    #[test]
    fn concurrent_writers_respect_capacity() {
        let history = Arc::new(ReliabilityHistory::new(100));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let history = Arc::clone(&history);
                thread::spawn(move || {
                    for i in 0..50 {
                        let kind = if t % 2 == 0 {
                            AgentKind::Security
                        } else {
                            AgentKind::Logic
                        };
                        history.record(kind, f64::from(i) / 50.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(history.samples(AgentKind::Security).len(), 100);
        assert_eq!(history.samples(AgentKind::Logic).len(), 100);
        assert!(history.mean(AgentKind::Security).is_some());
    }
}
