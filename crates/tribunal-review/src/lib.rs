//! Specialist agents, disagreement detection, reliability gating and
//! decision synthesis for Tribunal.
//!
//! [`orchestrator::Orchestrator`] drives one run: features are extracted,
//! routed into bounded per-specialist inputs, assessed concurrently by the
//! security, logic and quality specialists, checked for conflicts, gated by
//! the [`reliability::ReliabilityEngine`] and synthesized into a
//! [`report::FinalReport`].
//!
//! Security and logic specialists reach the language model only through the
//! [`assessor::SpecialistLlm`] trait, whose default implementation degrades
//! to deterministic pattern analysis when the model is unavailable.

pub mod assessor;
pub mod conflict;
pub mod decision;
pub mod fallback;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod reliability;
pub mod report;
pub mod specialists;

pub use assessor::{Assessment, AssessmentRequest, AssessmentSource, Focus, ResilientLlm, SpecialistLlm};
pub use conflict::{ConflictInfo, ConflictKind, ConflictResolver};
pub use decision::{Action, Decision, DecisionSynthesizer};
pub use orchestrator::{Orchestrator, PipelineState};
pub use reliability::{GateVerdict, ReliabilityEngine, ReliabilityHistory};
pub use report::FinalReport;
