//! Core types, configuration, and error handling for Tribunal.
//!
//! This crate provides the shared foundation used by all other Tribunal crates:
//! - [`TribunalError`]: unified error type using `thiserror`
//! - [`TribunalConfig`]: configuration loaded from `.tribunal.toml`
//! - Shared types: [`RiskLevel`], [`AgentKind`], [`Finding`], [`AgentOutput`],
//!   [`CodeSnippet`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    ConflictConfig, LlmConfig, QualityConfig, ReliabilityConfig, RoutingConfig, SourceConfig,
    SpecialistConfig, TribunalConfig,
};
pub use error::TribunalError;
pub use types::{
    AgentKind, AgentOutput, CodeSnippet, Finding, FindingSeverity, OutputFormat, RiskLevel,
};

/// A convenience `Result` type for Tribunal operations.
pub type Result<T> = std::result::Result<T, TribunalError>;
