//! Routing policy for Tribunal specialists.
//!
//! Turns an analysed [`tribunal_ir::features::Codebase`] into per-specialist
//! inputs. Security and logic get curated features plus at most
//! `max_snippets_per_agent` snippets of at most `max_snippet_chars` characters;
//! quality gets metrics only. Files mentioning security keywords never reach
//! the logic specialist.

pub mod curate;
pub mod patterns;
pub mod policy;
pub mod window;

pub use curate::{LogicFeatures, QualityFeatures, SecurityFeatures};
pub use policy::{LogicInput, QualityInput, RoutedInputs, RoutingPolicy, SecurityInput};
