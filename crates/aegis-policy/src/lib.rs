//! # aegis-policy
//!
//! `PolicyEngine` (`spec.md` §4.P): scope/consent decisions
//! ([`consent`]), pairwise subject derivation ([`subject`]), and the
//! decision-flow graph evaluator shared with `AuthorizeEngine`'s state
//! machine ([`flow`]).

pub mod consent;
pub mod error;
pub mod flow;
pub mod subject;

pub use consent::{ConsentCache, ScopeDecision};
pub use error::PolicyError;
pub use flow::{FlowGraph, FlowNode, NodeType, Operator, Predicate, StepContext};
pub use subject::{derive_pairwise_subject, resolve_sector_host};
