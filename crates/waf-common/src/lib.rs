//! Shared types for the WAF request-inspection core.
//!
//! This crate has no opinion on HTTP framework, transport, or storage —
//! it only defines the data model (`model`), the already-parsed
//! configuration shape the core is constructed from (`config`), the
//! error taxonomy (`error`), and the typed event stream (`event`) that
//! every other `waf-*` crate builds on.

pub mod config;
pub mod error;
pub mod event;
pub mod model;

pub use config::WafConfig;
pub use error::WafError;
pub use event::{EventBus, WafEvent};
pub use model::{AnalysisRecord, ModuleFinding, Rule, RuleSource, Severity, Threat};
