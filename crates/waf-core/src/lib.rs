//! The WAF core (spec §1, §2): request extraction, detection-module
//! and rule-engine aggregation, anomaly scoring, adaptive learning,
//! rate-limiting, and the final decision — wired together as one
//! pipeline, fail-open on any internal error.

mod core;
mod decision;
mod engine;
mod extractor;
mod ingress;

pub use core::WafCore;
pub use decision::{BlockResponse, Decision};
pub use engine::Action;
pub use extractor::{build_record, next_request_id};
pub use ingress::{resolve_client_ip, IngressRequest};
