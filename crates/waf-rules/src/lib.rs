//! The Rule Manager (spec §4.3): a keyed collection of flat
//! `(pattern, score, category)` rules, loaded at init from an embedded
//! catalog and mutable at runtime via admin/community operations.

mod builtin;
mod community;
mod load;
mod manager;

pub use community::HttpCommunityRuleSource;
pub use load::{compile_rule, parse_rule_file, RawRule};
pub use manager::{
    spawn_refresh_timer, CommunityRuleSource, ExportedRule, RuleDelta, RuleManager, RuleManagerStats,
    SourceCounts,
};
