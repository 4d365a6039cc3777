//! Pluggable signature detection modules (spec §4.2, §9 "Plugin
//! modules").
//!
//! Every module is a function of `AnalysisRecord -> Option<ModuleFinding>`.
//! Discovery is by the configured module-name list (spec §6 `modules`),
//! never by filesystem scan — `build_modules` is the only place module
//! names are resolved to implementations.

mod cmd_injection;
mod nosqli;
mod path_traversal;
mod pattern_set;
mod sqli;
mod xss;

pub use cmd_injection::CmdInjectionModule;
pub use nosqli::NoSqliModule;
pub use path_traversal::PathTraversalModule;
pub use sqli::SqliModule;
pub use xss::XssModule;

use waf_common::model::{AnalysisRecord, ModuleFinding};

/// A single pluggable detection module.
pub trait DetectionModule: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze(&self, record: &AnalysisRecord) -> Option<ModuleFinding>;
}

/// Resolves the configured module name list (spec §6 `modules`, default
/// `["xss", "sqli"]`) into live module instances. Unknown names are
/// skipped with a `tracing::warn!`, matching the "config error, item
/// dropped with a warning" handling in spec §7.
pub fn build_modules(names: &[String]) -> Vec<Box<dyn DetectionModule>> {
    names
        .iter()
        .filter_map(|name| match name.as_str() {
            "xss" => Some(Box::new(XssModule) as Box<dyn DetectionModule>),
            "sqli" => Some(Box::new(SqliModule) as Box<dyn DetectionModule>),
            "nosqli" => Some(Box::new(NoSqliModule) as Box<dyn DetectionModule>),
            "path-traversal" => Some(Box::new(PathTraversalModule) as Box<dyn DetectionModule>),
            "cmd-injection" => Some(Box::new(CmdInjectionModule) as Box<dyn DetectionModule>),
            other => {
                tracing::warn!(module = other, "unknown detection module in config, skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_modules_skips_unknown_names() {
        let modules = build_modules(&["xss".to_string(), "not-a-real-module".to_string()]);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name(), "xss");
    }

    #[test]
    fn build_modules_resolves_all_known_names() {
        let names = vec![
            "xss".to_string(),
            "sqli".to_string(),
            "nosqli".to_string(),
            "path-traversal".to_string(),
            "cmd-injection".to_string(),
        ];
        let modules = build_modules(&names);
        assert_eq!(modules.len(), 5);
    }
}
