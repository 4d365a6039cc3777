//! Shared scanning machinery used by every signature module.
//!
//! A module is a table of `PatternRule`s plus a small set of
//! `ComboRule`s that award an additional bonus when two or more base
//! patterns fire together (spec §4.2, "Combination bonuses").

use std::collections::HashSet;

use regex::Regex;
use waf_common::model::Threat;

pub struct PatternRule {
    pub id: &'static str,
    pub regex: Regex,
    pub score: f64,
    pub threat_type: &'static str,
    pub description: &'static str,
}

/// Awards `score` once per request when `predicate` holds over the set
/// of base pattern ids that matched somewhere in the search surface.
pub struct ComboRule {
    pub id: &'static str,
    pub threat_type: &'static str,
    pub description: &'static str,
    pub score: f64,
    pub predicate: fn(&HashSet<&'static str>) -> bool,
}

/// Runs every `(pattern, text)` pair in `surface` against `rules`;
/// every match contributes its pattern's score (spec §4.2). Then
/// evaluates `combos` once against the set of matched pattern ids.
pub fn scan(
    surface: &[(&'static str, String)],
    rules: &[PatternRule],
    combos: &[ComboRule],
) -> (f64, Vec<Threat>) {
    let mut score = 0.0;
    let mut threats = Vec::new();
    let mut matched_ids: HashSet<&'static str> = HashSet::new();

    for (_, text) in surface {
        for rule in rules {
            if let Some(m) = rule.regex.find(text) {
                score += rule.score;
                matched_ids.insert(rule.id);
                threats.push(Threat::new(
                    rule.threat_type,
                    rule.id,
                    rule.description,
                    rule.score,
                    m.as_str(),
                ));
            }
        }
    }

    for combo in combos {
        if (combo.predicate)(&matched_ids) {
            score += combo.score;
            threats.push(Threat::new(
                combo.threat_type,
                combo.id,
                combo.description,
                combo.score,
                "",
            ));
        }
    }

    (score, threats)
}
