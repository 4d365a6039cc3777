//! A hand-rolled `summary` metric family (spec §4.8): quantiles
//! {0.5, 0.9, 0.95, 0.99}, `_sum`, `_count`. `prometheus` has no native
//! summary type, so this mirrors its text-exposition conventions by
//! hand.

use std::sync::RwLock;

const QUANTILES: [f64; 4] = [0.5, 0.9, 0.95, 0.99];
const MAX_RESERVOIR: usize = 1000;

struct State {
    observations: Vec<f64>,
    sum: f64,
    count: u64,
}

pub struct Summary {
    name: &'static str,
    help: &'static str,
    state: RwLock<State>,
}

impl Summary {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            state: RwLock::new(State {
                observations: Vec::with_capacity(MAX_RESERVOIR),
                sum: 0.0,
                count: 0,
            }),
        }
    }

    /// O(1) amortized: appends to a capped reservoir, evicting the
    /// oldest observation once full. `_sum`/`_count` track every
    /// observation ever made, not just the reservoir.
    pub fn observe(&self, value: f64) {
        let mut state = self.state.write().unwrap();
        state.sum += value;
        state.count += 1;
        if state.observations.len() >= MAX_RESERVOIR {
            state.observations.remove(0);
        }
        state.observations.push(value);
    }

    pub fn render(&self) -> String {
        let state = self.state.read().unwrap();
        let mut sorted = state.observations.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut out = String::new();
        out.push_str(&format!("# HELP {} {}\n", self.name, self.help));
        out.push_str(&format!("# TYPE {} summary\n", self.name));
        for q in QUANTILES {
            let value = percentile(&sorted, q);
            out.push_str(&format!("{}{{quantile=\"{}\"}} {}\n", self.name, q, value));
        }
        out.push_str(&format!("{}_sum {}\n", self.name, state.sum));
        out.push_str(&format!("{}_count {}\n", self.name, state.count));
        out
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
