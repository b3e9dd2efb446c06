//! Tuning knobs and counters for simplify-cfg

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Pass configuration, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyCfgOptions {
    /// Upper bound on rounds of the dominator-based phase
    pub max_dominator_iterations: u32,

    /// Maximum number of non-free instructions duplicated by one jump thread
    pub jump_threading_cost_limit: usize,

    /// Maximum number of non-free instructions duplicated after an
    /// Objective-C method call
    pub tail_duplication_cost_limit: usize,

    pub enable_jump_threading: bool,

    pub enable_dominator_simplify: bool,

    /// Run the verifier after every phase and abort on a broken function
    pub verify_after_each_phase: bool,
}

impl Default for SimplifyCfgOptions {
    fn default() -> Self {
        Self {
            max_dominator_iterations: 10,
            jump_threading_cost_limit: 6,
            tail_duplication_cost_limit: 6,
            enable_jump_threading: true,
            enable_dominator_simplify: true,
            verify_after_each_phase: false,
        }
    }
}

/// What one or more runs of the pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifyCfgStats {
    pub functions_changed: usize,
    pub unreachable_blocks_removed: usize,
    pub dead_blocks_removed: usize,
    pub blocks_merged: usize,
    pub trampolines_collapsed: usize,
    pub terminators_folded: usize,
    pub conditions_inverted: usize,
    pub jumps_threaded: usize,
    pub arguments_split: usize,
    pub dead_arguments_removed: usize,
    pub trivial_phis_removed: usize,
    pub values_propagated: usize,
    pub cond_fails_hoisted: usize,
    pub cond_fails_removed: usize,
    pub dead_instructions_removed: usize,
    pub switches_to_select: usize,
    pub blocks_tail_duplicated: usize,
    pub critical_edges_split: usize,
    pub switches_canonicalized: usize,
    pub dominator_iterations: usize,
}

impl AddAssign<&SimplifyCfgStats> for SimplifyCfgStats {
    fn add_assign(&mut self, other: &SimplifyCfgStats) {
        self.functions_changed += other.functions_changed;
        self.unreachable_blocks_removed += other.unreachable_blocks_removed;
        self.dead_blocks_removed += other.dead_blocks_removed;
        self.blocks_merged += other.blocks_merged;
        self.trampolines_collapsed += other.trampolines_collapsed;
        self.terminators_folded += other.terminators_folded;
        self.conditions_inverted += other.conditions_inverted;
        self.jumps_threaded += other.jumps_threaded;
        self.arguments_split += other.arguments_split;
        self.dead_arguments_removed += other.dead_arguments_removed;
        self.trivial_phis_removed += other.trivial_phis_removed;
        self.values_propagated += other.values_propagated;
        self.cond_fails_hoisted += other.cond_fails_hoisted;
        self.cond_fails_removed += other.cond_fails_removed;
        self.dead_instructions_removed += other.dead_instructions_removed;
        self.switches_to_select += other.switches_to_select;
        self.blocks_tail_duplicated += other.blocks_tail_duplicated;
        self.critical_edges_split += other.critical_edges_split;
        self.switches_canonicalized += other.switches_canonicalized;
        self.dominator_iterations += other.dominator_iterations;
    }
}

impl SimplifyCfgStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let options: SimplifyCfgOptions =
            serde_json::from_str(r#"{ "max_dominator_iterations": 3 }"#).unwrap();
        assert_eq!(options.max_dominator_iterations, 3);
        assert_eq!(options.jump_threading_cost_limit, 6);
        assert!(options.enable_jump_threading);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut total = SimplifyCfgStats::default();
        let one = SimplifyCfgStats {
            blocks_merged: 2,
            ..Default::default()
        };
        total += &one;
        total += &one;
        assert_eq!(total.blocks_merged, 4);
        assert!(total.to_json().contains("\"blocks_merged\": 4"));
    }
}
