use log::debug;
use rayon::prelude::*;

use crate::engine::DecisionNode;

use super::heuristic::outcome_value;
use super::search_seq::{candidate_actions, depth_for, is_leaf, SearchEngine};
use super::{check_search, pick_best, BranchEval, Evaluation, Move, SearchConfig, SearchError, SearchStats};

/// Root-parallel expectiminimax on the rayon pool.
///
/// Every root action is searched by its own [`SearchEngine`] with a full
/// window and a private cache, so no state is shared between workers. The
/// chosen action and evaluation match the sequential engine's.
pub struct ParallelSearch {
    cfg: SearchConfig,
    stats: SearchStats,
}

impl ParallelSearch {
    pub fn new() -> Self { Self::with_config(SearchConfig::default()) }

    pub fn with_config(cfg: SearchConfig) -> Self { Self { cfg, stats: SearchStats::default() } }

    /// Compute the best move using parallel expectiminimax.
    ///
    /// This is a convenience wrapper around `branch_evals` that picks the first
    /// strictly best branch for the side to move.
    pub fn search(&mut self, depth: u32, state: &DecisionNode) -> Result<Move, SearchError> {
        let branches = self.branch_evals(depth, state)?;
        let best = match pick_best(&branches, state.is_players_turn) {
            Some(branch) => Move {
                action: Some(branch.action),
                evaluation: branch.evaluation,
                principal_line: branch.principal_line.clone(),
            },
            None => Move::leaf(outcome_value(state).scale(state.branch_probability)),
        };
        debug!("parallel search depth {} -> {} ({} nodes)", depth, best, self.stats.nodes);
        Ok(best)
    }

    #[inline]
    pub fn best_move(&mut self, state: &DecisionNode) -> Result<Move, SearchError> {
        let depth = self.compute_depth(state);
        self.search(depth, state)
    }

    /// Same dynamic depth as [`SearchEngine::compute_depth`].
    #[inline]
    pub fn compute_depth(&self, state: &DecisionNode) -> u32 { depth_for(&self.cfg, state) }

    /// Exact value of every searchable root action, computed in parallel.
    ///
    /// Output follows the sequential candidate order; rejected actions are
    /// left out.
    pub fn branch_evals(&mut self, depth: u32, state: &DecisionNode) -> Result<Vec<BranchEval>, SearchError> {
        check_search(depth, state)?;
        self.reset_stats();
        if is_leaf(depth, state) {
            return Ok(Vec::new());
        }
        let actions = candidate_actions(&self.cfg, state);
        let results: Vec<(Option<BranchEval>, SearchStats)> = actions
            .par_iter()
            .map(|&action| {
                let mut engine = SearchEngine::with_config(self.cfg.clone());
                let outcome =
                    engine.evaluate_action(depth, state, action, Evaluation::NegInf, Evaluation::PosInf, &[]);
                let branch = outcome.map(|outcome| {
                    let mut principal_line = vec![action];
                    principal_line.extend(outcome.line);
                    BranchEval { action, evaluation: outcome.evaluation, principal_line }
                });
                (branch, engine.last_stats())
            })
            .collect();

        self.stats.nodes += 1;
        let mut out = Vec::with_capacity(results.len());
        for (branch, stats) in results {
            self.stats += stats;
            out.extend(branch);
        }
        Ok(out)
    }

    /// Statistics summed over all workers of the last call.
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    /// Reset accumulated stats to zero.
    #[inline]
    pub fn reset_stats(&mut self) { self.stats = SearchStats::default(); }
}

impl Default for ParallelSearch {
    fn default() -> Self { Self::new() }
}
