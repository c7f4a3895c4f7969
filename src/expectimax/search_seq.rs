use std::cmp::Reverse;

use log::{debug, trace};
use num_traits::Zero;

use crate::engine::{Action, DecisionNode, Prob};

use super::cache::{TranspositionCache, TranspositionEntry, TranspositionKey};
use super::filter::{forced_move, is_redundant};
use super::heuristic::{action_preference, outcome_value, predicted_value};
use super::{check_search, BranchEval, Evaluation, Move, SearchConfig, SearchError, SearchStats, MAX_DEPTH};

/// Value and line of one action searched from a node.
#[derive(Debug, Clone)]
pub(crate) struct ActionOutcome {
    pub evaluation: Evaluation,
    /// Actions below the searched one, not including it.
    pub line: Vec<Action>,
}

/// Probability-weighted sum over the chance children of one action.
///
/// Child values arrive already scaled by their branch probability. An
/// infinity counts as a certain outcome over that child's mass.
struct ChanceSum {
    total: Prob,
}

impl ChanceSum {
    fn new() -> Self { Self { total: Prob::zero() } }

    fn add(&mut self, value: Evaluation, probability: Prob) {
        self.total += match value {
            Evaluation::Finite(v) => v,
            Evaluation::PosInf => probability,
            Evaluation::NegInf => -probability,
        };
    }

    fn total(&self) -> Evaluation { Evaluation::Finite(self.total) }
}

#[inline]
fn strictly_inside(value: Evaluation, alpha: Evaluation, beta: Evaluation) -> bool {
    (alpha == Evaluation::NegInf || value > alpha) && (beta == Evaluation::PosInf || value < beta)
}

/// Actions worth searching from `state`, best-predicted first.
///
/// Sorted by [`predicted_value`], then by the mover's [`action_preference`].
/// A forced move the rules accept replaces the whole list.
pub(crate) fn candidate_actions(cfg: &SearchConfig, state: &DecisionNode) -> Vec<Action> {
    if cfg.forced_moves {
        if let Some(action) = forced_move(state) {
            if state.apply(action).is_ok() {
                return vec![action];
            }
        }
    }
    let mut actions: Vec<Action> =
        state.legal_actions().into_iter().filter(|&action| !is_redundant(action, state)).collect();
    actions.sort_by_key(|&action| {
        (Reverse(predicted_value(action, state)), Reverse(action_preference(action, state)))
    });
    actions
}

/// One ply per remaining token, capped by [`MAX_DEPTH`] and the configured cap.
pub(crate) fn depth_for(cfg: &SearchConfig, state: &DecisionNode) -> u32 {
    let dyn_depth = (state.total_tokens() as u32).min(MAX_DEPTH);
    match cfg.depth_cap {
        Some(cap) => dyn_depth.min(cap),
        None => dyn_depth,
    }
}

/// No decision left to search: depth exhausted, a party out of charges, or
/// no live token left and the round heading for a reload.
#[inline]
pub(crate) fn is_leaf(depth: u32, state: &DecisionNode) -> bool {
    depth == 0 || state.is_decided() || state.live_remaining == 0
}

#[inline]
fn leaf_move(state: &DecisionNode) -> Move { Move::leaf(outcome_value(state).scale(state.branch_probability)) }

/// Single-threaded expectiminimax with alpha-beta pruning.
///
/// The transposition cache lives as long as the engine, so repeated searches
/// reuse earlier work; [`Self::clear_cache`] drops it.
pub struct SearchEngine {
    cfg: SearchConfig,
    cache: TranspositionCache,
    stats: SearchStats,
}

impl SearchEngine {
    pub fn new() -> Self { Self::with_config(SearchConfig::default()) }

    pub fn with_config(cfg: SearchConfig) -> Self {
        let cache = TranspositionCache::new(cfg.cache_capacity);
        Self { cfg, cache, stats: SearchStats::default() }
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig { &self.cfg }

    /// Best action from `state`, looking `depth` plies ahead.
    ///
    /// Example
    /// ```
    /// use backshot::engine::{Action, DecisionNode, Token};
    /// use backshot::expectimax::{Evaluation, SearchEngine};
    /// let node = DecisionNode::new(3, 1, 3, 2, 1).with_revealed(Token::Live);
    /// let mut engine = SearchEngine::new();
    /// let best = engine.search(2, &node).unwrap();
    /// assert_eq!(best.action, Some(Action::FireAtOpponent));
    /// assert_eq!(best.evaluation, Evaluation::finite_ratio(1, 1));
    /// ```
    pub fn search(&mut self, depth: u32, state: &DecisionNode) -> Result<Move, SearchError> {
        check_search(depth, state)?;
        self.reset_stats();
        let best = self.search_window(depth, state, Evaluation::NegInf, Evaluation::PosInf, &[]);
        debug!(
            "search depth {} -> {} line {:?} ({} nodes, {} cache hits, {} misses, {} cutoffs)",
            depth,
            best,
            best.principal_line,
            self.stats.nodes,
            self.stats.cache_hits,
            self.stats.cache_misses,
            self.stats.cutoffs,
        );
        Ok(best)
    }

    /// [`Self::search`] at the depth picked by [`Self::compute_depth`].
    #[inline]
    pub fn best_move(&mut self, state: &DecisionNode) -> Result<Move, SearchError> {
        let depth = self.compute_depth(state);
        self.search(depth, state)
    }

    /// Search one node inside the window `(alpha, beta)`.
    ///
    /// Values outside the window are bounds, not exact values. `history` is
    /// the action path from the root and only feeds diagnostics.
    pub fn search_window(
        &mut self,
        depth: u32,
        state: &DecisionNode,
        mut alpha: Evaluation,
        mut beta: Evaluation,
        history: &[Action],
    ) -> Move {
        self.stats.nodes += 1;
        if is_leaf(depth, state) {
            return leaf_move(state);
        }
        let maximizing = state.is_players_turn;
        let mut best: Option<Move> = None;
        for action in candidate_actions(&self.cfg, state) {
            let Some(outcome) = self.evaluate_action(depth, state, action, alpha, beta, history) else {
                continue;
            };
            let improves = match &best {
                None => true,
                Some(current) if maximizing => outcome.evaluation > current.evaluation,
                Some(current) => outcome.evaluation < current.evaluation,
            };
            if improves {
                let mut line = Vec::with_capacity(outcome.line.len() + 1);
                line.push(action);
                line.extend(outcome.line);
                best = Some(Move { action: Some(action), evaluation: outcome.evaluation, principal_line: line });
            }
            if self.cfg.pruning {
                if maximizing {
                    alpha = alpha.max(outcome.evaluation);
                } else {
                    beta = beta.min(outcome.evaluation);
                }
                if beta <= alpha {
                    self.stats.cutoffs += 1;
                    trace!("cutoff after {} at {:?} {}", action, history, outcome.evaluation);
                    break;
                }
            }
        }
        best.unwrap_or_else(|| leaf_move(state))
    }

    /// Value of `action` from a non-leaf `state`, or `None` if the rules reject it.
    ///
    /// A single successor inherits the window; chance successors are each
    /// searched with a full window and summed.
    pub(crate) fn evaluate_action(
        &mut self,
        depth: u32,
        state: &DecisionNode,
        action: Action,
        alpha: Evaluation,
        beta: Evaluation,
        history: &[Action],
    ) -> Option<ActionOutcome> {
        let key = self.cfg.cache_enabled.then(|| TranspositionKey::new(state, action));
        if let Some(key) = &key {
            if let Some(entry) = self.cache.probe(key, depth) {
                self.stats.cache_hits += 1;
                trace!("cache hit for {} at {:?}", action, history);
                return Some(ActionOutcome {
                    evaluation: entry.evaluation.scale(state.branch_probability),
                    line: entry.principal_line,
                });
            }
            self.stats.cache_misses += 1;
        }

        let children = match state.apply(action) {
            Ok(children) => children,
            Err(err) => {
                self.stats.illegal_skipped += 1;
                trace!("skipping {} at {:?}: {}", action, history, err);
                return None;
            }
        };
        let mut path = history.to_vec();
        path.push(action);

        let (evaluation, line, exact) = match children.as_slice() {
            [] => return None,
            [child] => {
                let reply = self.search_window(depth - 1, child, alpha, beta, &path);
                let exact = !self.cfg.pruning || strictly_inside(reply.evaluation, alpha, beta);
                (reply.evaluation, reply.principal_line, exact)
            }
            _ => {
                let mut sum = ChanceSum::new();
                let mut line: Vec<Action> = Vec::new();
                let mut line_probability: Option<Prob> = None;
                for child in &children {
                    let reply = self.search_window(depth - 1, child, Evaluation::NegInf, Evaluation::PosInf, &path);
                    sum.add(reply.evaluation, child.branch_probability);
                    if line_probability.map_or(true, |p| child.branch_probability > p) {
                        line_probability = Some(child.branch_probability);
                        line = reply.principal_line;
                    }
                }
                (sum.total(), line, true)
            }
        };

        if exact {
            if let Some(key) = key {
                self.cache.insert(
                    key,
                    TranspositionEntry {
                        evaluation: evaluation.unscale(state.branch_probability),
                        depth,
                        principal_line: line.clone(),
                    },
                );
            }
        }
        Some(ActionOutcome { evaluation, line })
    }

    /// Every searchable root action with its exact value.
    ///
    /// Each action gets a full window, so this costs more than [`Self::search`]
    /// but reports all alternatives. Each `principal_line` starts with its action.
    pub fn branch_evals(&mut self, depth: u32, state: &DecisionNode) -> Result<Vec<BranchEval>, SearchError> {
        check_search(depth, state)?;
        self.reset_stats();
        if is_leaf(depth, state) {
            return Ok(Vec::new());
        }
        self.stats.nodes += 1;
        let mut out = Vec::new();
        for action in candidate_actions(&self.cfg, state) {
            if let Some(outcome) =
                self.evaluate_action(depth, state, action, Evaluation::NegInf, Evaluation::PosInf, &[])
            {
                let mut principal_line = vec![action];
                principal_line.extend(outcome.line);
                out.push(BranchEval { action, evaluation: outcome.evaluation, principal_line });
            }
        }
        Ok(out)
    }

    /// Statistics collected from the last call to [`Self::search`] or
    /// [`Self::branch_evals`].
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    /// Reset accumulated stats to zero.
    #[inline]
    pub fn reset_stats(&mut self) { self.stats = SearchStats::default(); }

    /// Plies left in the current load, bounded by [`MAX_DEPTH`] and `depth_cap`.
    #[inline]
    pub fn compute_depth(&self, state: &DecisionNode) -> u32 { depth_for(&self.cfg, state) }

    #[inline]
    pub fn cache_len(&self) -> usize { self.cache.len() }

    pub fn clear_cache(&mut self) { self.cache.clear(); }
}

impl Default for SearchEngine {
    fn default() -> Self { Self::new() }
}
