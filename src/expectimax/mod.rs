//! Expectiminimax search over duel positions (sequential and root-parallel).
//!
//! This module provides two search drivers:
//! - [`SearchEngine`]: single-threaded expectiminimax with alpha-beta pruning,
//!   forced-move shortcuts and an LRU transposition cache.
//! - [`ParallelSearch`]: explores root actions on the rayon pool, each with an
//!   isolated engine and cache.
//!
//! Both agree on the chosen action and its evaluation; the parallel driver only
//! changes how the work is spread.
//!
//! Notes
//! - Evaluations are exact rationals from the player's perspective (the
//!   maximizing side), scaled by the probability of reaching the node. A
//!   certain win is `1` and a certain loss `-1`; the infinities only bound
//!   search windows.
//! - Chance outcomes of one action are always summed in full before actions are
//!   compared; alpha-beta cutoffs only ever skip whole actions.
//!
//! Quick start
//! ```
//! use backshot::engine::DecisionNode;
//! use backshot::expectimax::{Evaluation, SearchEngine};
//!
//! let node = DecisionNode::new(2, 2, 4, 1, 3);
//! let mut engine = SearchEngine::new();
//! let best = engine.search(4, &node).unwrap();
//! assert!(best.action.is_some());
//! assert!(best.evaluation >= Evaluation::finite_ratio(-1, 1));
//! assert!(best.evaluation <= Evaluation::finite_ratio(1, 1));
//! ```

use std::fmt;
use std::ops::{AddAssign, Neg};

use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::engine::{Action, DecisionNode, Prob, MAX_TOKENS};

mod cache;
mod filter;
mod heuristic;
mod search_par;
mod search_seq;

pub use cache::{TranspositionCache, TranspositionEntry, TranspositionKey};
pub use filter::{forced_move, is_redundant};
pub use heuristic::odds;
pub use heuristic::{action_preference, leaf_value, leaf_value_for, outcome_value, predicted_value, side_to_move_safety};
pub use search_par::ParallelSearch;
pub use search_seq::SearchEngine;

/// Deepest search accepted; one ply per unresolved token of a full load.
pub const MAX_DEPTH: u32 = 8;

/// Configurable knobs for the search. Defaults enable every optimization.
///
/// - `depth_cap`: optional cap applied by [`SearchEngine::best_move`]'s dynamic depth.
/// - `cache_enabled` / `cache_capacity`: transposition cache switch and bound.
/// - `pruning`: alpha-beta cutoffs across actions.
/// - `forced_moves`: collapse provably dominant actions before searching.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub depth_cap: Option<u32>,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub pruning: bool,
    pub forced_moves: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth_cap: None,
            cache_enabled: true,
            cache_capacity: 1 << 16,
            pruning: true,
            forced_moves: true,
        }
    }
}

/// Basic search stats for a single top-level call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub nodes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cutoffs: u64,
    pub illegal_skipped: u64,
}

impl AddAssign for SearchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes += rhs.nodes;
        self.cache_hits += rhs.cache_hits;
        self.cache_misses += rhs.cache_misses;
        self.cutoffs += rhs.cutoffs;
        self.illegal_skipped += rhs.illegal_skipped;
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search depth {depth} exceeds the maximum of {max}")]
    DepthTooLarge { depth: u32, max: u32 },
    #[error("{tokens} tokens left in the load, at most {max} fit")]
    TooManyTokens { tokens: u8, max: u8 },
}

pub(crate) fn check_depth(depth: u32) -> Result<(), SearchError> {
    if depth > MAX_DEPTH {
        return Err(SearchError::DepthTooLarge { depth, max: MAX_DEPTH });
    }
    Ok(())
}

/// Validate a top-level search request.
pub(crate) fn check_search(depth: u32, state: &DecisionNode) -> Result<(), SearchError> {
    check_depth(depth)?;
    let tokens = state.live_remaining.saturating_add(state.blank_remaining);
    if tokens > MAX_TOKENS {
        return Err(SearchError::TooManyTokens { tokens, max: MAX_TOKENS });
    }
    Ok(())
}

/// Score of a position or action, positive favoring the player.
///
/// Ordered `NegInf < Finite(_) < PosInf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Evaluation {
    NegInf,
    Finite(Prob),
    PosInf,
}

impl Evaluation {
    #[inline]
    pub fn zero() -> Self { Evaluation::Finite(Prob::zero()) }

    #[inline]
    pub fn finite_ratio(numer: i128, denom: i128) -> Self { Evaluation::Finite(Prob::new(numer, denom)) }

    /// Weight by the probability of reaching a node. Infinities stay infinite.
    #[inline]
    pub fn scale(self, probability: Prob) -> Self {
        match self {
            Evaluation::Finite(v) => Evaluation::Finite(v * probability),
            other => other,
        }
    }

    /// Inverse of [`Self::scale`]; `probability` must be positive.
    #[inline]
    pub fn unscale(self, probability: Prob) -> Self {
        match self {
            Evaluation::Finite(v) => Evaluation::Finite(v / probability),
            other => other,
        }
    }

    /// Calibrated chance that the player wins, mapping `[-1, 1]` onto `[0, 1]`.
    ///
    /// ```
    /// use backshot::engine::Prob;
    /// use backshot::expectimax::Evaluation;
    /// assert_eq!(Evaluation::PosInf.player_win_probability(), Prob::from_integer(1));
    /// assert_eq!(Evaluation::finite_ratio(1, 2).player_win_probability(), Prob::new(3, 4));
    /// ```
    pub fn player_win_probability(self) -> Prob {
        match self {
            Evaluation::NegInf => Prob::zero(),
            Evaluation::PosInf => Prob::one(),
            Evaluation::Finite(v) => {
                let p = (v + Prob::one()) / Prob::from_integer(2);
                p.max(Prob::zero()).min(Prob::one())
            }
        }
    }

    /// Lossy float view for display.
    pub fn to_f64(self) -> f64 {
        match self {
            Evaluation::NegInf => f64::NEG_INFINITY,
            Evaluation::PosInf => f64::INFINITY,
            Evaluation::Finite(v) => *v.numer() as f64 / *v.denom() as f64,
        }
    }
}

impl Neg for Evaluation {
    type Output = Evaluation;

    fn neg(self) -> Self::Output {
        match self {
            Evaluation::NegInf => Evaluation::PosInf,
            Evaluation::PosInf => Evaluation::NegInf,
            Evaluation::Finite(v) => Evaluation::Finite(-v),
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::NegInf => f.write_str("-inf"),
            Evaluation::PosInf => f.write_str("+inf"),
            Evaluation::Finite(v) => write!(f, "{} (~{:.4})", v, self.to_f64()),
        }
    }
}

/// Search result: the chosen action, its evaluation and the line it expects.
///
/// `action == None` marks a leaf evaluation with no decision left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub action: Option<Action>,
    pub evaluation: Evaluation,
    pub principal_line: Vec<Action>,
}

impl Move {
    #[inline]
    pub fn leaf(evaluation: Evaluation) -> Self { Self { action: None, evaluation, principal_line: Vec::new() } }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            None => write!(f, "Evaluation: {}", self.evaluation),
            Some(action) => write!(f, "Move ({}, {})", action, self.evaluation),
        }
    }
}

/// Per-action evaluation at the root, searched with a full window.
///
/// `principal_line` starts with `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchEval {
    pub action: Action,
    pub evaluation: Evaluation,
    pub principal_line: Vec<Action>,
}

/// Pick the first strictly best branch for the side to move.
pub(crate) fn pick_best(branches: &[BranchEval], maximizing: bool) -> Option<&BranchEval> {
    let mut best: Option<&BranchEval> = None;
    for branch in branches {
        let improves = match best {
            None => true,
            Some(current) if maximizing => branch.evaluation > current.evaluation,
            Some(current) => branch.evaluation < current.evaluation,
        };
        if improves {
            best = Some(branch);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_order_puts_infinities_outside() {
        let mut values = vec![
            Evaluation::PosInf,
            Evaluation::finite_ratio(1, 3),
            Evaluation::NegInf,
            Evaluation::finite_ratio(-1, 2),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Evaluation::NegInf,
                Evaluation::finite_ratio(-1, 2),
                Evaluation::finite_ratio(1, 3),
                Evaluation::PosInf,
            ]
        );
    }

    #[test]
    fn scale_and_unscale_are_inverse() {
        let p = Prob::new(3, 8);
        let e = Evaluation::finite_ratio(-2, 5);
        assert_eq!(e.scale(p), Evaluation::finite_ratio(-6, 40));
        assert_eq!(e.scale(p).unscale(p), e);
        assert_eq!(Evaluation::PosInf.scale(p), Evaluation::PosInf);
        assert_eq!(-Evaluation::PosInf, Evaluation::NegInf);
    }

    #[test]
    fn win_probability_is_clamped() {
        assert_eq!(Evaluation::NegInf.player_win_probability(), Prob::zero());
        assert_eq!(Evaluation::zero().player_win_probability(), Prob::new(1, 2));
        assert_eq!(Evaluation::finite_ratio(3, 1).player_win_probability(), Prob::one());
    }

    #[test]
    fn depth_is_validated() {
        assert!(check_depth(MAX_DEPTH).is_ok());
        assert_eq!(
            check_depth(MAX_DEPTH + 1),
            Err(SearchError::DepthTooLarge { depth: MAX_DEPTH + 1, max: MAX_DEPTH })
        );
    }

    #[test]
    fn overlong_loads_are_rejected() {
        assert!(check_search(MAX_DEPTH, &DecisionNode::new(2, 2, 4, 4, 4)).is_ok());
        assert_eq!(
            check_search(2, &DecisionNode::new(2, 2, 4, 16, 1)),
            Err(SearchError::TooManyTokens { tokens: 17, max: MAX_TOKENS })
        );
        assert!(matches!(check_search(9, &DecisionNode::new(2, 2, 4, 1, 1)), Err(SearchError::DepthTooLarge { .. })));
    }

    #[test]
    fn pick_best_keeps_the_first_of_ties() {
        let branches = vec![
            BranchEval { action: Action::FireAtSelf, evaluation: Evaluation::zero(), principal_line: vec![] },
            BranchEval { action: Action::FireAtOpponent, evaluation: Evaluation::zero(), principal_line: vec![] },
            BranchEval {
                action: Action::UseBeer,
                evaluation: Evaluation::finite_ratio(-1, 4),
                principal_line: vec![],
            },
        ];
        assert_eq!(pick_best(&branches, true).map(|b| b.action), Some(Action::FireAtSelf));
        assert_eq!(pick_best(&branches, false).map(|b| b.action), Some(Action::UseBeer));
    }
}
