//! backshot: an expectiminimax solver for a two-party live/blank token duel
//!
//! This crate provides:
//! - A rules engine (`engine`) with an immutable `DecisionNode` position type
//! - An expectiminimax search (`expectimax` module) with sequential and root-parallel drivers
//! - A match-log replayer (`replay`) that validates transcripts and surfaces odds queries
//!
//! Quick start:
//! ```
//! use backshot::engine::{DecisionNode, ItemKind, Side};
//! use backshot::expectimax::SearchEngine;
//!
//! // 2 vs 2 charges out of 4, one live and three blank tokens, player to move
//! let node = DecisionNode::new(2, 2, 4, 1, 3).with_items(Side::Player, &[ItemKind::MagnifyingGlass]);
//! let mut engine = SearchEngine::new();
//! let best = engine.best_move(&node).unwrap();
//! println!("{} (line: {:?})", best, best.principal_line);
//! assert!(best.action.is_some());
//! ```
//!
//! Evaluations are exact rationals (`engine::Prob`); convert with
//! `Evaluation::to_f64` only for display.
//!
pub mod engine;
pub mod expectimax;
pub mod replay;
