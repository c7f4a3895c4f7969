use std::path::PathBuf;

use anyhow::{bail, ensure, Context};
use backshot::engine::{Action, DecisionNode, ItemKind, Prob, Side, Token, MAX_TOKENS};
use backshot::expectimax::{Evaluation, Move, ParallelSearch, SearchConfig, SearchEngine, SearchStats, MAX_DEPTH};
use backshot::replay::{self, OddsQuery};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use num_traits::One;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "backshot", about = "Expectiminimax solver for the live/blank token duel")]
struct Args {
    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Search one position and print the best action
    Analyze {
        #[command(flatten)]
        position: PositionArgs,

        #[command(flatten)]
        search: SearchArgs,

        /// Search root actions on the rayon pool
        #[arg(long)]
        parallel: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate match logs, answering `!check <side> odds` lines with a search
    Replay {
        /// Match logs to replay
        #[arg(required = true)]
        logfiles: Vec<PathBuf>,

        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(clap::Args, Debug)]
struct PositionArgs {
    /// Player charges
    #[arg(long)]
    player: u8,

    /// Dealer charges
    #[arg(long)]
    dealer: u8,

    /// Charges each party starts the phase with
    #[arg(long)]
    max_charges: u8,

    /// Charges at or below which a party turns critical
    #[arg(long, default_value_t = 0)]
    critical_at: u8,

    /// Live tokens left
    #[arg(long)]
    live: u8,

    /// Blank tokens left
    #[arg(long)]
    blank: u8,

    /// Player items as codes: c cigarettes, s saw, h cuffs, b beer, m glass
    #[arg(long, default_value = "")]
    player_items: String,

    /// Dealer items as codes
    #[arg(long, default_value = "")]
    dealer_items: String,

    /// Side to move (player or dealer)
    #[arg(long, default_value = "player", value_parser = parse_side)]
    turn: Side,

    /// Upcoming token, when it has been revealed (live or blank)
    #[arg(long, value_parser = parse_token)]
    next: Option<Token>,

    /// The side not on turn skips its next turn
    #[arg(long)]
    cuffed: bool,

    /// The gun is sawed off
    #[arg(long)]
    sawed: bool,

    /// The player is critical
    #[arg(long)]
    player_critical: bool,

    /// The dealer is critical
    #[arg(long)]
    dealer_critical: bool,
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// Search depth (default: one ply per remaining token, at most 8)
    #[arg(long)]
    depth: Option<u32>,

    /// Disable alpha-beta cutoffs
    #[arg(long)]
    no_pruning: bool,

    /// Disable the transposition cache
    #[arg(long)]
    no_cache: bool,

    /// Disable forced-move shortcuts
    #[arg(long)]
    no_forced: bool,

    /// Transposition cache capacity in entries
    #[arg(long, default_value_t = 1 << 16)]
    cache_capacity: usize,
}

impl SearchArgs {
    fn config(&self) -> SearchConfig {
        SearchConfig {
            depth_cap: None,
            cache_enabled: !self.no_cache,
            cache_capacity: self.cache_capacity,
            pruning: !self.no_pruning,
            forced_moves: !self.no_forced,
        }
    }
}

fn parse_side(word: &str) -> Result<Side, String> {
    Side::from_word(word).ok_or_else(|| format!("expected player or dealer, got {:?}", word))
}

fn parse_token(word: &str) -> Result<Token, String> {
    Token::from_word(word).ok_or_else(|| format!("expected live or blank, got {:?}", word))
}

fn parse_items(codes: &str) -> anyhow::Result<Vec<ItemKind>> {
    codes
        .chars()
        .map(|c| ItemKind::from_code(c).with_context(|| format!("unknown item code {:?}", c)))
        .collect()
}

impl PositionArgs {
    fn to_node(&self) -> anyhow::Result<DecisionNode> {
        ensure!(
            self.live as u16 + self.blank as u16 <= MAX_TOKENS as u16,
            "at most {} tokens fit in one load",
            MAX_TOKENS
        );
        ensure!(
            self.player <= self.max_charges && self.dealer <= self.max_charges,
            "charges cannot exceed --max-charges"
        );
        let mut node = DecisionNode::new(self.player, self.dealer, self.max_charges, self.live, self.blank)
            .with_critical_charges(self.critical_at)
            .with_turn(self.turn)
            .with_handcuffs(self.cuffed)
            .with_saw(self.sawed);
        node.player.critical = self.player_critical;
        node.dealer.critical = self.dealer_critical;
        if let Some(token) = self.next {
            ensure!(node.remaining(token) > 0, "no {} token left to reveal", token);
            node = node.with_revealed(token);
        }
        for (side, codes) in [(Side::Player, &self.player_items), (Side::Dealer, &self.dealer_items)] {
            for kind in parse_items(codes)? {
                node = node.give_item(side, kind)?;
            }
        }
        Ok(node)
    }
}

/// `-v` picks the level; `RUST_LOG` still refines it per module.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

#[derive(Serialize)]
struct Report<'a> {
    depth: u32,
    best: &'a Move,
    player_win_probability: f64,
    stats: SearchStats,
}

fn probability(p: Prob) -> f64 { Evaluation::Finite(p).to_f64() }

fn win_probability_for(side: Side, evaluation: Evaluation) -> Prob {
    let p = evaluation.player_win_probability();
    match side {
        Side::Player => p,
        Side::Dealer => Prob::one() - p,
    }
}

fn line_string(line: &[Action]) -> String {
    line.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" -> ")
}

fn run_analyze(position: &PositionArgs, search: &SearchArgs, parallel: bool, json: bool) -> anyhow::Result<()> {
    let node = position.to_node()?;
    let cfg = search.config();
    let (depth, best, stats) = if parallel {
        let mut searcher = ParallelSearch::with_config(cfg);
        let depth = search.depth.unwrap_or_else(|| searcher.compute_depth(&node));
        let best = searcher.search(depth, &node)?;
        (depth, best, searcher.last_stats())
    } else {
        let mut engine = SearchEngine::with_config(cfg);
        let depth = search.depth.unwrap_or_else(|| engine.compute_depth(&node));
        let best = engine.search(depth, &node)?;
        (depth, best, engine.last_stats())
    };
    info!("searched {} nodes at depth {}", stats.nodes, depth);

    let win = win_probability_for(Side::Player, best.evaluation);
    if json {
        let report = Report { depth, best: &best, player_win_probability: probability(win), stats };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{}", node);
    println!("depth: {}", depth);
    match best.action {
        Some(action) => println!("best: {}", action),
        None => println!("best: none (nothing left to decide)"),
    }
    println!("evaluation: {}", best.evaluation);
    println!("player win probability: {:.4}", probability(win));
    if !best.principal_line.is_empty() {
        println!("line: {}", line_string(&best.principal_line));
    }
    println!(
        "nodes: {}, cache hits: {}, cutoffs: {}, skipped: {}",
        stats.nodes, stats.cache_hits, stats.cutoffs, stats.illegal_skipped
    );
    Ok(())
}

fn answer(engine: &mut SearchEngine, depth: Option<u32>, line: usize, query: &OddsQuery) {
    let Some(node) = &query.node else {
        println!("{} odds: 0.0000 (no round in progress)", query.side);
        return;
    };
    let depth = depth.unwrap_or_else(|| engine.compute_depth(node));
    match engine.search(depth, node) {
        Ok(best) => println!(
            "{} odds: {:.4} ({}, line {})",
            query.side,
            probability(win_probability_for(query.side, best.evaluation)),
            best,
            line
        ),
        Err(err) => warn!("line {}: {}", line, err),
    }
}

fn run_replay(logfiles: &[PathBuf], search: &SearchArgs) -> bool {
    let mut engine = SearchEngine::with_config(search.config());
    let mut all_ok = true;
    for path in logfiles {
        let outcome = replay::replay_file(path, |line, query| answer(&mut engine, search.depth, line, &query));
        match outcome {
            Ok(replay) => {
                match replay.winner() {
                    Some(winner) => info!("{}: {} won the game", path.display(), winner),
                    None => info!("{}: {} phases completed", path.display(), replay.completed_phases()),
                }
                eprintln!("{} ok", path.display());
            }
            Err(err) => {
                eprintln!("{} failed", path.display());
                eprintln!("{}", err);
                all_ok = false;
            }
        }
    }
    all_ok
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match &args.cmd {
        Cmd::Analyze { position, search, parallel, json } => run_analyze(position, search, *parallel, *json),
        Cmd::Replay { logfiles, search } => {
            if let Some(depth) = search.depth {
                if depth > MAX_DEPTH {
                    bail!("--depth {} exceeds the maximum of {}", depth, MAX_DEPTH);
                }
            }
            if !run_replay(logfiles, search) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
