//! Match-log replay.
//!
//! A match log is a plain-text transcript, one statement per line:
//!
//! ```text
//! phase I, 2 charges
//! round I.1
//! player gets cigs, knife
//! dealer loads 1 live, 1 blank
//! player shoots dealer, blank
//! !check shells = 1 live, 0 blank
//! !check dealer odds
//! ```
//!
//! `;` joins several statements on one line and `#` starts a comment. Every
//! statement is replayed against the rules engine, `!check` lines are verified
//! and `!check <side> odds` lines are handed back to the caller as
//! [`OddsQuery`] values to answer with a search.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use log::debug;

use crate::engine::{DecisionNode, Inventory, ItemKind, RulesError, Side, Token};

/// Phases in one match.
pub const TOTAL_PHASES: usize = 3;

// Recognized but outside the supported item set.
const UNSUPPORTED_ITEMS: [&str; 6] = ["phone", "adrenaline", "inverter", "medicine", "jammer", "remote"];

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("unrecognized statement, expecting {0}")]
    NoMatch(&'static str),
    #[error("{0}")]
    InvalidLine(String),
    #[error("setup: {0}")]
    Setup(String),
    #[error("check failed: {0}")]
    CheckFailed(String),
    #[error("not your turn")]
    OutOfTurn,
    #[error("unsupported item {0:?}")]
    UnsupportedItem(String),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A [`ReplayError`] located in its log.
#[derive(thiserror::Error, Debug)]
#[error("line {line}: {text:?}: {source}")]
pub struct LineError {
    /// 1-based; 0 when the log could not be opened.
    pub line: usize,
    pub text: String,
    pub source: ReplayError,
}

/// A `!check <side> odds` statement. `node` is the table at that point, or
/// `None` when no round is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OddsQuery {
    pub side: Side,
    pub node: Option<DecisionNode>,
}

#[derive(Debug, Clone)]
struct Phase {
    table: DecisionNode,
    round_active: bool,
    completed_rounds: u32,
}

/// State of a match being replayed.
#[derive(Debug, Clone, Default)]
pub struct Replay {
    double_or_nothing: bool,
    phase: Option<Phase>,
    phase_winners: Vec<Side>,
    winner: Option<Side>,
}

impl Replay {
    pub fn new() -> Self { Self::default() }

    #[inline]
    pub fn is_double_or_nothing(&self) -> bool { self.double_or_nothing }

    #[inline]
    pub fn completed_phases(&self) -> usize { self.phase_winners.len() }

    /// Winner of each completed phase, in order.
    #[inline]
    pub fn phase_winners(&self) -> &[Side] { &self.phase_winners }

    #[inline]
    pub fn winner(&self) -> Option<Side> { self.winner }

    /// The current phase's table, between rounds included.
    #[inline]
    pub fn table(&self) -> Option<&DecisionNode> { self.phase.as_ref().map(|phase| &phase.table) }

    #[inline]
    pub fn round_in_progress(&self) -> bool { self.phase.as_ref().is_some_and(|phase| phase.round_active) }

    /// Replay one log line. A failing statement leaves the match unchanged,
    /// but statements before it on the same line stay applied.
    pub fn feed_line(&mut self, line: &str) -> Result<Vec<OddsQuery>, ReplayError> {
        let line = match line.find('#') {
            Some(at) => &line[..at],
            None => line,
        };
        let mut queries = Vec::new();
        for statement in line.split(';') {
            let spaced = space_punctuation(statement);
            let words: Vec<&str> = spaced.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            if let Some(query) = self.feed_statement(&words)? {
                queries.push(query);
            }
        }
        Ok(queries)
    }

    fn feed_statement(&mut self, words: &[&str]) -> Result<Option<OddsQuery>, ReplayError> {
        if is_check(words) {
            return self.check(words);
        }
        if self.winner.is_some() {
            return Err(ReplayError::Setup("game over".into()));
        }
        match self.phase.as_ref().map(|phase| (phase.round_active, phase.table.actor())) {
            None => self.setup(words)?,
            Some((false, _)) => self.round_setup(words)?,
            Some((true, turn)) => {
                let actor = side(words[0]).map_err(|_| ReplayError::NoMatch("a game line"))?;
                if actor != turn {
                    return Err(ReplayError::OutOfTurn);
                }
                self.play(actor, words)?;
            }
        }
        Ok(None)
    }

    fn setup(&mut self, words: &[&str]) -> Result<(), ReplayError> {
        match words {
            ["player", "uses", "pills"] => {
                self.double_or_nothing = true;
                Ok(())
            }
            ["phase", name, ",", charges, "charges" | "charge", rest @ ..] => {
                let expected = self.completed_phases();
                if tally(name) != Some(expected) {
                    return Err(ReplayError::Setup(format!("expected phase {}", numeral(expected))));
                }
                let max_charges: u8 = number(charges)?;
                let critical_charges: u8 = match rest {
                    [] => 0,
                    [",", "critical", "at", critical] => number(critical)?,
                    _ => return Err(ReplayError::NoMatch("phase <numeral>, <n> charges, critical at <n>")),
                };
                let table = DecisionNode::new(max_charges, max_charges, max_charges, 0, 0)
                    .with_critical_charges(critical_charges);
                debug!("phase {} starts with {} charges", numeral(expected), max_charges);
                self.phase = Some(Phase { table, round_active: false, completed_rounds: 0 });
                Ok(())
            }
            _ => Err(ReplayError::NoMatch("phase <numeral>, <n> charges")),
        }
    }

    fn round_setup(&mut self, words: &[&str]) -> Result<(), ReplayError> {
        let completed_phases = self.completed_phases();
        let Some(phase) = self.phase.as_mut() else {
            return Err(ReplayError::Setup("no phase in progress".into()));
        };
        match words {
            ["round", phase_name, ".", round] => {
                if tally(phase_name) != Some(completed_phases) {
                    return Err(ReplayError::Setup(format!(
                        "expected a round in phase {}",
                        numeral(completed_phases)
                    )));
                }
                let round: u32 = number(round)?;
                if round != phase.completed_rounds + 1 {
                    return Err(ReplayError::Setup(format!("expected round {}", phase.completed_rounds + 1)));
                }
            }
            [who, "gets", items @ ..] => {
                let receiver = side(who)?;
                let mut table = phase.table.clone();
                for kind in item_list(items)? {
                    table = table.give_item(receiver, kind)?;
                }
                phase.table = table;
            }
            ["dealer", "loads", live, "live", ",", blank, "blank"] => {
                phase.table = phase.table.load(number(live)?, number(blank)?)?;
                phase.round_active = true;
            }
            _ => return Err(ReplayError::NoMatch("a round setup line")),
        }
        Ok(())
    }

    fn play(&mut self, actor: Side, words: &[&str]) -> Result<(), ReplayError> {
        let table = match &self.phase {
            Some(phase) => &phase.table,
            None => return Err(ReplayError::Setup("no phase in progress".into())),
        };
        let next = match words {
            [_, "shoots", target, ",", seen] => {
                let target = if *target == "self" { actor } else { side(target)? };
                table.fire(target, token(seen)?)?
            }
            [_, "uses", name, rest @ ..] => {
                let kind = item(name)?;
                match (kind, rest) {
                    (ItemKind::Cigarettes | ItemKind::HandSaw | ItemKind::Handcuffs, []) => {
                        table.use_item(kind, None)?
                    }
                    (ItemKind::MagnifyingGlass, []) if actor == Side::Dealer => table.use_item(kind, None)?,
                    (ItemKind::MagnifyingGlass, []) => {
                        return Err(ReplayError::InvalidLine("missing information: what did the player see?".into()))
                    }
                    (ItemKind::MagnifyingGlass, [",", "sees", seen]) if actor == Side::Player => {
                        table.reveal(token(seen)?)?
                    }
                    (ItemKind::MagnifyingGlass, [",", "sees", _]) => {
                        return Err(ReplayError::InvalidLine("too much information: the dealer's glass is private".into()))
                    }
                    (ItemKind::Beer, [",", "ejects", seen]) => table.eject(token(seen)?)?,
                    _ => return Err(ReplayError::NoMatch("a game line")),
                }
            }
            _ => return Err(ReplayError::NoMatch("a game line")),
        };
        self.settle(next);
        Ok(())
    }

    // Adopt the table after a move and close the round or phase it ended.
    fn settle(&mut self, table: DecisionNode) {
        let Some(phase) = self.phase.as_mut() else {
            return;
        };
        if table.is_decided() {
            let loser = if table.player.charges == 0 { Side::Player } else { Side::Dealer };
            let winner = loser.opponent();
            self.phase_winners.push(winner);
            self.phase = None;
            debug!("{} wins phase {}", winner, numeral(self.completed_phases() - 1));
            if (loser == Side::Player && self.double_or_nothing) || self.completed_phases() == TOTAL_PHASES {
                debug!("{} wins the game", winner);
                self.winner = Some(winner);
            }
            return;
        }
        if table.is_round_over() {
            phase.round_active = false;
            phase.completed_rounds += 1;
            debug!("round {} over", phase.completed_rounds);
        }
        phase.table = table;
    }

    fn check(&self, words: &[&str]) -> Result<Option<OddsQuery>, ReplayError> {
        let table = self.phase.as_ref().map(|phase| &phase.table);
        match words {
            ["!check", who, "odds"] => {
                let side = side(who)?;
                let node = if self.round_in_progress() { table.cloned() } else { None };
                return Ok(Some(OddsQuery { side, node }));
            }
            ["!check", who, "charges", "=", expected] => {
                let side = side(who)?;
                let expected: u8 = number(expected)?;
                let actual = table.map_or(0, |t| t.party(side).charges);
                if actual != expected {
                    return Err(ReplayError::CheckFailed(format!("actually, {} has {} charges", side, actual)));
                }
            }
            ["!check", who, "items", "=", items @ ..] => {
                let side = side(who)?;
                let expected = Inventory::from_items(&item_list(items)?);
                let actual = table.map_or(Inventory::EMPTY, |t| t.party(side).items);
                if actual != expected {
                    return Err(ReplayError::CheckFailed(format!("actually, {} has {}", side, actual)));
                }
            }
            ["!check", "shells", "=", live, "live", ",", blank, "blank"] => {
                let expected: (u8, u8) = (number(live)?, number(blank)?);
                let actual = match table {
                    Some(t) if self.round_in_progress() => (t.live_remaining, t.blank_remaining),
                    _ => (0, 0),
                };
                if actual != expected {
                    return Err(ReplayError::CheckFailed(format!(
                        "actually, there are {} live, {} blank tokens left",
                        actual.0, actual.1
                    )));
                }
            }
            [who, "wins", "phase", name] => {
                let expected = side(who)?;
                let completed = self.completed_phases();
                if completed == 0 || tally(name) != Some(completed - 1) {
                    return Err(ReplayError::InvalidLine(format!(
                        "phase {} is not the last completed one",
                        name
                    )));
                }
                let actual = self.phase_winners[completed - 1];
                if actual != expected {
                    return Err(ReplayError::CheckFailed(format!("actually, {} won phase {}", actual, name)));
                }
            }
            [who, "wins", "game"] => {
                let expected = side(who)?;
                match self.winner {
                    None => return Err(ReplayError::CheckFailed("actually, the game is ongoing".into())),
                    Some(actual) if actual != expected => {
                        return Err(ReplayError::CheckFailed(format!("actually, {} won the game", actual)))
                    }
                    Some(_) => {}
                }
            }
            _ => return Err(ReplayError::NoMatch("a check line")),
        }
        Ok(None)
    }
}

fn is_check(words: &[&str]) -> bool { words.first() == Some(&"!check") || words.get(1) == Some(&"wins") }

fn space_punctuation(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len() + 8);
    for c in statement.chars() {
        if matches!(c, ',' | '.' | '=') {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

// Tally numerals: "I" is phase 0, "II" phase 1, ...
fn tally(name: &str) -> Option<usize> {
    if name.is_empty() || !name.chars().all(|c| c == 'I') {
        return None;
    }
    Some(name.len() - 1)
}

fn numeral(phase: usize) -> String { "I".repeat(phase + 1) }

fn number<T: FromStr>(word: &str) -> Result<T, ReplayError> {
    word.parse().map_err(|_| ReplayError::InvalidLine(format!("expected a number, got {:?}", word)))
}

fn side(word: &str) -> Result<Side, ReplayError> {
    Side::from_word(word).ok_or_else(|| ReplayError::InvalidLine(format!("no such party {:?}", word)))
}

fn token(word: &str) -> Result<Token, ReplayError> {
    Token::from_word(word).ok_or_else(|| ReplayError::InvalidLine(format!("expected live or blank, got {:?}", word)))
}

fn item(name: &str) -> Result<ItemKind, ReplayError> {
    ItemKind::from_log_name(name).ok_or_else(|| {
        if UNSUPPORTED_ITEMS.contains(&name) {
            ReplayError::UnsupportedItem(name.to_string())
        } else {
            ReplayError::InvalidLine(format!("unknown item {:?}", name))
        }
    })
}

// "a , b , c" with the separators at odd positions.
fn item_list(words: &[&str]) -> Result<Vec<ItemKind>, ReplayError> {
    let mut items = Vec::with_capacity(words.len() / 2 + 1);
    for (i, word) in words.iter().enumerate() {
        if i % 2 == 1 {
            if *word != "," {
                return Err(ReplayError::NoMatch("a comma-separated item list"));
            }
        } else {
            items.push(item(word)?);
        }
    }
    Ok(items)
}

/// Replay a whole log, handing each odds query to `on_query` with its 1-based
/// line number as soon as it is reached.
pub fn replay_reader<R, F>(reader: R, mut on_query: F) -> Result<Replay, LineError>
where
    R: BufRead,
    F: FnMut(usize, OddsQuery),
{
    let mut replay = Replay::new();
    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|e| LineError { line: line_no, text: String::new(), source: e.into() })?;
        match replay.feed_line(&line) {
            Ok(queries) => queries.into_iter().for_each(|query| on_query(line_no, query)),
            Err(source) => return Err(LineError { line: line_no, text: line.trim().to_string(), source }),
        }
    }
    Ok(replay)
}

pub fn replay_str<F>(text: &str, on_query: F) -> Result<Replay, LineError>
where
    F: FnMut(usize, OddsQuery),
{
    replay_reader(text.as_bytes(), on_query)
}

pub fn replay_file<F>(path: &Path, on_query: F) -> Result<Replay, LineError>
where
    F: FnMut(usize, OddsQuery),
{
    let file = File::open(path).map_err(|e| LineError {
        line: 0,
        text: path.display().to_string(),
        source: e.into(),
    })?;
    replay_reader(BufReader::new(file), on_query)
}
