use std::fmt;

use num_rational::Ratio;
use num_traits::One;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exact scalar used for probabilities and evaluations.
pub type Prob = Ratio<i128>;

/// Largest number of tokens a single load may hold.
pub const MAX_TOKENS: u8 = 8;

/// Largest number of items one party may carry.
pub const MAX_ITEMS: usize = 8;

/// One element of the hidden sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Token {
    Live,
    Blank,
}

impl Token {
    /// Resolution order used whenever a draw branches.
    pub const ALL: [Token; 2] = [Token::Live, Token::Blank];

    #[inline]
    pub fn is_live(self) -> bool { matches!(self, Token::Live) }

    pub fn from_word(word: &str) -> Option<Token> {
        match word {
            "live" => Some(Token::Live),
            "blank" => Some(Token::Blank),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_live() { "live" } else { "blank" })
    }
}

/// The two parties at the table. The player is the maximizing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Player,
    Dealer,
}

impl Side {
    #[inline]
    pub fn opponent(self) -> Side {
        match self {
            Side::Player => Side::Dealer,
            Side::Dealer => Side::Player,
        }
    }

    pub fn from_word(word: &str) -> Option<Side> {
        match word {
            "player" => Some(Side::Player),
            "dealer" => Some(Side::Dealer),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Player => "player",
            Side::Dealer => "dealer",
        })
    }
}

/// Single-use items understood by the rules engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    Cigarettes,
    HandSaw,
    Handcuffs,
    Beer,
    MagnifyingGlass,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        ItemKind::Cigarettes,
        ItemKind::HandSaw,
        ItemKind::Handcuffs,
        ItemKind::Beer,
        ItemKind::MagnifyingGlass,
    ];

    #[inline]
    fn index(self) -> usize {
        match self {
            ItemKind::Cigarettes => 0,
            ItemKind::HandSaw => 1,
            ItemKind::Handcuffs => 2,
            ItemKind::Beer => 3,
            ItemKind::MagnifyingGlass => 4,
        }
    }

    /// One-letter code used by the canonical inventory string.
    #[inline]
    pub fn code(self) -> char {
        match self {
            ItemKind::Cigarettes => 'c',
            ItemKind::HandSaw => 's',
            ItemKind::Handcuffs => 'h',
            ItemKind::Beer => 'b',
            ItemKind::MagnifyingGlass => 'm',
        }
    }

    pub fn from_code(code: char) -> Option<ItemKind> {
        ItemKind::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Name used in match logs.
    pub fn log_name(self) -> &'static str {
        match self {
            ItemKind::Cigarettes => "cigs",
            ItemKind::HandSaw => "knife",
            ItemKind::Handcuffs => "cuffs",
            ItemKind::Beer => "beer",
            ItemKind::MagnifyingGlass => "glass",
        }
    }

    pub fn from_log_name(name: &str) -> Option<ItemKind> {
        match name {
            "cigs" | "cigarettes" => Some(ItemKind::Cigarettes),
            "knife" | "saw" => Some(ItemKind::HandSaw),
            "cuffs" | "handcuffs" => Some(ItemKind::Handcuffs),
            "beer" => Some(ItemKind::Beer),
            "glass" => Some(ItemKind::MagnifyingGlass),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.log_name()) }
}

/// Multiset of items, stored as per-kind counts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Inventory([u8; 5]);

impl Inventory {
    pub const EMPTY: Inventory = Inventory([0; 5]);

    pub fn from_items(items: &[ItemKind]) -> Self {
        let mut inv = Inventory::EMPTY;
        for &kind in items {
            inv.0[kind.index()] += 1;
        }
        inv
    }

    #[inline]
    pub fn count(&self, kind: ItemKind) -> u8 { self.0[kind.index()] }

    #[inline]
    pub fn has(&self, kind: ItemKind) -> bool { self.count(kind) > 0 }

    #[inline]
    pub fn len(&self) -> usize { self.0.iter().map(|&c| c as usize).sum() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Add one item, refusing to exceed [`MAX_ITEMS`].
    pub fn insert(&mut self, kind: ItemKind) -> bool {
        if self.len() >= MAX_ITEMS {
            return false;
        }
        self.0[kind.index()] += 1;
        true
    }

    /// Remove one item. Returns false if none was held.
    pub fn remove(&mut self, kind: ItemKind) -> bool {
        let slot = &mut self.0[kind.index()];
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    /// Items in canonical (declaration) order, repeated by count.
    pub fn iter(&self) -> impl Iterator<Item = ItemKind> + '_ {
        ItemKind::ALL
            .into_iter()
            .flat_map(move |kind| std::iter::repeat(kind).take(self.count(kind) as usize))
    }

    /// Canonical short string, e.g. `"ssb"` for two saws and a beer.
    pub fn code_string(&self) -> String { self.iter().map(ItemKind::code).collect() }
}

impl fmt::Debug for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inventory({:?})", self.code_string())
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(ItemKind::log_name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Everything the party on turn may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    FireAtOpponent,
    FireAtSelf,
    UseCigarettes,
    UseHandSaw,
    UseHandcuffs,
    UseBeer,
    UseMagnifyingGlass,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::FireAtOpponent,
        Action::FireAtSelf,
        Action::UseCigarettes,
        Action::UseHandSaw,
        Action::UseHandcuffs,
        Action::UseBeer,
        Action::UseMagnifyingGlass,
    ];

    #[inline]
    pub fn for_item(kind: ItemKind) -> Action {
        match kind {
            ItemKind::Cigarettes => Action::UseCigarettes,
            ItemKind::HandSaw => Action::UseHandSaw,
            ItemKind::Handcuffs => Action::UseHandcuffs,
            ItemKind::Beer => Action::UseBeer,
            ItemKind::MagnifyingGlass => Action::UseMagnifyingGlass,
        }
    }

    /// The item consumed by this action, if any.
    #[inline]
    pub fn item(self) -> Option<ItemKind> {
        match self {
            Action::FireAtOpponent | Action::FireAtSelf => None,
            Action::UseCigarettes => Some(ItemKind::Cigarettes),
            Action::UseHandSaw => Some(ItemKind::HandSaw),
            Action::UseHandcuffs => Some(ItemKind::Handcuffs),
            Action::UseBeer => Some(ItemKind::Beer),
            Action::UseMagnifyingGlass => Some(ItemKind::MagnifyingGlass),
        }
    }

    /// True for actions that consume the upcoming token.
    #[inline]
    pub fn is_resolving(self) -> bool {
        matches!(self, Action::FireAtOpponent | Action::FireAtSelf | Action::UseBeer)
    }

    #[inline]
    pub(crate) fn ordinal(self) -> u64 {
        match self {
            Action::FireAtOpponent => 0,
            Action::FireAtSelf => 1,
            Action::UseCigarettes => 2,
            Action::UseHandSaw => 3,
            Action::UseHandcuffs => 4,
            Action::UseBeer => 5,
            Action::UseMagnifyingGlass => 6,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::FireAtOpponent => f.write_str("fire at opponent"),
            Action::FireAtSelf => f.write_str("fire at self"),
            other => match other.item() {
                Some(kind) => write!(f, "use {}", kind),
                None => Ok(()),
            },
        }
    }
}

/// Per-party table state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Party {
    pub charges: u8,
    pub critical: bool,
    pub items: Inventory,
}

impl Party {
    pub fn new(charges: u8) -> Self { Self { charges, critical: false, items: Inventory::EMPTY } }
}

/// Ways an action can be illegal in a given node.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("the round is already over")]
    Terminal,
    #[error("{0} is not in the inventory")]
    MissingItem(ItemKind),
    #[error("the opponent is already handcuffed")]
    AlreadyHandcuffed,
    #[error("the gun is already sawed off")]
    AlreadySawed,
    #[error("the next token cannot be {0}")]
    ImpossibleToken(Token),
    #[error("the outcome of {0} must be observed")]
    Unobserved(ItemKind),
    #[error("{0} already holds {MAX_ITEMS} items")]
    TooManyItems(Side),
    #[error("a load must hold at most {MAX_TOKENS} tokens with at least one of each kind")]
    InvalidLoad,
}

/// One decision node of the duel.
///
/// Nodes are values: every transition returns fresh nodes and leaves `self`
/// untouched. `branch_probability` is the probability of reaching this node
/// from the search root, so children of a chance event sum to their parent's.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DecisionNode {
    pub is_players_turn: bool,
    pub player: Party,
    pub dealer: Party,
    pub max_charges: u8,
    /// Charges at or below which a party becomes critical.
    pub critical_charges: u8,
    pub live_remaining: u8,
    pub blank_remaining: u8,
    pub revealed_token: Option<Token>,
    /// The party not on turn skips its next turn.
    pub handcuffed: bool,
    pub gun_sawed: bool,
    pub branch_probability: Prob,
}

impl DecisionNode {
    /// A freshly loaded round with the player to move and no items.
    ///
    /// ```
    /// use backshot::engine::DecisionNode;
    /// let node = DecisionNode::new(2, 2, 4, 1, 3);
    /// assert!(node.is_players_turn);
    /// assert_eq!(node.total_tokens(), 4);
    /// ```
    pub fn new(player_charges: u8, dealer_charges: u8, max_charges: u8, live: u8, blank: u8) -> Self {
        Self {
            is_players_turn: true,
            player: Party::new(player_charges),
            dealer: Party::new(dealer_charges),
            max_charges,
            critical_charges: 0,
            live_remaining: live,
            blank_remaining: blank,
            revealed_token: None,
            handcuffed: false,
            gun_sawed: false,
            branch_probability: Prob::one(),
        }
    }

    pub fn with_items(mut self, side: Side, items: &[ItemKind]) -> Self {
        self.party_mut(side).items = Inventory::from_items(items);
        self
    }

    pub fn with_turn(mut self, side: Side) -> Self {
        self.is_players_turn = side == Side::Player;
        self
    }

    pub fn with_revealed(mut self, token: Token) -> Self {
        self.revealed_token = Some(token);
        self
    }

    pub fn with_critical_charges(mut self, critical_charges: u8) -> Self {
        self.critical_charges = critical_charges;
        self
    }

    pub fn with_handcuffs(mut self, handcuffed: bool) -> Self {
        self.handcuffed = handcuffed;
        self
    }

    pub fn with_saw(mut self, gun_sawed: bool) -> Self {
        self.gun_sawed = gun_sawed;
        self
    }

    /// Sample a round-start position: random charges, load, items and turn.
    ///
    /// ```
    /// use backshot::engine::DecisionNode;
    /// use rand::{rngs::StdRng, SeedableRng};
    /// let mut rng = StdRng::seed_from_u64(3);
    /// let node = DecisionNode::sample(&mut rng);
    /// assert!(node.live_remaining >= 1 && node.blank_remaining >= 1);
    /// assert!(node.total_tokens() <= 8);
    /// ```
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let max_charges = rng.gen_range(2..=5u8);
        let live = rng.gen_range(1..=4u8);
        let blank = rng.gen_range(1..=4u8);
        let mut node = DecisionNode::new(
            rng.gen_range(1..=max_charges),
            rng.gen_range(1..=max_charges),
            max_charges,
            live,
            blank,
        );
        for side in [Side::Player, Side::Dealer] {
            let count = rng.gen_range(0..=2usize);
            for _ in 0..count {
                if let Some(&kind) = ItemKind::ALL.choose(rng) {
                    node.party_mut(side).items.insert(kind);
                }
            }
        }
        node.is_players_turn = rng.gen_bool(0.5);
        node
    }

    #[inline]
    pub fn player_charges(&self) -> u8 { self.player.charges }

    #[inline]
    pub fn dealer_charges(&self) -> u8 { self.dealer.charges }

    /// The party whose turn it is.
    #[inline]
    pub fn actor(&self) -> Side { if self.is_players_turn { Side::Player } else { Side::Dealer } }

    #[inline]
    pub fn party(&self, side: Side) -> &Party {
        match side {
            Side::Player => &self.player,
            Side::Dealer => &self.dealer,
        }
    }

    #[inline]
    pub fn party_mut(&mut self, side: Side) -> &mut Party {
        match side {
            Side::Player => &mut self.player,
            Side::Dealer => &mut self.dealer,
        }
    }

    #[inline]
    pub fn remaining(&self, token: Token) -> u8 {
        match token {
            Token::Live => self.live_remaining,
            Token::Blank => self.blank_remaining,
        }
    }

    #[inline]
    pub fn total_tokens(&self) -> u8 { self.live_remaining + self.blank_remaining }

    /// No tokens left: the round ends with a forced reload.
    #[inline]
    pub fn is_round_over(&self) -> bool { self.total_tokens() == 0 }

    /// Some party has run out of charges.
    #[inline]
    pub fn is_decided(&self) -> bool { self.player.charges == 0 || self.dealer.charges == 0 }

    /// Actions the party on turn may attempt. Item actions appear only for
    /// held items; whether they can actually be applied is up to [`Self::apply`].
    pub fn legal_actions(&self) -> Vec<Action> {
        if self.is_decided() || self.is_round_over() {
            return Vec::new();
        }
        let items = &self.party(self.actor()).items;
        let mut actions = vec![Action::FireAtOpponent, Action::FireAtSelf];
        actions.extend(ItemKind::ALL.into_iter().filter(|&kind| items.has(kind)).map(Action::for_item));
        actions
    }

    /// Apply `action`, resolving any unknown draw into weighted children.
    ///
    /// ```
    /// use backshot::engine::{Action, DecisionNode, Prob};
    /// let node = DecisionNode::new(3, 3, 3, 1, 3);
    /// let children = node.apply(Action::FireAtOpponent).unwrap();
    /// assert_eq!(children.len(), 2);
    /// let total: Prob = children.iter().map(|c| c.branch_probability).sum();
    /// assert_eq!(total, node.branch_probability);
    /// ```
    pub fn apply(&self, action: Action) -> Result<Vec<DecisionNode>, RulesError> {
        if self.is_decided() || self.is_round_over() {
            return Err(RulesError::Terminal);
        }
        let actor = self.actor();
        match action {
            Action::FireAtOpponent => self.branch(|node, token| node.fire(actor.opponent(), token)),
            Action::FireAtSelf => self.branch(|node, token| node.fire(actor, token)),
            Action::UseBeer => self.branch(|node, token| node.use_item(ItemKind::Beer, Some(token))),
            Action::UseMagnifyingGlass => {
                self.branch(|node, token| node.use_item(ItemKind::MagnifyingGlass, Some(token)))
            }
            Action::UseCigarettes => Ok(vec![self.use_item(ItemKind::Cigarettes, None)?]),
            Action::UseHandSaw => Ok(vec![self.use_item(ItemKind::HandSaw, None)?]),
            Action::UseHandcuffs => Ok(vec![self.use_item(ItemKind::Handcuffs, None)?]),
        }
    }

    fn branch<F>(&self, resolve: F) -> Result<Vec<DecisionNode>, RulesError>
    where
        F: Fn(&DecisionNode, Token) -> Result<DecisionNode, RulesError>,
    {
        if let Some(token) = self.revealed_token {
            return Ok(vec![resolve(self, token)?]);
        }
        let total = self.total_tokens() as i128;
        let mut children = Vec::with_capacity(2);
        for token in Token::ALL {
            let count = self.remaining(token);
            if count == 0 {
                continue;
            }
            let mut child = resolve(self, token)?;
            child.branch_probability = self.branch_probability * Prob::new(count as i128, total);
            children.push(child);
        }
        Ok(children)
    }

    /// The party on turn fires at `target` and the chamber turns out to hold `token`.
    pub fn fire(&self, target: Side, token: Token) -> Result<DecisionNode, RulesError> {
        if self.is_decided() || self.is_round_over() {
            return Err(RulesError::Terminal);
        }
        self.check_token(token)?;
        let mut next = self.clone();
        if token.is_live() {
            let damage = if next.gun_sawed { 2 } else { 1 };
            let critical_charges = next.critical_charges;
            let party = next.party_mut(target);
            if party.critical {
                party.charges = 0;
            } else {
                party.charges = party.charges.saturating_sub(damage);
                if party.charges <= critical_charges {
                    party.critical = true;
                }
            }
        }
        next.gun_sawed = false;
        next.consume(token);
        if next.is_decided() || next.is_round_over() {
            return Ok(next);
        }
        // A blank at oneself keeps the turn.
        if target != self.actor() || token.is_live() {
            next.pass_turn();
        }
        Ok(next)
    }

    /// The party on turn uses `kind`. Beer needs the ejected token; the glass
    /// reveals `observed` when given and teaches the table nothing otherwise.
    pub fn use_item(&self, kind: ItemKind, observed: Option<Token>) -> Result<DecisionNode, RulesError> {
        if self.is_decided() || self.is_round_over() {
            return Err(RulesError::Terminal);
        }
        let actor = self.actor();
        if !self.party(actor).items.has(kind) {
            return Err(RulesError::MissingItem(kind));
        }
        let mut next = self.clone();
        match kind {
            ItemKind::Cigarettes => {
                let max_charges = next.max_charges;
                let party = next.party_mut(actor);
                if !party.critical {
                    party.charges = (party.charges + 1).min(max_charges);
                }
            }
            ItemKind::HandSaw => {
                if next.gun_sawed {
                    return Err(RulesError::AlreadySawed);
                }
                next.gun_sawed = true;
            }
            ItemKind::Handcuffs => {
                if next.handcuffed {
                    return Err(RulesError::AlreadyHandcuffed);
                }
                next.handcuffed = true;
            }
            ItemKind::Beer => {
                let token = observed.ok_or(RulesError::Unobserved(kind))?;
                self.check_token(token)?;
                next.consume(token);
            }
            ItemKind::MagnifyingGlass => {
                if let Some(token) = observed {
                    self.check_token(token)?;
                    next.revealed_token = Some(token);
                }
            }
        }
        next.party_mut(actor).items.remove(kind);
        Ok(next)
    }

    /// The party on turn drinks a beer that ejects `token`.
    #[inline]
    pub fn eject(&self, token: Token) -> Result<DecisionNode, RulesError> {
        self.use_item(ItemKind::Beer, Some(token))
    }

    /// The party on turn looks through the glass and sees `token`.
    #[inline]
    pub fn reveal(&self, token: Token) -> Result<DecisionNode, RulesError> {
        self.use_item(ItemKind::MagnifyingGlass, Some(token))
    }

    /// Load a new round: fresh counts, player to move, cuffs and saw cleared.
    pub fn load(&self, live: u8, blank: u8) -> Result<DecisionNode, RulesError> {
        if live == 0 || blank == 0 || live + blank > MAX_TOKENS {
            return Err(RulesError::InvalidLoad);
        }
        let mut next = self.clone();
        next.live_remaining = live;
        next.blank_remaining = blank;
        next.revealed_token = None;
        next.is_players_turn = true;
        next.handcuffed = false;
        next.gun_sawed = false;
        next.branch_probability = Prob::one();
        Ok(next)
    }

    /// Hand `kind` to `side` between rounds.
    pub fn give_item(&self, side: Side, kind: ItemKind) -> Result<DecisionNode, RulesError> {
        let mut next = self.clone();
        if !next.party_mut(side).items.insert(kind) {
            return Err(RulesError::TooManyItems(side));
        }
        Ok(next)
    }

    fn check_token(&self, token: Token) -> Result<(), RulesError> {
        match self.revealed_token {
            Some(known) if known != token => Err(RulesError::ImpossibleToken(token)),
            _ if self.remaining(token) == 0 => Err(RulesError::ImpossibleToken(token)),
            _ => Ok(()),
        }
    }

    fn consume(&mut self, token: Token) {
        match token {
            Token::Live => self.live_remaining -= 1,
            Token::Blank => self.blank_remaining -= 1,
        }
        self.revealed_token = None;
    }

    fn pass_turn(&mut self) {
        if self.handcuffed {
            self.handcuffed = false;
        } else {
            self.is_players_turn = !self.is_players_turn;
        }
    }
}

impl fmt::Debug for DecisionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecisionNode({} to move, P {}{} {:?}, D {}{} {:?}, {}L/{}B, next {:?}, cuffs {}, saw {}, p {})",
            self.actor(),
            self.player.charges,
            if self.player.critical { "!" } else { "" },
            self.player.items.code_string(),
            self.dealer.charges,
            if self.dealer.critical { "!" } else { "" },
            self.dealer.items.code_string(),
            self.live_remaining,
            self.blank_remaining,
            self.revealed_token,
            self.handcuffed,
            self.gun_sawed,
            self.branch_probability,
        )
    }
}

impl fmt::Display for DecisionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let next = match self.revealed_token {
            Some(token) => token.to_string(),
            None => "unknown".to_string(),
        };
        writeln!(f, "player: {}/{} charges {}", self.player.charges, self.max_charges, self.player.items)?;
        writeln!(f, "dealer: {}/{} charges {}", self.dealer.charges, self.max_charges, self.dealer.items)?;
        writeln!(f, "tokens: {} live, {} blank (next: {})", self.live_remaining, self.blank_remaining, next)?;
        write!(
            f,
            "{} to move{}{}",
            self.actor(),
            if self.handcuffed { ", opponent cuffed" } else { "" },
            if self.gun_sawed { ", gun sawed" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: i128, d: i128) -> Prob { Prob::new(n, d) }

    #[test]
    fn fire_branches_by_token_counts() {
        let node = DecisionNode::new(3, 3, 3, 1, 3);
        let children = node.apply(Action::FireAtOpponent).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].branch_probability, p(1, 4));
        assert_eq!(children[0].dealer.charges, 2);
        assert!(!children[0].is_players_turn);
        assert_eq!(children[1].branch_probability, p(3, 4));
        assert_eq!(children[1].dealer.charges, 3);
        assert!(!children[1].is_players_turn);
    }

    #[test]
    fn blank_at_self_keeps_the_turn() {
        let node = DecisionNode::new(3, 3, 3, 2, 2);
        let next = node.fire(Side::Player, Token::Blank).unwrap();
        assert!(next.is_players_turn);
        assert_eq!(next.blank_remaining, 1);
        let hit = node.fire(Side::Player, Token::Live).unwrap();
        assert!(!hit.is_players_turn);
        assert_eq!(hit.player.charges, 2);
    }

    #[test]
    fn saw_doubles_damage_and_resets_after_any_shot() {
        let node = DecisionNode::new(4, 4, 4, 2, 2).with_items(Side::Player, &[ItemKind::HandSaw]);
        let sawed = node.use_item(ItemKind::HandSaw, None).unwrap();
        assert!(sawed.gun_sawed);
        assert!(!sawed.player.items.has(ItemKind::HandSaw));
        let hit = sawed.fire(Side::Dealer, Token::Live).unwrap();
        assert_eq!(hit.dealer.charges, 2);
        assert!(!hit.gun_sawed);
        let miss = sawed.fire(Side::Dealer, Token::Blank).unwrap();
        assert!(!miss.gun_sawed);
        assert_eq!(sawed.use_item(ItemKind::HandSaw, None), Err(RulesError::MissingItem(ItemKind::HandSaw)));
    }

    #[test]
    fn critical_party_dies_to_any_live() {
        let node = DecisionNode::new(3, 3, 3, 3, 1).with_critical_charges(2).with_saw(true);
        let hit = node.fire(Side::Dealer, Token::Live).unwrap();
        assert_eq!(hit.dealer.charges, 1);
        assert!(hit.dealer.critical);
        let mut again = hit.clone();
        again.is_players_turn = true;
        let dead = again.fire(Side::Dealer, Token::Live).unwrap();
        assert_eq!(dead.dealer.charges, 0);
        assert!(dead.is_decided());
    }

    #[test]
    fn cigarettes_heal_up_to_max_unless_critical() {
        let node = DecisionNode::new(2, 3, 3, 1, 1).with_items(Side::Player, &[ItemKind::Cigarettes]);
        assert_eq!(node.use_item(ItemKind::Cigarettes, None).unwrap().player.charges, 3);
        let mut critical = node.clone();
        critical.player.critical = true;
        assert_eq!(critical.use_item(ItemKind::Cigarettes, None).unwrap().player.charges, 2);
    }

    #[test]
    fn handcuffs_skip_the_opponents_next_turn() {
        let node = DecisionNode::new(3, 3, 3, 2, 2).with_items(Side::Player, &[ItemKind::Handcuffs]);
        let cuffed = node.use_item(ItemKind::Handcuffs, None).unwrap();
        assert!(cuffed.handcuffed);
        let after = cuffed.fire(Side::Dealer, Token::Blank).unwrap();
        assert!(after.is_players_turn);
        assert!(!after.handcuffed);
        let again = after.fire(Side::Dealer, Token::Blank).unwrap();
        assert!(!again.is_players_turn);
    }

    #[test]
    fn handcuffs_cannot_stack() {
        let node = DecisionNode::new(3, 3, 3, 2, 2)
            .with_items(Side::Player, &[ItemKind::Handcuffs])
            .with_handcuffs(true);
        assert_eq!(node.apply(Action::UseHandcuffs), Err(RulesError::AlreadyHandcuffed));
    }

    #[test]
    fn glass_reveals_and_beer_ejects() {
        let node = DecisionNode::new(3, 3, 3, 1, 2)
            .with_items(Side::Player, &[ItemKind::MagnifyingGlass, ItemKind::Beer]);
        let seen = node.apply(Action::UseMagnifyingGlass).unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].revealed_token, Some(Token::Live));
        assert_eq!(seen[0].branch_probability, p(1, 3));
        assert_eq!(seen[1].revealed_token, Some(Token::Blank));
        assert_eq!(seen[1].total_tokens(), 3);

        let known = seen[0].apply(Action::UseBeer).unwrap();
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].live_remaining, 0);
        assert_eq!(known[0].revealed_token, None);
        assert!(known[0].is_players_turn);
    }

    #[test]
    fn revealed_token_must_be_consistent() {
        let node = DecisionNode::new(3, 3, 3, 2, 2).with_revealed(Token::Live);
        assert_eq!(node.fire(Side::Dealer, Token::Blank), Err(RulesError::ImpossibleToken(Token::Blank)));
        let node = DecisionNode::new(3, 3, 3, 0, 2);
        assert_eq!(node.fire(Side::Dealer, Token::Live), Err(RulesError::ImpossibleToken(Token::Live)));
    }

    #[test]
    fn last_token_ends_the_round() {
        let node = DecisionNode::new(3, 3, 3, 0, 1);
        let next = node.fire(Side::Dealer, Token::Blank).unwrap();
        assert!(next.is_round_over());
        assert!(next.legal_actions().is_empty());
        assert_eq!(next.apply(Action::FireAtSelf), Err(RulesError::Terminal));
    }

    #[test]
    fn legal_actions_follow_the_actors_inventory() {
        let node = DecisionNode::new(3, 3, 3, 2, 2)
            .with_items(Side::Dealer, &[ItemKind::Beer])
            .with_items(Side::Player, &[ItemKind::HandSaw, ItemKind::HandSaw]);
        assert_eq!(node.legal_actions(), vec![Action::FireAtOpponent, Action::FireAtSelf, Action::UseHandSaw]);
        let dealer = node.with_turn(Side::Dealer);
        assert_eq!(dealer.legal_actions(), vec![Action::FireAtOpponent, Action::FireAtSelf, Action::UseBeer]);
    }

    #[test]
    fn inventory_is_capped_and_canonical() {
        let mut inv = Inventory::from_items(&[ItemKind::Beer, ItemKind::HandSaw, ItemKind::Beer]);
        assert_eq!(inv.code_string(), "sbb");
        assert_eq!(inv.len(), 3);
        for _ in 0..5 {
            assert!(inv.insert(ItemKind::Cigarettes));
        }
        assert!(!inv.insert(ItemKind::Cigarettes));
        assert!(inv.remove(ItemKind::HandSaw));
        assert!(!inv.remove(ItemKind::HandSaw));
    }

    #[test]
    fn load_validates_counts() {
        let node = DecisionNode::new(3, 3, 3, 0, 0);
        assert_eq!(node.load(0, 3), Err(RulesError::InvalidLoad));
        assert_eq!(node.load(5, 4), Err(RulesError::InvalidLoad));
        let loaded = node.with_turn(Side::Dealer).with_saw(true).load(2, 3).unwrap();
        assert!(loaded.is_players_turn);
        assert!(!loaded.gun_sawed);
        assert_eq!(loaded.total_tokens(), 5);
    }
}
