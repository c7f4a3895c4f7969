use std::collections::{BTreeMap, HashMap};

use ahash::RandomState as AHasher;

use crate::engine::{Action, DecisionNode, Token};

use super::Evaluation;

/// Canonical identity of a (node, action) pair.
///
/// Scalar fields are packed into one word; inventories are kept as their
/// canonical code strings. The branch probability is left out on purpose:
/// entries hold evaluations normalized by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranspositionKey {
    pub packed: u64,
    pub player_items: String,
    pub dealer_items: String,
}

impl TranspositionKey {
    /// Layout, low bits first: live (4), blank (4), turn, cuffed, sawed,
    /// revealed (2), player charges (8), dealer charges (8), max charges (8),
    /// critical threshold (8), player critical, dealer critical, action (3).
    pub fn new(state: &DecisionNode, action: Action) -> Self {
        let revealed: u64 = match state.revealed_token {
            None => 0,
            Some(Token::Live) => 1,
            Some(Token::Blank) => 2,
        };
        let packed = (state.live_remaining as u64 & 0xf)
            | (state.blank_remaining as u64 & 0xf) << 4
            | (state.is_players_turn as u64) << 8
            | (state.handcuffed as u64) << 9
            | (state.gun_sawed as u64) << 10
            | revealed << 11
            | (state.player.charges as u64) << 13
            | (state.dealer.charges as u64) << 21
            | (state.max_charges as u64) << 29
            | (state.critical_charges as u64) << 37
            | (state.player.critical as u64) << 45
            | (state.dealer.critical as u64) << 46
            | action.ordinal() << 47;
        Self {
            packed,
            player_items: state.player.items.code_string(),
            dealer_items: state.dealer.items.code_string(),
        }
    }
}

/// A searched action value, normalized to branch probability 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspositionEntry {
    pub evaluation: Evaluation,
    pub depth: u32,
    pub principal_line: Vec<Action>,
}

#[derive(Debug, Clone)]
struct Slot {
    entry: TranspositionEntry,
    tick: u64,
}

/// Fixed-capacity memo with least-recently-used eviction.
///
/// Recency is a monotonically increasing tick, so for a given sequence of
/// calls the evicted entries are always the same.
#[derive(Debug, Clone)]
pub struct TranspositionCache {
    slots: HashMap<TranspositionKey, Slot, AHasher>,
    recency: BTreeMap<u64, TranspositionKey>,
    capacity: usize,
    tick: u64,
}

impl TranspositionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_hasher(AHasher::new()),
            recency: BTreeMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    /// Any entry for `key`, refreshing its recency.
    pub fn lookup(&mut self, key: &TranspositionKey) -> Option<TranspositionEntry> {
        let tick = self.next_tick();
        let slot = self.slots.get_mut(key)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, key.clone());
        Some(slot.entry.clone())
    }

    /// Entry for `key` computed at exactly `depth`.
    pub fn probe(&mut self, key: &TranspositionKey, depth: u32) -> Option<TranspositionEntry> {
        if self.slots.get(key)?.entry.depth != depth {
            return None;
        }
        self.lookup(key)
    }

    pub fn insert(&mut self, key: TranspositionKey, entry: TranspositionEntry) {
        let tick = self.next_tick();
        if let Some(slot) = self.slots.get_mut(&key) {
            self.recency.remove(&slot.tick);
            *slot = Slot { entry, tick };
            self.recency.insert(tick, key);
            return;
        }
        while self.slots.len() >= self.capacity {
            match self.recency.pop_first() {
                Some((_, oldest)) => {
                    self.slots.remove(&oldest);
                }
                None => break,
            }
        }
        self.recency.insert(tick, key.clone());
        self.slots.insert(key, Slot { entry, tick });
    }

    #[inline]
    pub fn len(&self) -> usize { self.slots.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    #[inline]
    pub fn capacity(&self) -> usize { self.capacity }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.recency.clear();
    }

    #[inline]
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ItemKind, Side};
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn entry(depth: u32) -> TranspositionEntry {
        TranspositionEntry {
            evaluation: Evaluation::finite_ratio(1, 3),
            depth,
            principal_line: vec![Action::FireAtSelf],
        }
    }

    fn key(live: u8) -> TranspositionKey { TranspositionKey::new(&DecisionNode::new(2, 2, 4, live, 1), Action::FireAtSelf) }

    #[test]
    fn probe_requires_the_exact_depth() {
        let mut cache = TranspositionCache::new(8);
        cache.insert(key(1), entry(3));
        assert_eq!(cache.probe(&key(1), 3), Some(entry(3)));
        assert_eq!(cache.probe(&key(1), 4), None);
        assert_eq!(cache.probe(&key(1), 2), None);
        assert_eq!(cache.probe(&key(2), 3), None);
        assert_eq!(cache.lookup(&key(1)).map(|e| e.depth), Some(3));
    }

    #[test]
    fn least_recently_used_is_evicted_first() {
        let mut cache = TranspositionCache::new(2);
        cache.insert(key(1), entry(1));
        cache.insert(key(2), entry(1));
        assert!(cache.lookup(&key(1)).is_some());
        cache.insert(key(3), entry(1));
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key(2)).is_none());
        assert!(cache.lookup(&key(1)).is_some());
        assert!(cache.lookup(&key(3)).is_some());

        cache.insert(key(1), entry(5));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.probe(&key(1), 5), Some(entry(5)));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn zero_capacity_still_holds_one_entry() {
        let mut cache = TranspositionCache::new(0);
        cache.insert(key(1), entry(1));
        cache.insert(key(2), entry(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&key(2)).is_some());
    }

    #[test]
    fn distinct_positions_never_share_a_key() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut seen: HashSet<DecisionNode> = HashSet::new();
        let mut keys: HashSet<TranspositionKey> = HashSet::new();
        for _ in 0..300 {
            let mut node = DecisionNode::sample(&mut rng);
            node.branch_probability = crate::engine::Prob::from_integer(1);
            if seen.insert(node.clone()) {
                assert!(keys.insert(TranspositionKey::new(&node, Action::FireAtOpponent)), "{:?}", node);
            }
        }
    }

    #[test]
    fn every_field_reaches_the_key() {
        let base = DecisionNode::new(2, 2, 4, 2, 2);
        let base_key = TranspositionKey::new(&base, Action::FireAtOpponent);
        let mut critical = base.clone();
        critical.dealer.critical = true;
        let variants = [
            base.clone().with_turn(Side::Dealer),
            base.clone().with_handcuffs(true),
            base.clone().with_saw(true),
            base.clone().with_revealed(Token::Blank),
            base.clone().with_critical_charges(1),
            base.clone().with_items(Side::Dealer, &[ItemKind::Beer]),
            critical,
        ];
        for variant in &variants {
            assert_ne!(TranspositionKey::new(variant, Action::FireAtOpponent), base_key, "{:?}", variant);
        }
        assert_ne!(TranspositionKey::new(&base, Action::UseMagnifyingGlass), base_key);

        let mut rescaled = base.clone();
        rescaled.branch_probability = crate::engine::Prob::new(1, 7);
        assert_eq!(TranspositionKey::new(&rescaled, Action::FireAtOpponent), base_key);
    }
}
