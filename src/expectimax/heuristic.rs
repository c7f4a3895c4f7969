use num_traits::{One, Zero};

use crate::engine::{Action, DecisionNode, ItemKind, Party, Prob, Side, Token};

use super::Evaluation;

// Blend weights, as denominators over one unit of evaluation.
const CHARGE_DENOM: i128 = 2;
const KNOWLEDGE_DENOM: i128 = 8;
const ITEM_DENOM: i128 = 32;
const ITEM_CAP: i128 = 4;
const SAW_IDLE_DENOM: i128 = 16;
const LOW_HEALTH_DENOM: i128 = 16;

#[inline]
fn sign(side: Side) -> i128 {
    match side {
        Side::Player => 1,
        Side::Dealer => -1,
    }
}

/// Static value of a position from the player's perspective.
///
/// `+inf` once the dealer is out of charges, `-inf` once the player is;
/// otherwise a blend of charge differential, token knowledge, items and
/// penalties for an idle hand saw and for low health, inside `[-7/8, 7/8]`.
///
/// ```
/// use backshot::engine::DecisionNode;
/// use backshot::expectimax::{leaf_value, Evaluation};
/// let node = DecisionNode::new(3, 1, 4, 1, 1);
/// assert!(leaf_value(&node) > Evaluation::zero());
/// ```
pub fn leaf_value(state: &DecisionNode) -> Evaluation {
    if state.player.charges == 0 {
        return Evaluation::NegInf;
    }
    if state.dealer.charges == 0 {
        return Evaluation::PosInf;
    }
    let mover = sign(state.actor());
    let max_charges = state.max_charges.max(1) as i128;
    let charge_diff = state.player.charges as i128 - state.dealer.charges as i128;

    let mut score = Prob::new(charge_diff, max_charges * CHARGE_DENOM);
    if state.revealed_token.is_some() && !state.is_round_over() {
        score += Prob::new(mover, KNOWLEDGE_DENOM);
    }
    let item_diff = state.player.items.len() as i128 - state.dealer.items.len() as i128;
    score += Prob::new(item_diff.clamp(-ITEM_CAP, ITEM_CAP), ITEM_DENOM);
    if saw_left_idle(state) {
        score -= Prob::new(mover, SAW_IDLE_DENOM);
    }
    for side in [Side::Player, Side::Dealer] {
        if low_health(state.party(side)) {
            score -= Prob::new(sign(side), LOW_HEALTH_DENOM);
        }
    }
    Evaluation::Finite(score.max(-Prob::one()).min(Prob::one()))
}

/// [`leaf_value`] with a decided position as a certain win (`1`) or loss (`-1`).
///
/// This is what the search sums over chance outcomes, so a line that loses
/// one time in eight is worth an eighth of a loss, not a certain one. Blends
/// never reach a certain outcome.
///
/// ```
/// use backshot::engine::DecisionNode;
/// use backshot::expectimax::{outcome_value, Evaluation};
/// assert_eq!(outcome_value(&DecisionNode::new(0, 2, 4, 1, 1)), Evaluation::finite_ratio(-1, 1));
/// ```
pub fn outcome_value(state: &DecisionNode) -> Evaluation {
    match leaf_value(state) {
        Evaluation::NegInf => Evaluation::Finite(-Prob::one()),
        Evaluation::PosInf => Evaluation::Finite(Prob::one()),
        blend => blend,
    }
}

/// [`leaf_value`] seen by `side`.
pub fn leaf_value_for(side: Side, state: &DecisionNode) -> Evaluation {
    match side {
        Side::Player => leaf_value(state),
        Side::Dealer => -leaf_value(state),
    }
}

// Holding an unused saw while it would turn the next live into a kill.
fn saw_left_idle(state: &DecisionNode) -> bool {
    let actor = state.actor();
    let opponent = state.party(actor.opponent());
    state.party(actor).items.has(ItemKind::HandSaw)
        && !state.gun_sawed
        && state.live_remaining > 0
        && opponent.charges == 2
        && !opponent.critical
}

#[inline]
fn low_health(party: &Party) -> bool { party.charges == 1 || party.critical }

/// Closed-form estimates over the remaining live (`L`) and blank (`B`) counts.
///
/// All forms are exact rationals and yield 0 when no live token remains.
pub mod odds {
    use num_traits::{One, Zero};

    use crate::engine::Prob;

    /// `L / (L + B)`: chance the next token is live.
    pub fn marginal(live: u8, blank: u8) -> Prob {
        if live == 0 {
            return Prob::zero();
        }
        Prob::new(live as i128, (live + blank) as i128)
    }

    /// One more resolving shot removes a live or a blank with equal prior
    /// likelihood: `(2L-1) / (2(L+B-1))`, or 1 with nothing left behind.
    ///
    /// ```
    /// use backshot::engine::Prob;
    /// use backshot::expectimax::odds;
    /// assert_eq!(odds::fire_at_opponent(3, 1), Prob::new(5, 6));
    /// ```
    pub fn fire_at_opponent(live: u8, blank: u8) -> Prob {
        if live == 0 {
            return Prob::zero();
        }
        let (l, b) = (live as i128, blank as i128);
        if l + b - 1 <= 0 {
            return Prob::one();
        }
        Prob::new(2 * l - 1, 2 * (l + b - 1))
    }

    /// Averages `(L-1)/(L+B-n)` for `n` in `1..B` over `B` equally likely
    /// positions of the live token among the blanks; 1 when only lives remain.
    pub fn fire_at_self(live: u8, blank: u8) -> Prob {
        if live == 0 {
            return Prob::zero();
        }
        if blank == 0 {
            return Prob::one();
        }
        let (l, b) = (live as i128, blank as i128);
        let sum = (1..b).fold(Prob::zero(), |acc, n| acc + Prob::new(l - 1, l + b - n));
        sum / Prob::from_integer(b)
    }

    /// Ejecting the unknown token blind, then facing the next unknown one:
    /// `(4L-3) / (4(L+B-2))`, or 1 with nothing left behind. Without a beer
    /// in hand this is the plain [`marginal`].
    pub fn beer(live: u8, blank: u8, has_beer: bool) -> Prob {
        if !has_beer {
            return marginal(live, blank);
        }
        if live == 0 {
            return Prob::zero();
        }
        let (l, b) = (live as i128, blank as i128);
        if l + b - 2 <= 0 {
            return Prob::one();
        }
        Prob::new(4 * l - 3, 4 * (l + b - 2))
    }
}

/// Lowest of the three resolving estimates for the party on turn.
pub fn side_to_move_safety(state: &DecisionNode) -> Prob {
    let (live, blank) = (state.live_remaining, state.blank_remaining);
    let has_beer = state.party(state.actor()).items.has(ItemKind::Beer);
    odds::fire_at_opponent(live, blank)
        .min(odds::fire_at_self(live, blank))
        .min(odds::beer(live, blank, has_beer))
}

/// Ordering estimate for a position: on the player's turn the
/// [`side_to_move_safety`], on the dealer's the plain chance that the next
/// token is live.
///
/// The value is shared by every action from `state`; [`action_preference`]
/// breaks the tie between them.
pub fn predicted_value(_action: Action, state: &DecisionNode) -> Prob {
    if state.is_players_turn {
        side_to_move_safety(state)
    } else {
        odds::marginal(state.live_remaining, state.blank_remaining)
    }
}

/// Per-action estimate from the mover's perspective, higher is better.
///
/// Secondary ordering key after [`predicted_value`].
pub fn action_preference(action: Action, state: &DecisionNode) -> Prob {
    let half = Prob::new(1, 2);
    match state.revealed_token {
        Some(token) => match action {
            Action::FireAtOpponent if token == Token::Live => Prob::one(),
            Action::FireAtSelf if token == Token::Blank => Prob::one(),
            Action::FireAtOpponent | Action::FireAtSelf => Prob::zero(),
            _ => half,
        },
        None => {
            let (live, blank) = (state.live_remaining, state.blank_remaining);
            match action {
                Action::FireAtOpponent => odds::fire_at_opponent(live, blank),
                Action::FireAtSelf => Prob::one() - odds::fire_at_self(live, blank),
                Action::UseBeer => Prob::one() - odds::beer(live, blank, true),
                Action::UseCigarettes
                | Action::UseHandSaw
                | Action::UseHandcuffs
                | Action::UseMagnifyingGlass => side_to_move_safety(state),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn p(n: i128, d: i128) -> Prob { Prob::new(n, d) }

    #[test]
    fn decided_positions_are_infinite() {
        let player_dead = DecisionNode::new(0, 2, 4, 1, 1);
        assert_eq!(leaf_value(&player_dead), Evaluation::NegInf);
        assert_eq!(leaf_value_for(Side::Player, &player_dead), Evaluation::NegInf);
        assert_eq!(leaf_value_for(Side::Dealer, &player_dead), Evaluation::PosInf);

        let dealer_dead = DecisionNode::new(2, 0, 4, 1, 1).with_turn(Side::Dealer);
        assert_eq!(leaf_value_for(Side::Dealer, &dealer_dead), Evaluation::NegInf);
        assert_eq!(leaf_value_for(Side::Player, &dealer_dead), Evaluation::PosInf);
    }

    #[test]
    fn blend_terms_add_up() {
        // 3 vs 2 of 4: +1/8 charges, knowledge +1/8, one extra item +1/32.
        let node = DecisionNode::new(3, 2, 4, 2, 2)
            .with_revealed(Token::Live)
            .with_items(Side::Player, &[ItemKind::Beer]);
        assert_eq!(leaf_value(&node), Evaluation::Finite(p(1, 8) + p(1, 8) + p(1, 32)));

        // Idle saw against a 2-charge dealer, player at 1 charge.
        let node = DecisionNode::new(1, 2, 4, 1, 1).with_items(Side::Player, &[ItemKind::HandSaw]);
        let expected = p(-1, 8) + p(1, 32) - p(1, 16) - p(1, 16);
        assert_eq!(leaf_value(&node), Evaluation::Finite(expected));
    }

    #[test]
    fn blend_stays_inside_bounds() {
        let mut rng = StdRng::seed_from_u64(99);
        let bound = Evaluation::Finite(p(7, 8));
        for _ in 0..200 {
            let node = DecisionNode::sample(&mut rng);
            let v = leaf_value(&node);
            assert!(v <= bound && v >= -bound, "{:?} -> {}", node, v);
        }
    }

    #[test]
    fn fire_at_opponent_matches_enumeration() {
        // Equal-likelihood removal of one live or one blank, then the marginal.
        for live in 1..=4u8 {
            for blank in 0..=4u8 {
                let (l, b) = (live as i128, blank as i128);
                if l + b - 1 <= 0 {
                    assert_eq!(odds::fire_at_opponent(live, blank), Prob::one());
                    continue;
                }
                let after_live = p(l - 1, l + b - 1);
                let after_blank = p(l, l + b - 1);
                let enumerated = (after_live + after_blank) / Prob::from_integer(2);
                assert_eq!(odds::fire_at_opponent(live, blank), enumerated, "L={live} B={blank}");
            }
        }
        assert_eq!(odds::fire_at_opponent(3, 1), p(5, 6));
    }

    #[test]
    fn beer_matches_four_way_enumeration() {
        let (l, b) = (2i128, 2i128);
        // A live is spent from the pool unless both sampled tokens were blank.
        let mut total = Prob::zero();
        for ejected in Token::ALL {
            for next in Token::ALL {
                let both_blank = ejected == Token::Blank && next == Token::Blank;
                let lives_left = l - 1 + if both_blank { 1 } else { 0 };
                total += p(lives_left, l + b - 2) * p(1, 4);
            }
        }
        assert_eq!(odds::beer(2, 2, true), total);
        assert_eq!(total, p(5, 8));
        assert_eq!(odds::beer(2, 2, false), p(1, 2));
        assert_eq!(odds::beer(1, 1, true), Prob::one());
    }

    #[test]
    fn fire_at_self_sums_blank_positions() {
        assert_eq!(odds::fire_at_self(2, 3), p(7, 36));
        assert_eq!(odds::fire_at_self(1, 3), Prob::zero());
        assert_eq!(odds::fire_at_self(2, 0), Prob::one());
        assert_eq!(odds::fire_at_self(0, 2), Prob::zero());
    }

    #[test]
    fn decided_outcomes_are_unit_values() {
        assert_eq!(outcome_value(&DecisionNode::new(0, 2, 4, 1, 1)), Evaluation::finite_ratio(-1, 1));
        assert_eq!(outcome_value(&DecisionNode::new(2, 0, 4, 1, 1)), Evaluation::finite_ratio(1, 1));
        let open = DecisionNode::new(3, 2, 4, 2, 2);
        assert_eq!(outcome_value(&open), leaf_value(&open));
    }

    #[test]
    fn predicted_value_follows_the_side_on_turn() {
        // Player on turn: the lowest of the three resolving estimates.
        let node = DecisionNode::new(3, 3, 3, 2, 3).with_items(Side::Player, &[ItemKind::Beer]);
        let safety = odds::fire_at_opponent(2, 3).min(odds::fire_at_self(2, 3)).min(odds::beer(2, 3, true));
        for action in Action::ALL {
            assert_eq!(predicted_value(action, &node), safety, "{}", action);
        }
        assert_eq!(safety, p(7, 36));

        // Dealer on turn: the plain live marginal, whatever the dealer holds.
        let dealer = node.with_turn(Side::Dealer).with_items(Side::Dealer, &[ItemKind::Beer]);
        for action in Action::ALL {
            assert_eq!(predicted_value(action, &dealer), p(2, 5), "{}", action);
        }
        assert_eq!(predicted_value(Action::UseBeer, &DecisionNode::new(3, 3, 3, 3, 1).with_turn(Side::Dealer)), p(3, 4));
    }

    #[test]
    fn action_preference_uses_the_closed_forms() {
        let node = DecisionNode::new(3, 3, 3, 3, 1);
        assert_eq!(action_preference(Action::FireAtOpponent, &node), p(5, 6));
        let dealer = node.clone().with_turn(Side::Dealer);
        assert_eq!(action_preference(Action::FireAtOpponent, &dealer), p(5, 6));

        let known = DecisionNode::new(3, 3, 3, 2, 2).with_revealed(Token::Blank);
        assert_eq!(action_preference(Action::FireAtSelf, &known), Prob::one());
        assert_eq!(action_preference(Action::FireAtOpponent, &known), Prob::zero());
    }

    #[test]
    fn side_to_move_takes_the_minimum() {
        let node = DecisionNode::new(3, 3, 3, 2, 3);
        let expected = odds::fire_at_opponent(2, 3).min(odds::fire_at_self(2, 3)).min(odds::marginal(2, 3));
        assert_eq!(side_to_move_safety(&node), expected);
        assert_eq!(side_to_move_safety(&node), p(7, 36));
    }
}
