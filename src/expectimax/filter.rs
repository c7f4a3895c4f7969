use crate::engine::{Action, DecisionNode, ItemKind, Token};

/// True if `action` cannot help the party on turn in `state`.
///
/// Only prunes moves that are never better than some alternative; the search
/// still considers everything else, including item uses that later prove illegal.
pub fn is_redundant(action: Action, state: &DecisionNode) -> bool {
    let actor = state.party(state.actor());
    let opponent = state.party(state.actor().opponent());
    match action {
        Action::FireAtOpponent => state.revealed_token == Some(Token::Blank),
        Action::FireAtSelf => state.revealed_token == Some(Token::Live),
        Action::UseCigarettes => actor.charges >= state.max_charges,
        Action::UseHandSaw => state.live_remaining == 0 || opponent.charges == 1,
        Action::UseHandcuffs => state.handcuffed,
        Action::UseMagnifyingGlass => state.revealed_token.is_some(),
        Action::UseBeer => {
            state.revealed_token.is_some() || state.live_remaining == 0 || state.blank_remaining == 0
        }
    }
}

/// The single dominant action for the party on turn, if one exists.
///
/// ```
/// use backshot::engine::{Action, DecisionNode, Token};
/// use backshot::expectimax::forced_move;
/// let node = DecisionNode::new(3, 3, 3, 2, 2).with_revealed(Token::Blank);
/// assert_eq!(forced_move(&node), Some(Action::FireAtSelf));
/// ```
pub fn forced_move(state: &DecisionNode) -> Option<Action> {
    let actor = state.party(state.actor());
    let opponent = state.party(state.actor().opponent());
    let items = &actor.items;

    match state.revealed_token {
        Some(Token::Live) if opponent.charges > 1 => {
            if items.has(ItemKind::HandSaw) && !state.gun_sawed {
                return Some(Action::UseHandSaw);
            }
            return Some(Action::FireAtOpponent);
        }
        Some(Token::Blank) => return Some(Action::FireAtSelf),
        _ => {}
    }
    if items.has(ItemKind::MagnifyingGlass)
        && state.revealed_token.is_none()
        && state.live_remaining >= 1
        && state.blank_remaining >= 1
    {
        return Some(Action::UseMagnifyingGlass);
    }
    if items.has(ItemKind::Cigarettes) && actor.charges < state.max_charges {
        return Some(Action::UseCigarettes);
    }
    if items.has(ItemKind::Handcuffs) && !state.handcuffed && state.blank_remaining == 1 {
        return Some(Action::UseHandcuffs);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Side;

    #[test]
    fn revealed_live_prefers_the_saw() {
        let node = DecisionNode::new(3, 3, 3, 2, 1)
            .with_revealed(Token::Live)
            .with_items(Side::Player, &[ItemKind::HandSaw]);
        assert_eq!(forced_move(&node), Some(Action::UseHandSaw));
        assert_eq!(forced_move(&node.clone().with_saw(true)), Some(Action::FireAtOpponent));
        let bare = DecisionNode::new(3, 3, 3, 2, 1).with_revealed(Token::Live);
        assert_eq!(forced_move(&bare), Some(Action::FireAtOpponent));
    }

    #[test]
    fn revealed_live_against_one_charge_is_not_forced() {
        let node = DecisionNode::new(3, 1, 3, 2, 1)
            .with_revealed(Token::Live)
            .with_items(Side::Player, &[ItemKind::HandSaw]);
        assert_eq!(forced_move(&node), None);
    }

    #[test]
    fn items_are_forced_in_priority_order() {
        let all = [ItemKind::MagnifyingGlass, ItemKind::Cigarettes, ItemKind::Handcuffs];
        let node = DecisionNode::new(2, 3, 3, 1, 1).with_items(Side::Player, &all);
        assert_eq!(forced_move(&node), Some(Action::UseMagnifyingGlass));

        let node = DecisionNode::new(2, 3, 3, 0, 2).with_items(Side::Player, &all);
        assert_eq!(forced_move(&node), Some(Action::UseCigarettes));

        let node = DecisionNode::new(3, 3, 3, 2, 1).with_items(Side::Player, &[ItemKind::Handcuffs]);
        assert_eq!(forced_move(&node), Some(Action::UseHandcuffs));
        assert_eq!(forced_move(&node.clone().with_handcuffs(true)), None);

        let node = DecisionNode::new(3, 3, 3, 2, 2).with_items(Side::Player, &[ItemKind::Handcuffs]);
        assert_eq!(forced_move(&node), None);
    }

    #[test]
    fn forced_moves_follow_the_actor() {
        let node = DecisionNode::new(3, 2, 3, 2, 2)
            .with_turn(Side::Dealer)
            .with_items(Side::Player, &[ItemKind::MagnifyingGlass])
            .with_items(Side::Dealer, &[ItemKind::Cigarettes]);
        assert_eq!(forced_move(&node), Some(Action::UseCigarettes));
    }

    #[test]
    fn redundancy_is_role_symmetric() {
        let node = DecisionNode::new(3, 1, 3, 1, 2).with_revealed(Token::Blank);
        assert!(is_redundant(Action::FireAtOpponent, &node));
        assert!(!is_redundant(Action::FireAtSelf, &node));
        assert!(is_redundant(Action::UseHandSaw, &node));
        assert!(is_redundant(Action::UseCigarettes, &node));
        assert!(is_redundant(Action::UseMagnifyingGlass, &node));
        assert!(is_redundant(Action::UseBeer, &node));

        let dealer = DecisionNode::new(1, 2, 3, 1, 2).with_turn(Side::Dealer);
        assert!(is_redundant(Action::UseHandSaw, &dealer));
        assert!(!is_redundant(Action::UseCigarettes, &dealer));
        assert!(!is_redundant(Action::UseBeer, &dealer));
        assert!(is_redundant(Action::UseHandcuffs, &dealer.with_handcuffs(true)));
    }

    #[test]
    fn beer_is_redundant_once_one_kind_is_exhausted() {
        assert!(is_redundant(Action::UseBeer, &DecisionNode::new(3, 3, 3, 0, 2)));
        assert!(is_redundant(Action::UseBeer, &DecisionNode::new(3, 3, 3, 2, 0)));
        assert!(is_redundant(Action::UseHandSaw, &DecisionNode::new(3, 3, 3, 0, 2)));
    }
}
