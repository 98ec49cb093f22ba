use serde::{Deserialize, Serialize};

use crate::game::{GameState, PlayCardAction, PlayerId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    PlayCard { action: PlayCardAction },
    EndTurn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiDecision {
    pub action: GameAction,
    /// 决策时手牌中负担得起的卡牌数量。
    pub affordable: usize,
}

/// 固定贪心策略：每一步打出负担得起的最贵卡牌，直到无牌可出再结束回合。
/// 该策略从不发起攻击。
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyPolicy;

impl GreedyPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn decide_action(&self, state: &GameState, player_id: PlayerId) -> AiDecision {
        let Some(player) = state.get_player(player_id) else {
            return AiDecision {
                action: GameAction::EndTurn,
                affordable: 0,
            };
        };
        if player.mana == 0 {
            return AiDecision {
                action: GameAction::EndTurn,
                affordable: 0,
            };
        }

        let mut affordable = 0;
        let mut best: Option<(usize, u8)> = None;
        for (index, card) in player.hand.iter().enumerate() {
            if card.mana_cost > player.mana {
                continue;
            }
            affordable += 1;
            // 严格大于：同费用时保留手牌中靠前的那张
            if best.map_or(true, |(_, cost)| card.mana_cost > cost) {
                best = Some((index, card.mana_cost));
            }
        }

        let action = match best {
            Some((hand_index, _)) => GameAction::PlayCard {
                action: PlayCardAction {
                    player_id,
                    hand_index,
                },
            },
            None => GameAction::EndTurn,
        };
        AiDecision { action, affordable }
    }
}
