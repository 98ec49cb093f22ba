use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use super::state::{
    AttackerSelection, CardKind, GameEvent, GamePhase, GameState, InstanceId, IntegrityError,
    Minion, PlayerId,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayCardAction {
    pub player_id: PlayerId,
    pub hand_index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TargetKind {
    Hero,
    Minion,
}

impl FromStr for TargetKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hero" | "face" => Ok(TargetKind::Hero),
            "minion" => Ok(TargetKind::Minion),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackAction {
    pub kind: TargetKind,
    pub target_player: PlayerId,
    #[serde(default)]
    pub target_slot: Option<usize>,
}

impl AttackAction {
    pub fn hero(target_player: PlayerId) -> Self {
        Self {
            kind: TargetKind::Hero,
            target_player,
            target_slot: None,
        }
    }

    pub fn minion(target_player: PlayerId, slot: usize) -> Self {
        Self {
            kind: TargetKind::Minion,
            target_player,
            target_slot: Some(slot),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameFinished,
    NotPlayerTurn,
    PlayerNotFound {
        player_id: PlayerId,
    },
    HandIndexOutOfRange {
        index: usize,
        hand_size: usize,
    },
    InsufficientMana {
        required: u8,
        available: u8,
    },
    NotHumanPlayer {
        player_id: PlayerId,
    },
    AttackerNotReady {
        slot: usize,
    },
    NoAttackerSelected,
    IncompleteSelection,
    InvalidAttackTarget,
    MinionsMustBeAttackedFirst,
    TargetNotFound {
        slot: Option<usize>,
    },
    ActionInProgress,
    OpeningDrawPending,
    IntegrityViolation {
        error: IntegrityError,
    },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::GameFinished => write!(f, "the game has already ended"),
            RuleError::NotPlayerTurn => write!(f, "it is not this player's turn"),
            RuleError::PlayerNotFound { player_id } => write!(f, "no player with id {player_id}"),
            RuleError::HandIndexOutOfRange { index, hand_size } => {
                write!(f, "hand index {index} is out of range (hand has {hand_size} cards)")
            }
            RuleError::InsufficientMana {
                required,
                available,
            } => write!(f, "not enough mana: need {required}, have {available}"),
            RuleError::NotHumanPlayer { player_id } => {
                write!(f, "player {player_id} is not controlled by a human")
            }
            RuleError::AttackerNotReady { slot } => {
                write!(f, "the minion in slot {slot} cannot attack right now")
            }
            RuleError::NoAttackerSelected => write!(f, "no attacker is selected"),
            RuleError::IncompleteSelection => {
                write!(f, "an attacker selection needs both a player and a slot")
            }
            RuleError::InvalidAttackTarget => write!(f, "a minion cannot attack its own side"),
            RuleError::MinionsMustBeAttackedFirst => {
                write!(f, "enemy minions must be attacked before the hero")
            }
            RuleError::TargetNotFound { slot } => match slot {
                Some(slot) => write!(f, "no enemy minion in slot {slot}"),
                None => write!(f, "a minion attack needs a target slot"),
            },
            RuleError::ActionInProgress => write!(f, "another action is still being resolved"),
            RuleError::OpeningDrawPending => write!(f, "the opening hands have not been dealt yet"),
            RuleError::IntegrityViolation { error } => {
                write!(f, "state integrity violated: {error:?}")
            }
        }
    }
}

impl std::error::Error for RuleError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

impl RuleResolution {
    /// 结算只携带本次命令产生的事件，完整日志留在对局状态里。
    pub fn new(mut state: GameState, events: Vec<GameEvent>) -> Self {
        state.event_log.clear();
        let winner = state.winner;
        Self {
            state,
            events,
            winner,
        }
    }
}

/// 出牌与战斗结算。所有校验在修改状态之前完成，失败时状态保持不变。
#[derive(Debug, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    fn ensure_playing(state: &GameState) -> Result<(), RuleError> {
        if state.phase != GamePhase::Playing {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_turn_owner(state: &GameState, player_id: PlayerId) -> Result<(), RuleError> {
        if state.get_player(player_id).is_none() {
            return Err(RuleError::PlayerNotFound { player_id });
        }
        if state.current_player != player_id {
            return Err(RuleError::NotPlayerTurn);
        }
        Ok(())
    }

    pub fn play_card(
        &self,
        state: &mut GameState,
        action: PlayCardAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_playing(state)?;
        Self::ensure_turn_owner(state, action.player_id)?;

        let index = usize::from(action.player_id);
        let player = &state.players[index];
        let card = player
            .hand
            .get(action.hand_index)
            .ok_or(RuleError::HandIndexOutOfRange {
                index: action.hand_index,
                hand_size: player.hand.len(),
            })?;
        let (kind, cost) = (card.kind, card.mana_cost);
        if player.mana < cost {
            return Err(RuleError::InsufficientMana {
                required: cost,
                available: player.mana,
            });
        }

        let board_full = player.board.len() >= state.max_board_size;
        let instance_id = match kind {
            CardKind::Minion { .. } if !board_full => Some(state.allocate_instance_id()),
            _ => None,
        };

        let player = &mut state.players[index];
        let card = player.hand.remove(action.hand_index);
        player.mana -= cost;

        let mut events = vec![GameEvent::CardPlayed {
            player_id: action.player_id,
            card_id: card.id.clone(),
            mana_spent: card.mana_cost,
        }];
        match (card.kind, instance_id) {
            (CardKind::Minion { attack, health }, Some(instance_id)) => {
                player
                    .board
                    .push(Minion::summon(&card, instance_id, attack, health));
                events.push(GameEvent::MinionSummoned {
                    player_id: action.player_id,
                    instance_id,
                    slot: player.board.len() - 1,
                });
            }
            (CardKind::Minion { .. }, None) => {
                events.push(GameEvent::MinionWasted {
                    player_id: action.player_id,
                    card_id: card.id.clone(),
                });
            }
            (CardKind::Spell, _) => {
                events.push(GameEvent::SpellCast {
                    player_id: action.player_id,
                    card_id: card.id.clone(),
                });
            }
        }

        debug!(
            "player {} played {} ({} mana left)",
            action.player_id, card.name, player.mana
        );
        for event in &events {
            state.record_event(event.clone());
        }
        Ok(events)
    }

    /// 选择攻击者；传入 `None` 总是清除选择。
    pub fn select_attacker(
        &self,
        state: &mut GameState,
        selection: Option<AttackerSelection>,
    ) -> Result<(), RuleError> {
        let Some(selection) = selection else {
            state.selected_attacker = None;
            return Ok(());
        };

        Self::ensure_playing(state)?;
        Self::ensure_turn_owner(state, selection.player)?;
        let player = &state.players[usize::from(selection.player)];
        if !player.is_human {
            return Err(RuleError::NotHumanPlayer {
                player_id: selection.player,
            });
        }
        let ready = player
            .board
            .get(selection.slot)
            .map(Minion::ready_to_attack)
            .unwrap_or(false);
        if !ready {
            return Err(RuleError::AttackerNotReady {
                slot: selection.slot,
            });
        }

        state.selected_attacker = Some(selection);
        Ok(())
    }

    pub fn attack(
        &self,
        state: &mut GameState,
        action: AttackAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_playing(state)?;
        let selection = state
            .selected_attacker
            .ok_or(RuleError::NoAttackerSelected)?;
        Self::ensure_turn_owner(state, selection.player)?;
        if state.get_player(action.target_player).is_none() {
            return Err(RuleError::PlayerNotFound {
                player_id: action.target_player,
            });
        }
        if action.target_player == selection.player {
            return Err(RuleError::InvalidAttackTarget);
        }

        let attacker_index = usize::from(selection.player);
        let defender_index = usize::from(action.target_player);
        let attacker = state.players[attacker_index]
            .board
            .get(selection.slot)
            .filter(|minion| minion.can_attack)
            .ok_or(RuleError::AttackerNotReady {
                slot: selection.slot,
            })?;
        let attacker_id = attacker.instance_id;
        let attacker_attack = attacker.attack;

        let defender_board = &state.players[defender_index].board;
        let defender: Option<(InstanceId, i16)> = match action.kind {
            TargetKind::Hero => {
                if !defender_board.is_empty() {
                    return Err(RuleError::MinionsMustBeAttackedFirst);
                }
                None
            }
            TargetKind::Minion => {
                let minion = action
                    .target_slot
                    .and_then(|slot| defender_board.get(slot))
                    .ok_or(RuleError::TargetNotFound {
                        slot: action.target_slot,
                    })?;
                Some((minion.instance_id, minion.attack))
            }
        };

        state.players[attacker_index].board[selection.slot].can_attack = false;
        state.selected_attacker = None;

        let mut events = vec![GameEvent::AttackDeclared {
            attacker_owner: selection.player,
            attacker_id,
            defender_owner: action.target_player,
            defender_id: defender.map(|(id, _)| id),
        }];

        match (defender, action.target_slot) {
            (Some((defender_id, defender_attack)), Some(target_slot)) => {
                let defender_minion = &mut state.players[defender_index].board[target_slot];
                defender_minion.current_health =
                    defender_minion.current_health.saturating_sub(attacker_attack);
                let attacker_minion = &mut state.players[attacker_index].board[selection.slot];
                attacker_minion.current_health =
                    attacker_minion.current_health.saturating_sub(defender_attack);
                events.push(GameEvent::DamageResolved {
                    source_player: selection.player,
                    source_minion: attacker_id,
                    target_player: action.target_player,
                    target_minion: Some(defender_id),
                    amount: attacker_attack,
                });
                events.push(GameEvent::DamageResolved {
                    source_player: action.target_player,
                    source_minion: defender_id,
                    target_player: selection.player,
                    target_minion: Some(attacker_id),
                    amount: defender_attack,
                });

                for index in [defender_index, attacker_index] {
                    let player_id = state.players[index].id;
                    for minion in state.players[index].remove_dead_minions() {
                        events.push(GameEvent::MinionDestroyed { player_id, minion });
                    }
                }
            }
            _ => {
                let hero = &mut state.players[defender_index];
                hero.health = hero.health.saturating_sub(attacker_attack);
                events.push(GameEvent::DamageResolved {
                    source_player: selection.player,
                    source_minion: attacker_id,
                    target_player: action.target_player,
                    target_minion: None,
                    amount: attacker_attack,
                });
            }
        }

        debug!(
            "minion {} of player {} attacked player {}",
            attacker_id, selection.player, action.target_player
        );
        for event in &events {
            state.record_event(event.clone());
        }
        if let Some(winner) = state.evaluate_victory() {
            events.push(GameEvent::GameWon {
                winner,
                loser: GameState::opponent_of(winner),
            });
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::EngineConfig;
    use crate::game::state::{CardTemplate, HUMAN_PLAYER, OPPONENT_PLAYER};

    fn setup_state() -> GameState {
        let mut state = GameState::blank(&EngineConfig::default());
        state.players[0].mana = 5;
        state.players[0].max_mana = 5;
        state
    }

    fn select(state: &mut GameState, slot: usize) {
        RuleEngine::new()
            .select_attacker(
                state,
                Some(AttackerSelection {
                    player: HUMAN_PLAYER,
                    slot,
                }),
            )
            .expect("attacker should be selectable");
    }

    #[test]
    fn playing_minion_spends_mana_and_summons_sick_minion() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.players[0].hand = vec![CardTemplate::minion("yeti", "Chillwind Yeti", 4, 4, 5)];

        let events = engine
            .play_card(
                &mut state,
                PlayCardAction {
                    player_id: 0,
                    hand_index: 0,
                },
            )
            .expect("play should succeed");

        let player = &state.players[0];
        assert_eq!(player.mana, 1);
        assert!(player.hand.is_empty());
        let minion = &player.board[0];
        assert_eq!(minion.current_health, 5);
        assert!(!minion.can_attack);
        assert!(minion.summoning_sickness);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::MinionSummoned { slot: 0, .. })));
    }

    #[test]
    fn playing_minion_onto_full_board_still_consumes_card() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        let filler = CardTemplate::minion("imp", "Flame Imp", 1, 3, 2);
        for _ in 0..7 {
            state.place_minion(0, &filler, false);
        }
        state.players[0].hand = vec![CardTemplate::minion("ogre", "Ogre Magi", 4, 4, 4)];

        let events = engine
            .play_card(
                &mut state,
                PlayCardAction {
                    player_id: 0,
                    hand_index: 0,
                },
            )
            .expect("wasted play is still a successful play");

        let player = &state.players[0];
        assert_eq!(player.board.len(), 7);
        assert!(player.hand.is_empty());
        assert_eq!(player.mana, 1);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::MinionWasted { .. })));
    }

    #[test]
    fn spell_is_discarded_without_effect() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.players[0].hand = vec![CardTemplate::spell("fireball", "Fireball", 4)];

        engine
            .play_card(
                &mut state,
                PlayCardAction {
                    player_id: 0,
                    hand_index: 0,
                },
            )
            .expect("spell should be cast");

        assert!(state.players[0].hand.is_empty());
        assert!(state.players[0].board.is_empty());
        assert_eq!(state.players[1].health, 30);
    }

    #[test]
    fn play_card_failures_leave_state_untouched() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.players[0].hand = vec![CardTemplate::minion("ogre", "Boulderfist Ogre", 6, 6, 7)];
        let before = state.clone();

        let play = |player_id, hand_index| PlayCardAction {
            player_id,
            hand_index,
        };
        assert_eq!(
            engine.play_card(&mut state, play(0, 0)),
            Err(RuleError::InsufficientMana {
                required: 6,
                available: 5
            })
        );
        assert_eq!(
            engine.play_card(&mut state, play(0, 3)),
            Err(RuleError::HandIndexOutOfRange {
                index: 3,
                hand_size: 1
            })
        );
        assert_eq!(
            engine.play_card(&mut state, play(1, 0)),
            Err(RuleError::NotPlayerTurn)
        );
        assert_eq!(
            engine.play_card(&mut state, play(4, 0)),
            Err(RuleError::PlayerNotFound { player_id: 4 })
        );
        assert_eq!(state, before);

        state.declare_victory(0);
        assert_eq!(
            engine.play_card(&mut state, play(0, 0)),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn sick_minion_cannot_be_selected() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("imp", "Flame Imp", 1, 3, 2), false);

        let result = engine.select_attacker(
            &mut state,
            Some(AttackerSelection {
                player: HUMAN_PLAYER,
                slot: 0,
            }),
        );

        assert_eq!(result, Err(RuleError::AttackerNotReady { slot: 0 }));
        assert!(state.selected_attacker.is_none());
    }

    #[test]
    fn opponent_side_cannot_select_attackers() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.current_player = OPPONENT_PLAYER;
        state.place_minion(1, &CardTemplate::minion("imp", "Flame Imp", 1, 3, 2), true);

        let result = engine.select_attacker(
            &mut state,
            Some(AttackerSelection {
                player: OPPONENT_PLAYER,
                slot: 0,
            }),
        );

        assert_eq!(
            result,
            Err(RuleError::NotHumanPlayer {
                player_id: OPPONENT_PLAYER
            })
        );
    }

    #[test]
    fn clearing_selection_always_succeeds() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("imp", "Flame Imp", 1, 3, 2), true);
        select(&mut state, 0);
        state.current_player = OPPONENT_PLAYER;

        engine
            .select_attacker(&mut state, None)
            .expect("clearing never fails");
        assert!(state.selected_attacker.is_none());
    }

    #[test]
    fn hero_attack_blocked_by_enemy_minions() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("imp", "Flame Imp", 1, 3, 2), true);
        state.place_minion(1, &CardTemplate::minion("yeti", "Chillwind Yeti", 4, 4, 5), false);
        select(&mut state, 0);

        let result = engine.attack(&mut state, AttackAction::hero(OPPONENT_PLAYER));

        assert_eq!(result, Err(RuleError::MinionsMustBeAttackedFirst));
        assert!(state.players[0].board[0].can_attack, "rejected attack is not spent");
        assert!(state.selected_attacker.is_some());
    }

    #[test]
    fn hero_attack_on_empty_board_deals_damage_once() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("imp", "Flame Imp", 1, 3, 2), true);
        select(&mut state, 0);

        engine
            .attack(&mut state, AttackAction::hero(OPPONENT_PLAYER))
            .expect("unblocked hero attack should succeed");

        assert_eq!(state.players[1].health, 27);
        assert!(!state.players[0].board[0].can_attack);
        assert!(state.selected_attacker.is_none());
        assert_eq!(
            engine.attack(&mut state, AttackAction::hero(OPPONENT_PLAYER)),
            Err(RuleError::NoAttackerSelected)
        );
        assert_eq!(
            engine.select_attacker(
                &mut state,
                Some(AttackerSelection {
                    player: HUMAN_PLAYER,
                    slot: 0
                })
            ),
            Err(RuleError::AttackerNotReady { slot: 0 })
        );
    }

    #[test]
    fn combat_damage_is_simultaneous() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("a", "Attacker", 3, 3, 5), true);
        state.place_minion(1, &CardTemplate::minion("d", "Defender", 4, 4, 4), false);
        select(&mut state, 0);

        engine
            .attack(&mut state, AttackAction::minion(OPPONENT_PLAYER, 0))
            .expect("minion attack should succeed");

        assert_eq!(state.players[0].board[0].current_health, 1);
        assert_eq!(state.players[1].board[0].current_health, 1);
    }

    #[test]
    fn lethal_combat_removes_only_dead_minion() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("a", "Attacker", 6, 6, 6), true);
        state.place_minion(1, &CardTemplate::minion("d", "Defender", 2, 2, 3), false);
        select(&mut state, 0);

        let events = engine
            .attack(&mut state, AttackAction::minion(OPPONENT_PLAYER, 0))
            .expect("minion attack should succeed");

        assert!(state.players[1].board.is_empty());
        assert_eq!(state.players[0].board[0].current_health, 4);
        let destroyed: Vec<&GameEvent> = events
            .iter()
            .filter(|event| matches!(event, GameEvent::MinionDestroyed { .. }))
            .collect();
        assert_eq!(destroyed.len(), 1);
    }

    #[test]
    fn minion_attack_requires_existing_target() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("a", "Attacker", 3, 3, 5), true);
        state.place_minion(1, &CardTemplate::minion("d", "Defender", 4, 4, 4), false);
        select(&mut state, 0);

        assert_eq!(
            engine.attack(&mut state, AttackAction::minion(OPPONENT_PLAYER, 2)),
            Err(RuleError::TargetNotFound { slot: Some(2) })
        );
        assert_eq!(
            engine.attack(
                &mut state,
                AttackAction {
                    kind: TargetKind::Minion,
                    target_player: OPPONENT_PLAYER,
                    target_slot: None,
                }
            ),
            Err(RuleError::TargetNotFound { slot: None })
        );
        assert_eq!(
            engine.attack(&mut state, AttackAction::hero(HUMAN_PLAYER)),
            Err(RuleError::InvalidAttackTarget)
        );
        assert!(state.players[0].board[0].can_attack);
    }

    #[test]
    fn extreme_damage_saturates_instead_of_overflowing() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.place_minion(0, &CardTemplate::minion("a", "Attacker", 3, 3, 5), true);
        state.place_minion(1, &CardTemplate::minion("d", "Defender", 4, 4, 4), false);
        state.players[1].board[0].current_health = i16::MIN + 1;
        select(&mut state, 0);

        engine
            .attack(&mut state, AttackAction::minion(OPPONENT_PLAYER, 0))
            .expect("minion attack should succeed");
        assert!(state.players[1].board.is_empty());

        state.players[0].board[0].can_attack = true;
        state.players[1].health = i16::MIN + 1;
        select(&mut state, 0);
        engine
            .attack(&mut state, AttackAction::hero(OPPONENT_PLAYER))
            .expect("hero attack should succeed");

        assert_eq!(state.players[1].health, i16::MIN);
        assert_eq!(state.winner, Some(HUMAN_PLAYER));
    }

    #[test]
    fn resolution_carries_only_its_own_events() {
        let mut state = setup_state();
        state.record_event(GameEvent::GameStarted);
        state.record_event(GameEvent::TurnEnded { player_id: 0 });
        let events = vec![GameEvent::TurnStarted {
            player_id: 1,
            turn: 2,
        }];

        let resolution = RuleResolution::new(state, events.clone());
        assert!(resolution.state.event_log.is_empty());
        assert_eq!(resolution.events, events);

        let json = serde_json::to_value(&resolution).expect("resolution should serialize");
        assert!(json["state"].get("event_log").is_none());
        assert_eq!(json["events"][0]["type"], "TurnStarted");
    }

    #[test]
    fn hero_lethal_ends_game() {
        let engine = RuleEngine::new();
        let mut state = setup_state();
        state.players[1].health = 3;
        state.place_minion(0, &CardTemplate::minion("imp", "Flame Imp", 1, 3, 2), true);
        select(&mut state, 0);

        let events = engine
            .attack(&mut state, AttackAction::hero(OPPONENT_PLAYER))
            .expect("lethal attack should succeed");

        assert_eq!(state.phase, GamePhase::Ended);
        assert_eq!(state.winner, Some(HUMAN_PLAYER));
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::GameWon {
                winner: HUMAN_PLAYER,
                loser: OPPONENT_PLAYER
            }
        )));
        assert_eq!(
            engine.attack(&mut state, AttackAction::hero(OPPONENT_PLAYER)),
            Err(RuleError::GameFinished)
        );
    }
}
