use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::config::EngineConfig;

/// 玩家标识，0 为人类玩家，1 为脚本对手。
pub type PlayerId = u8;
/// 场上随从的实例标识，在一局游戏内唯一。
pub type InstanceId = u32;

pub const HUMAN_PLAYER: PlayerId = 0;
pub const OPPONENT_PLAYER: PlayerId = 1;

/// 卡牌类型，随从额外携带身材数据。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CardKind {
    Minion { attack: i16, health: i16 },
    Spell,
}

/// 卡牌目录中的不可变模板。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardTemplate {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: CardKind,
    #[serde(alias = "mana")]
    pub mana_cost: u8,
    #[serde(default)]
    pub description: String,
}

impl CardTemplate {
    pub fn minion(
        id: impl Into<String>,
        name: impl Into<String>,
        mana_cost: u8,
        attack: i16,
        health: i16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: CardKind::Minion { attack, health },
            mana_cost,
            description: String::new(),
        }
    }

    pub fn spell(id: impl Into<String>, name: impl Into<String>, mana_cost: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: CardKind::Spell,
            mana_cost,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// 场上的随从实例。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Minion {
    pub instance_id: InstanceId,
    pub template_id: String,
    pub name: String,
    pub mana_cost: u8,
    #[serde(default)]
    pub description: String,
    pub attack: i16,
    pub health: i16,
    pub current_health: i16,
    pub can_attack: bool,
    pub summoning_sickness: bool,
}

impl Minion {
    /// 新召唤的随从处于召唤失调状态，本回合不能攻击。
    pub fn summon(
        template: &CardTemplate,
        instance_id: InstanceId,
        attack: i16,
        health: i16,
    ) -> Self {
        Self {
            instance_id,
            template_id: template.id.clone(),
            name: template.name.clone(),
            mana_cost: template.mana_cost,
            description: template.description.clone(),
            attack,
            health,
            current_health: health,
            can_attack: false,
            summoning_sickness: true,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.current_health <= 0
    }

    pub fn ready_to_attack(&self) -> bool {
        self.can_attack && !self.summoning_sickness
    }
}

/// 玩家状态，包括牌库、手牌、战场等信息。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_human: bool,
    pub health: i16,
    pub mana: u8,
    pub max_mana: u8,
    #[serde(default)]
    pub hand: Vec<CardTemplate>,
    #[serde(default)]
    pub board: Vec<Minion>,
    #[serde(default)]
    pub deck: Vec<CardTemplate>,
}

impl Player {
    pub fn new(
        id: PlayerId,
        name: impl Into<String>,
        is_human: bool,
        deck: Vec<CardTemplate>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            is_human,
            health: config.starting_health,
            mana: config.starting_mana,
            max_mana: config.starting_mana,
            hand: Vec::new(),
            board: Vec::new(),
            deck,
        }
    }

    pub fn ready_board(&mut self) {
        for minion in &mut self.board {
            minion.can_attack = true;
            minion.summoning_sickness = false;
        }
    }

    /// 返回被移除的阵亡随从。
    pub fn remove_dead_minions(&mut self) -> Vec<Minion> {
        let (dead, alive): (Vec<Minion>, Vec<Minion>) =
            self.board.drain(..).partition(Minion::is_dead);
        self.board = alive;
        dead
    }
}

/// 游戏阶段，`Ended` 为终止状态，只能通过重新开局离开。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    Playing,
    Ended,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Playing
    }
}

/// 当前选中的攻击者。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackerSelection {
    pub player: PlayerId,
    pub slot: usize,
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted,
    CardDrawn {
        player_id: PlayerId,
        card_id: String,
    },
    CardBurned {
        player_id: PlayerId,
        card: CardTemplate,
    },
    CardPlayed {
        player_id: PlayerId,
        card_id: String,
        mana_spent: u8,
    },
    MinionSummoned {
        player_id: PlayerId,
        instance_id: InstanceId,
        slot: usize,
    },
    MinionWasted {
        player_id: PlayerId,
        card_id: String,
    },
    SpellCast {
        player_id: PlayerId,
        card_id: String,
    },
    AttackDeclared {
        attacker_owner: PlayerId,
        attacker_id: InstanceId,
        defender_owner: PlayerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        defender_id: Option<InstanceId>,
    },
    DamageResolved {
        source_player: PlayerId,
        source_minion: InstanceId,
        target_player: PlayerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_minion: Option<InstanceId>,
        amount: i16,
    },
    MinionDestroyed {
        player_id: PlayerId,
        minion: Minion,
    },
    TurnEnded {
        player_id: PlayerId,
    },
    TurnStarted {
        player_id: PlayerId,
        turn: u32,
    },
    GameWon {
        winner: PlayerId,
        loser: PlayerId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    InvalidPlayerIndex { player_id: PlayerId },
    DuplicateInstanceId { instance_id: InstanceId },
    HandOverflow { player_id: PlayerId, size: usize },
    BoardOverflow { player_id: PlayerId, size: usize },
    ManaOutOfRange { player_id: PlayerId, value: u8 },
    WinnerPhaseMismatch,
}

/// 游戏整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub players: [Player; 2],
    pub current_player: PlayerId,
    pub turn: u32,
    pub phase: GamePhase,
    #[serde(default)]
    pub winner: Option<PlayerId>,
    #[serde(default)]
    pub selected_attacker: Option<AttackerSelection>,
    pub next_instance_id: InstanceId,
    pub max_hand_size: usize,
    pub max_board_size: usize,
    pub mana_cap: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new(players: [Player; 2], config: &EngineConfig) -> Self {
        Self {
            players,
            current_player: HUMAN_PLAYER,
            turn: 1,
            phase: GamePhase::Playing,
            winner: None,
            selected_attacker: None,
            next_instance_id: 1,
            max_hand_size: config.max_hand_size,
            max_board_size: config.max_board_size,
            mana_cap: config.mana_cap,
            event_log: Vec::new(),
        }
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(usize::from(id))
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(usize::from(id))
    }

    pub fn opponent_of(player_id: PlayerId) -> PlayerId {
        1 - player_id.min(1)
    }

    pub fn is_playing(&self) -> bool {
        self.phase == GamePhase::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Ended
    }

    pub fn allocate_instance_id(&mut self) -> InstanceId {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        id
    }

    /// 从牌库顶抽取至多 `count` 张牌，超出手牌上限的部分直接弃置。
    pub fn draw_cards(&mut self, player_id: PlayerId, count: usize) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !self.is_playing() {
            return events;
        }
        let max_hand_size = self.max_hand_size;
        let Some(player) = self.get_player_mut(player_id) else {
            return events;
        };

        let drawn = count.min(player.deck.len());
        for card in player.deck.drain(..drawn) {
            events.push(GameEvent::CardDrawn {
                player_id,
                card_id: card.id.clone(),
            });
            player.hand.push(card);
        }
        if player.hand.len() > max_hand_size {
            for card in player.hand.split_off(max_hand_size) {
                events.push(GameEvent::CardBurned { player_id, card });
            }
        }

        for event in &events {
            self.record_event(event.clone());
        }
        events
    }

    pub fn can_afford(&self, player_id: PlayerId, card: &CardTemplate) -> bool {
        self.get_player(player_id)
            .map(|player| player.mana >= card.mana_cost)
            .unwrap_or(false)
    }

    /// 结算后检查双方生命值；玩家 0 先判定，同时阵亡时玩家 1 获胜。
    pub fn evaluate_victory(&mut self) -> Option<PlayerId> {
        if self.winner.is_some() {
            return self.winner;
        }
        let loser = self
            .players
            .iter()
            .find(|player| player.health <= 0)
            .map(|player| player.id)?;
        Some(self.declare_victory(Self::opponent_of(loser)))
    }

    pub fn declare_victory(&mut self, winner: PlayerId) -> PlayerId {
        if self.winner.is_none() {
            let loser = Self::opponent_of(winner);
            self.phase = GamePhase::Ended;
            self.winner = Some(winner);
            self.selected_attacker = None;
            self.record_event(GameEvent::GameWon { winner, loser });
        }
        winner
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if usize::from(self.current_player) >= self.players.len() {
            return Err(IntegrityError::InvalidPlayerIndex {
                player_id: self.current_player,
            });
        }
        if self.winner.is_some() != self.is_finished() {
            return Err(IntegrityError::WinnerPhaseMismatch);
        }

        let mut seen = HashSet::new();
        for player in &self.players {
            if player.hand.len() > self.max_hand_size {
                return Err(IntegrityError::HandOverflow {
                    player_id: player.id,
                    size: player.hand.len(),
                });
            }
            if player.board.len() > self.max_board_size {
                return Err(IntegrityError::BoardOverflow {
                    player_id: player.id,
                    size: player.board.len(),
                });
            }
            if player.mana > player.max_mana || player.max_mana > self.mana_cap {
                return Err(IntegrityError::ManaOutOfRange {
                    player_id: player.id,
                    value: player.mana,
                });
            }
            for minion in &player.board {
                if !seen.insert(minion.instance_id) {
                    return Err(IntegrityError::DuplicateInstanceId {
                        instance_id: minion.instance_id,
                    });
                }
            }
        }

        Ok(())
    }

    /// 构造一个无牌库、无手牌的空白对局，便于测试和调试时手动布置局面。
    pub fn blank(config: &EngineConfig) -> Self {
        let human = Player::new(HUMAN_PLAYER, "Player", true, Vec::new(), config);
        let opponent = Player::new(OPPONENT_PLAYER, "Opponent", false, Vec::new(), config);
        Self::new([human, opponent], config)
    }

    /// 直接在场上放置一个随从，返回其实例标识。
    pub fn place_minion(
        &mut self,
        player_id: PlayerId,
        template: &CardTemplate,
        ready: bool,
    ) -> Option<InstanceId> {
        let CardKind::Minion { attack, health } = template.kind else {
            return None;
        };
        let instance_id = self.allocate_instance_id();
        let player = self.get_player_mut(player_id)?;
        let mut minion = Minion::summon(template, instance_id, attack, health);
        if ready {
            minion.can_attack = true;
            minion.summoning_sickness = false;
        }
        player.board.push(minion);
        Some(instance_id)
    }
}
