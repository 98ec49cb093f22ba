use log::{debug, info};
use rand::Rng;

use super::catalog::CardCatalog;
use super::config::EngineConfig;
use super::schedule::{Job, Scheduler};
use super::state::{GameEvent, GameState, Player, PlayerId, HUMAN_PLAYER, OPPONENT_PLAYER};

/// 回合控制器，唯一允许推进回合的组件。
#[derive(Debug, Clone, Default)]
pub struct TurnController {
    config: EngineConfig,
}

impl TurnController {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 重建一局全新的对局，并安排开局抽牌。旧对局的待执行任务全部作废。
    pub fn start_game<R: Rng + ?Sized>(
        &self,
        catalog: &CardCatalog,
        rng: &mut R,
        scheduler: &mut Scheduler,
    ) -> GameState {
        let cancelled = scheduler.cancel_all();
        if cancelled > 0 {
            debug!("start_game cancelled {cancelled} pending job(s)");
        }

        let config = &self.config;
        let human = Player::new(
            HUMAN_PLAYER,
            "Player",
            true,
            catalog.build_deck(config.deck_copies, rng),
            config,
        );
        let opponent = Player::new(
            OPPONENT_PLAYER,
            "Opponent",
            false,
            catalog.build_deck(config.deck_copies, rng),
            config,
        );

        let mut state = GameState::new([human, opponent], config);
        state.record_event(GameEvent::GameStarted);
        scheduler.schedule(&state, config.opening_draw_delay_ms, Job::OpeningDraw);
        info!(
            "new game started with {} card decks",
            state.players[0].deck.len()
        );
        state
    }

    pub fn opening_draw(&self, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = state.draw_cards(HUMAN_PLAYER, self.config.opening_hand);
        events.extend(state.draw_cards(OPPONENT_PLAYER, self.config.opening_hand));
        events
    }

    /// 结束当前回合：清除攻击选择，取消所有待执行任务，为下一位玩家增长法力。
    /// 对局结束后调用不产生任何变化。
    pub fn end_turn(&self, state: &mut GameState, scheduler: &mut Scheduler) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !state.is_playing() {
            return events;
        }

        state.selected_attacker = None;
        scheduler.cancel_all();

        let current = state.current_player;
        let next = GameState::opponent_of(current);
        let mana_cap = state.mana_cap;
        if let Some(player) = state.get_player_mut(next) {
            player.max_mana = player.max_mana.saturating_add(1).min(mana_cap);
            player.mana = player.max_mana;
        }
        state.current_player = next;
        state.turn += 1;

        let end_event = GameEvent::TurnEnded { player_id: current };
        state.record_event(end_event.clone());
        events.push(end_event);

        scheduler.schedule(
            state,
            self.config.turn_start_delay_ms,
            Job::TurnStart { player_id: next },
        );
        debug!("turn {} passes to player {next}", state.turn);
        events
    }

    /// 新回合开始的延迟部分：抽牌并让场上随从恢复攻击能力。
    /// 对手的回合在此处触发策略执行。
    pub fn begin_turn(
        &self,
        state: &mut GameState,
        scheduler: &mut Scheduler,
        player_id: PlayerId,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if !state.is_playing() {
            return events;
        }

        events.extend(state.draw_cards(player_id, self.config.turn_draw));
        let is_human = match state.get_player_mut(player_id) {
            Some(player) => {
                player.ready_board();
                player.is_human
            }
            None => return events,
        };

        let start_event = GameEvent::TurnStarted {
            player_id,
            turn: state.turn,
        };
        state.record_event(start_event.clone());
        events.push(start_event);

        if !is_human {
            scheduler.schedule_unique(
                state,
                self.config.opponent_think_delay_ms,
                Job::OpponentStep,
            );
        }
        events
    }
}
