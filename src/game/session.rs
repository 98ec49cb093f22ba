//! 单写者会话：对局状态与调度器共享同一把独占锁，一次只允许一个逻辑动作执行。

use std::cell::{RefCell, RefMut};

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::ai::{GameAction, GreedyPolicy};

use super::catalog::CardCatalog;
use super::config::{ConfigError, EngineConfig};
use super::rules::{AttackAction, PlayCardAction, RuleEngine, RuleError};
use super::schedule::{Job, ScheduledTask, Scheduler};
use super::state::{AttackerSelection, GameEvent, GameState, PlayerId};
use super::turn::TurnController;

struct SessionInner {
    state: GameState,
    scheduler: Scheduler,
    rules: RuleEngine,
    turns: TurnController,
    policy: GreedyPolicy,
    catalog: CardCatalog,
    rng: SmallRng,
}

impl SessionInner {
    /// 对局一旦结束立即冻结：丢弃所有待执行任务。
    fn freeze_if_finished(&mut self) {
        if self.state.is_finished() {
            let cancelled = self.scheduler.cancel_all();
            info!(
                "game over, winner: player {:?} ({cancelled} pending job(s) dropped)",
                self.state.winner
            );
        }
    }

    fn run_task(&mut self, task: ScheduledTask) -> Vec<GameEvent> {
        if !task.token.is_current(&self.state, self.scheduler.generation()) {
            debug!("discarding stale job {:?}", task.job);
            return Vec::new();
        }

        match task.job {
            Job::OpeningDraw => self.turns.opening_draw(&mut self.state),
            Job::TurnStart { player_id } => {
                self.turns
                    .begin_turn(&mut self.state, &mut self.scheduler, player_id)
            }
            Job::OpponentStep => self.opponent_step(),
        }
    }

    fn opponent_step(&mut self) -> Vec<GameEvent> {
        let player_id = self.state.current_player;
        let decision = self.policy.decide_action(&self.state, player_id);
        match decision.action {
            GameAction::PlayCard { action } => match self.rules.play_card(&mut self.state, action) {
                Ok(events) => {
                    let delay = self.turns.config().opponent_think_delay_ms;
                    self.scheduler
                        .schedule_unique(&self.state, delay, Job::OpponentStep);
                    events
                }
                Err(error) => {
                    debug!("opponent play rejected ({error}), ending turn");
                    self.turns.end_turn(&mut self.state, &mut self.scheduler)
                }
            },
            GameAction::EndTurn => self.turns.end_turn(&mut self.state, &mut self.scheduler),
        }
    }
}

/// 渲染层唯一的访问入口。命令在执行期间独占会话，重入或重叠调用会被确定性地拒绝。
pub struct GameSession {
    inner: RefCell<SessionInner>,
}

impl GameSession {
    /// 使用内置示例卡牌目录创建会话并立即开局。
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_catalog(config, CardCatalog::sample().clone())
    }

    /// 配置不合法时拒绝开局。
    pub fn with_catalog(config: EngineConfig, catalog: CardCatalog) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let turns = TurnController::new(config);
        let mut scheduler = Scheduler::new();
        let state = turns.start_game(&catalog, &mut rng, &mut scheduler);
        Ok(Self {
            inner: RefCell::new(SessionInner {
                state,
                scheduler,
                rules: RuleEngine::new(),
                turns,
                policy: GreedyPolicy::new(),
                catalog,
                rng,
            }),
        })
    }

    fn lock(&self) -> Result<RefMut<'_, SessionInner>, RuleError> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| RuleError::ActionInProgress)
    }

    /// 当前对局的快照。
    pub fn snapshot(&self) -> Result<GameState, RuleError> {
        self.inner
            .try_borrow()
            .map(|inner| inner.state.clone())
            .map_err(|_| RuleError::ActionInProgress)
    }

    /// 在持有会话锁的情况下读取状态；闭包内再次调用会话命令会得到 `ActionInProgress`。
    pub fn with_state<T>(&self, read: impl FnOnce(&GameState) -> T) -> Result<T, RuleError> {
        let inner = self.lock()?;
        Ok(read(&inner.state))
    }

    pub fn can_afford(&self, player_id: PlayerId, hand_index: usize) -> Result<bool, RuleError> {
        self.with_state(|state| {
            state
                .get_player(player_id)
                .and_then(|player| player.hand.get(hand_index))
                .map(|card| state.can_afford(player_id, card))
                .unwrap_or(false)
        })
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        self.with_state(GameState::integrity_check)?
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    pub fn start_game(&self) -> Result<Vec<GameEvent>, RuleError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.state = inner
            .turns
            .start_game(&inner.catalog, &mut inner.rng, &mut inner.scheduler);
        Ok(vec![GameEvent::GameStarted])
    }

    /// 开局抽牌完成之前不能结束回合。
    pub fn end_turn(&self) -> Result<Vec<GameEvent>, RuleError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        if inner.scheduler.is_pending(Job::OpeningDraw) {
            return Err(RuleError::OpeningDrawPending);
        }
        Ok(inner.turns.end_turn(&mut inner.state, &mut inner.scheduler))
    }

    pub fn play_card(
        &self,
        player_id: PlayerId,
        hand_index: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.rules.play_card(
            &mut inner.state,
            PlayCardAction {
                player_id,
                hand_index,
            },
        )
    }

    pub fn select_attacker(&self, selection: Option<AttackerSelection>) -> Result<(), RuleError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.rules.select_attacker(&mut inner.state, selection)
    }

    pub fn attack(&self, action: AttackAction) -> Result<Vec<GameEvent>, RuleError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let events = inner.rules.attack(&mut inner.state, action)?;
        inner.freeze_if_finished();
        Ok(events)
    }

    pub fn now_ms(&self) -> Result<u64, RuleError> {
        Ok(self.lock()?.scheduler.now_ms())
    }

    /// 距下一个待执行任务到期的毫秒数；没有任务时返回 `None`。
    pub fn next_delay_ms(&self) -> Result<Option<u64>, RuleError> {
        Ok(self.lock()?.scheduler.delay_until_next())
    }

    /// 推进虚拟时钟 `elapsed_ms` 毫秒，依次执行期间到期的任务。
    pub fn advance(&self, elapsed_ms: u64) -> Result<Vec<GameEvent>, RuleError> {
        let deadline = self.now_ms()?.saturating_add(elapsed_ms);
        self.advance_to(deadline)
    }

    /// 推进到绝对时间 `deadline`；时钟已超过该时间时只执行已到期任务。
    pub fn advance_to(&self, deadline: u64) -> Result<Vec<GameEvent>, RuleError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let mut events = Vec::new();
        while let Some(task) = inner.scheduler.pop_due(deadline) {
            events.extend(inner.run_task(task));
            inner.freeze_if_finished();
        }
        inner.scheduler.settle_clock(deadline);
        Ok(events)
    }
}
