//! 延迟任务调度：基于虚拟时钟，每个任务携带代际令牌，过期任务在执行前自动丢弃。

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::state::{GamePhase, GameState, PlayerId};

/// 可被调度的工作单元。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Job {
    /// 开局双方各抽起手牌。
    OpeningDraw,
    /// 新回合开始：抽牌并重置场上随从的攻击状态。
    TurnStart { player_id: PlayerId },
    /// 对手策略执行一步。
    OpponentStep,
}

/// 任务创建时的对局上下文。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskToken {
    pub generation: u64,
    pub phase: GamePhase,
    pub active_player: PlayerId,
}

impl TaskToken {
    pub fn capture(state: &GameState, generation: u64) -> Self {
        Self {
            generation,
            phase: state.phase,
            active_player: state.current_player,
        }
    }

    pub fn is_current(&self, state: &GameState, generation: u64) -> bool {
        self.generation == generation
            && self.phase == state.phase
            && self.active_player == state.current_player
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub due_ms: u64,
    order: u64,
    pub token: TaskToken,
    pub job: Job,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.order == other.order
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    // BinaryHeap 是大顶堆：到期越早、入队越早的任务排在越前面。
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    heap: BinaryHeap<ScheduledTask>,
    order: u64,
    generation: u64,
    now_ms: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    pub fn schedule(&mut self, state: &GameState, delay_ms: u64, job: Job) {
        self.order += 1;
        self.heap.push(ScheduledTask {
            due_ms: self.now_ms.saturating_add(delay_ms),
            order: self.order,
            token: TaskToken::capture(state, self.generation),
            job,
        });
    }

    /// 同一代际内已有相同任务待执行时不再重复入队。
    pub fn schedule_unique(&mut self, state: &GameState, delay_ms: u64, job: Job) -> bool {
        let generation = self.generation;
        let duplicate = self
            .heap
            .iter()
            .any(|task| task.job == job && task.token.generation == generation);
        if duplicate {
            return false;
        }
        self.schedule(state, delay_ms, job);
        true
    }

    pub fn is_pending(&self, job: Job) -> bool {
        self.heap
            .iter()
            .any(|task| task.job == job && task.token.generation == self.generation)
    }

    /// 作废所有待执行任务并推进代际，返回被取消的数量。
    pub fn cancel_all(&mut self) -> usize {
        self.generation += 1;
        let cancelled = self.heap.len();
        self.heap.clear();
        cancelled
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.heap.peek().map(|task| task.due_ms)
    }

    pub fn delay_until_next(&self) -> Option<u64> {
        self.next_due_ms().map(|due| due.saturating_sub(self.now_ms))
    }

    /// 取出在 `deadline` 之前到期的下一个任务，并把时钟推进到该任务的到期时间。
    pub fn pop_due(&mut self, deadline: u64) -> Option<ScheduledTask> {
        if self.heap.peek()?.due_ms > deadline {
            return None;
        }
        let task = self.heap.pop()?;
        self.now_ms = self.now_ms.max(task.due_ms);
        Some(task)
    }

    pub fn settle_clock(&mut self, deadline: u64) {
        self.now_ms = self.now_ms.max(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::EngineConfig;

    fn state() -> GameState {
        GameState::blank(&EngineConfig::default())
    }

    #[test]
    fn tasks_pop_in_due_order_then_fifo() {
        let state = state();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(&state, 500, Job::TurnStart { player_id: 1 });
        scheduler.schedule(&state, 100, Job::OpeningDraw);
        scheduler.schedule(&state, 500, Job::OpponentStep);

        assert_eq!(scheduler.delay_until_next(), Some(100));
        let jobs: Vec<Job> = std::iter::from_fn(|| scheduler.pop_due(1_000))
            .map(|task| task.job)
            .collect();
        assert_eq!(
            jobs,
            vec![
                Job::OpeningDraw,
                Job::TurnStart { player_id: 1 },
                Job::OpponentStep
            ]
        );
        assert_eq!(scheduler.now_ms(), 500);
    }

    #[test]
    fn pop_due_respects_deadline() {
        let state = state();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(&state, 300, Job::OpeningDraw);

        assert!(scheduler.pop_due(299).is_none());
        scheduler.settle_clock(299);
        assert_eq!(scheduler.delay_until_next(), Some(1));
        assert!(scheduler.pop_due(300).is_some());
    }

    #[test]
    fn cancel_all_bumps_generation_and_invalidates_tokens() {
        let state = state();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(&state, 10, Job::OpponentStep);
        let token = TaskToken::capture(&state, scheduler.generation());

        assert_eq!(scheduler.cancel_all(), 1);
        assert_eq!(scheduler.pending(), 0);
        assert!(!token.is_current(&state, scheduler.generation()));
    }

    #[test]
    fn token_goes_stale_when_active_player_changes() {
        let mut state = state();
        let token = TaskToken::capture(&state, 0);
        assert!(token.is_current(&state, 0));

        state.current_player = 1;
        assert!(!token.is_current(&state, 0));
    }

    #[test]
    fn schedule_unique_rejects_duplicate_job() {
        let state = state();
        let mut scheduler = Scheduler::new();
        assert!(scheduler.schedule_unique(&state, 10, Job::OpponentStep));
        assert!(!scheduler.schedule_unique(&state, 20, Job::OpponentStep));
        assert!(scheduler.is_pending(Job::OpponentStep));
        assert_eq!(scheduler.pending(), 1);
    }
}
