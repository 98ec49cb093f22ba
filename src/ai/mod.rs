//! 对手 AI 策略模块。

pub mod greedy;

pub use greedy::{AiDecision, GameAction, GreedyPolicy};
