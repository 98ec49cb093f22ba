//! 游戏核心逻辑模块（状态机、规则、回合推进、调度等）。

pub mod catalog;
pub mod config;
pub mod rules;
pub mod schedule;
pub mod session;
pub mod state;
pub mod turn;

pub use catalog::{CardCatalog, CatalogError};
pub use config::{ConfigError, EngineConfig};
pub use rules::{AttackAction, PlayCardAction, RuleEngine, RuleError, RuleResolution, TargetKind};
pub use schedule::{Job, Scheduler, TaskToken};
pub use session::GameSession;
pub use state::{
    AttackerSelection, CardKind, CardTemplate, GameEvent, GamePhase, GameState, InstanceId,
    IntegrityError, Minion, Player, PlayerId, HUMAN_PLAYER, OPPONENT_PLAYER,
};
pub use turn::TurnController;
