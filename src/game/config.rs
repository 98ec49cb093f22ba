use std::fmt;

use serde::{Deserialize, Serialize};

/// 对局规则与节奏参数。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub starting_health: i16,
    pub starting_mana: u8,
    pub mana_cap: u8,
    pub max_hand_size: usize,
    pub max_board_size: usize,
    pub opening_hand: usize,
    pub turn_draw: usize,
    /// 每个卡组包含的卡牌目录份数。
    pub deck_copies: usize,
    pub opening_draw_delay_ms: u64,
    pub turn_start_delay_ms: u64,
    pub opponent_think_delay_ms: u64,
    /// 固定种子便于复现对局；为空时使用系统熵。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ConfigError {
    ZeroStartingMana,
    ManaCapBelowStartingMana { starting_mana: u8, mana_cap: u8 },
    NonPositiveStartingHealth { starting_health: i16 },
    ZeroCapacity { field: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroStartingMana => write!(f, "starting mana must be at least 1"),
            ConfigError::ManaCapBelowStartingMana {
                starting_mana,
                mana_cap,
            } => write!(f, "mana cap {mana_cap} is below starting mana {starting_mana}"),
            ConfigError::NonPositiveStartingHealth { starting_health } => {
                write!(f, "starting health must be positive, got {starting_health}")
            }
            ConfigError::ZeroCapacity { field } => write!(f, "`{field}` must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// 开局前校验：法力上限不低于初始法力，英雄必须以正生命值开局。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_mana == 0 {
            return Err(ConfigError::ZeroStartingMana);
        }
        if self.mana_cap < self.starting_mana {
            return Err(ConfigError::ManaCapBelowStartingMana {
                starting_mana: self.starting_mana,
                mana_cap: self.mana_cap,
            });
        }
        if self.starting_health <= 0 {
            return Err(ConfigError::NonPositiveStartingHealth {
                starting_health: self.starting_health,
            });
        }
        for (field, size) in [
            ("max_hand_size", self.max_hand_size),
            ("max_board_size", self.max_board_size),
        ] {
            if size == 0 {
                return Err(ConfigError::ZeroCapacity {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 所有延迟归零，调度任务在下一次 `advance(0)` 时立即执行。
    pub fn without_delays(mut self) -> Self {
        self.opening_draw_delay_ms = 0;
        self.turn_start_delay_ms = 0;
        self.opponent_think_delay_ms = 0;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_health: 30,
            starting_mana: 1,
            mana_cap: 10,
            max_hand_size: 10,
            max_board_size: 7,
            opening_hand: 3,
            turn_draw: 1,
            deck_copies: 2,
            opening_draw_delay_ms: 100,
            turn_start_delay_ms: 500,
            opponent_think_delay_ms: 1000,
            seed: None,
        }
    }
}
