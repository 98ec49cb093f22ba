pub mod ai;
pub mod game;
pub mod utils;

use std::rc::Rc;
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use log::LevelFilter;
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{AiDecision, GameAction, GreedyPolicy};
pub use game::{
    AttackAction, AttackerSelection, CardCatalog, CardKind, CardTemplate, CatalogError,
    ConfigError, EngineConfig, GameEvent, GamePhase, GameSession, GameState, InstanceId,
    IntegrityError, Job, Minion, PlayCardAction, Player, PlayerId, RuleEngine, RuleError,
    RuleResolution, Scheduler, TargetKind, TaskToken, TurnController, HUMAN_PLAYER,
    OPPONENT_PLAYER,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
    utils::init_logging(LevelFilter::Info);
}

/// 输出普通 JS 对象（带 flatten 的结构默认会被序列化成 `Map`）。
fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&Serializer::json_compatible())
}

/// 结构化错误按标签对象返回，序列化失败时退回到文本描述。
fn typed_error_to_js<E: Serialize + std::fmt::Display>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn to_js_error(error: RuleError) -> JsValue {
    typed_error_to_js(error)
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(state: GameState, events: Vec<GameEvent>) -> Result<String, JsValue> {
    serde_json::to_string(&RuleResolution::new(state, events)).map_err(serde_to_js_error)
}

/// 渲染层使用的对局引擎。命令立即返回结算结果，延迟任务（开局抽牌、回合开始、
/// 对手出牌）需要调用 `pump` 驱动。
#[wasm_bindgen]
pub struct GameEngine {
    session: Rc<GameSession>,
}

impl GameEngine {
    fn resolve(
        &self,
        command: impl FnOnce(&GameSession) -> Result<Vec<GameEvent>, RuleError>,
    ) -> Result<String, JsValue> {
        let events = command(&self.session).map_err(to_js_error)?;
        let state = self.session.snapshot().map_err(to_js_error)?;
        make_resolution_json(state, events)
    }
}

#[wasm_bindgen]
impl GameEngine {
    /// 两个参数都是可选的 JSON：引擎配置与卡牌目录。缺省时使用默认配置与内置示例目录。
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        catalog_json: Option<String>,
    ) -> Result<GameEngine, JsValue> {
        let config: EngineConfig = match config_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => EngineConfig::default(),
        };
        let catalog = match catalog_json {
            Some(json) => CardCatalog::from_json(&json).map_err(serde_to_js_error)?,
            None => CardCatalog::sample().clone(),
        };
        let session = GameSession::with_catalog(config, catalog).map_err(typed_error_to_js)?;
        Ok(GameEngine {
            session: Rc::new(session),
        })
    }

    pub fn state(&self) -> Result<JsValue, JsValue> {
        let state = self.session.snapshot().map_err(to_js_error)?;
        to_value(&state).map_err(JsValue::from)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        let state = self.session.snapshot().map_err(to_js_error)?;
        serde_json::to_string(&state).map_err(serde_to_js_error)
    }

    #[wasm_bindgen(js_name = "startGame")]
    pub fn start_game(&self) -> Result<String, JsValue> {
        self.resolve(GameSession::start_game)
    }

    #[wasm_bindgen(js_name = "endTurn")]
    pub fn end_turn(&self) -> Result<String, JsValue> {
        self.resolve(GameSession::end_turn)
    }

    #[wasm_bindgen(js_name = "playCard")]
    pub fn play_card(&self, player_id: u8, hand_index: u32) -> Result<String, JsValue> {
        self.resolve(|session| session.play_card(player_id, hand_index as usize))
    }

    #[wasm_bindgen(js_name = "canAfford")]
    pub fn can_afford(&self, player_id: u8, hand_index: u32) -> Result<bool, JsValue> {
        self.session
            .can_afford(player_id, hand_index as usize)
            .map_err(to_js_error)
    }

    /// 两个参数都为空时清除选择。
    #[wasm_bindgen(js_name = "selectAttacker")]
    pub fn select_attacker(
        &self,
        player_id: Option<u8>,
        slot: Option<u32>,
    ) -> Result<String, JsValue> {
        let selection = match (player_id, slot) {
            (Some(player), Some(slot)) => Some(AttackerSelection {
                player,
                slot: slot as usize,
            }),
            (None, None) => None,
            _ => return Err(to_js_error(RuleError::IncompleteSelection)),
        };
        self.resolve(|session| session.select_attacker(selection).map(|_| Vec::new()))
    }

    #[wasm_bindgen(js_name = "attackTarget")]
    pub fn attack_target(
        &self,
        kind: &str,
        target_player: u8,
        target_slot: Option<u32>,
    ) -> Result<String, JsValue> {
        let kind = TargetKind::from_str(kind)
            .map_err(|_| JsValue::from_str(&format!("unknown target kind `{kind}`")))?;
        let action = AttackAction {
            kind,
            target_player,
            target_slot: target_slot.map(|slot| slot as usize),
        };
        self.resolve(|session| session.attack(action))
    }

    pub fn attack_json(&self, action_json: &str) -> Result<String, JsValue> {
        let action: AttackAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.resolve(|session| session.attack(action))
    }

    /// 距下一个延迟任务到期的毫秒数。
    #[wasm_bindgen(js_name = "nextDelayMs")]
    pub fn next_delay_ms(&self) -> Result<Option<u32>, JsValue> {
        let delay = self.session.next_delay_ms().map_err(to_js_error)?;
        Ok(delay.map(|ms| ms.min(u64::from(u32::MAX)) as u32))
    }

    /// 手动推进虚拟时钟，主要用于测试或自定义驱动循环。
    pub fn advance(&self, elapsed_ms: u32) -> Result<String, JsValue> {
        self.resolve(|session| session.advance(u64::from(elapsed_ms)))
    }

    /// 按真实时间依次执行所有待执行任务，直到队列清空。
    /// 重复调用是安全的：每个任务按绝对到期时间执行且只执行一次。
    pub fn pump(&self) -> Promise {
        let session = Rc::clone(&self.session);
        future_to_promise(async move {
            let mut events = Vec::new();
            loop {
                let (now, delay) = match (session.now_ms(), session.next_delay_ms()) {
                    (Ok(now), Ok(Some(delay))) => (now, delay),
                    (Ok(_), Ok(None)) => break,
                    (Err(error), _) | (_, Err(error)) => return Err(to_js_error(error)),
                };
                if delay > 0 {
                    TimeoutFuture::new(delay.min(u64::from(u32::MAX)) as u32).await;
                }
                let resolved = session
                    .advance_to(now.saturating_add(delay))
                    .map_err(to_js_error)?;
                events.extend(resolved);
            }
            let state = session.snapshot().map_err(to_js_error)?;
            let json = make_resolution_json(state, events)?;
            Ok(JsValue::from_str(&json))
        })
    }
}

/// 返回内置的示例卡牌目录。
#[wasm_bindgen(js_name = "sampleCatalog")]
pub fn sample_catalog() -> Result<JsValue, JsValue> {
    to_value(CardCatalog::sample()).map_err(JsValue::from)
}

/// 校验外部传入的卡牌目录 JSON。
#[wasm_bindgen(js_name = "validateCatalog")]
pub fn validate_catalog(catalog_json: &str) -> Result<(), JsValue> {
    CardCatalog::from_json(catalog_json)
        .map(|_| ())
        .map_err(typed_error_to_js)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = serde_wasm_bindgen::from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))
}
